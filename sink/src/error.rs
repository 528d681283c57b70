//! Error types and result definitions for the target pipeline.
//!
//! Provides a single error type with granular classification and captured
//! callsite metadata. Driver errors are classified into [`ErrorKind`] at the
//! boundary where they are first observed, so the rest of the pipeline never
//! inspects error message text.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for target operations using [`SinkError`] as the error type.
pub type SinkResult<T> = Result<T, SinkError>;

/// Specific categories of errors that can occur while running the target.
///
/// The taxonomy separates protocol violations, record validation failures,
/// schema evolution rejections, and warehouse failures so that callers can
/// react appropriately. Only [`ErrorKind::AuthenticationExpired`] is ever
/// retried, and only once.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Protocol errors: the input stream violates the Singer spec.
    InvalidMessage,
    MissingRequiredField,
    UnknownMessageType,
    RecordBeforeSchema,

    // Validation errors: a message is well formed but its payload is not.
    ValidationFailed,
    MissingKeyProperties,
    UnsupportedSchema,

    // Schema evolution errors.
    SchemaUpdateNotAllowed,

    // Warehouse errors.
    AuthenticationExpired,
    WarehouseConnectionFailed,
    WarehouseQueryFailed,

    // Boundary conversions.
    SerializationError,
    IoError,
    ConfigError,
}

/// Main error type for target operations.
///
/// Carries an [`ErrorKind`], a static description, optional dynamic detail,
/// an optional source error, and the callsite location where it was created.
#[derive(Debug, Clone)]
pub struct SinkError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

impl SinkError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        SinkError {
            kind,
            description,
            detail,
            source: None,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for SinkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates a [`SinkError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SinkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`SinkError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SinkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

/// Converts [`std::io::Error`] to [`SinkError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for SinkError {
    #[track_caller]
    fn from(err: std::io::Error) -> SinkError {
        let detail = err.to_string();
        SinkError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
        )
        .with_source(err)
    }
}

/// Converts [`serde_json::Error`] to [`SinkError`] with [`ErrorKind::SerializationError`].
impl From<serde_json::Error> for SinkError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SinkError {
        let detail = err.to_string();
        SinkError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed("JSON serialization failed"),
            Some(Cow::Owned(detail)),
        )
        .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = SinkError::from((
            ErrorKind::SchemaUpdateNotAllowed,
            "Not allowed type update",
            "users.age: FLOAT -> VARCHAR".to_string(),
        ));

        let rendered = err.to_string();
        assert!(rendered.contains("SchemaUpdateNotAllowed"));
        assert!(rendered.contains("Not allowed type update"));
        assert!(rendered.contains("users.age: FLOAT -> VARCHAR"));
    }

    #[test]
    fn kind_is_preserved_through_source_attachment() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = SinkError::from((ErrorKind::WarehouseQueryFailed, "query failed")).with_source(io);

        assert_eq!(err.kind(), ErrorKind::WarehouseQueryFailed);
        assert!(std::error::Error::source(&err).is_some());
    }
}
