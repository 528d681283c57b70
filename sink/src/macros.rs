//! Macros for target error handling.
//!
//! Convenience macros for creating and returning [`crate::error::SinkError`]
//! instances with reduced boilerplate.

/// Creates a [`crate::error::SinkError`] from error kind and description.
///
/// An optional third argument adds dynamic detail; anything that converts
/// into a string works.
#[macro_export]
macro_rules! sink_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SinkError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SinkError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::SinkError`] from the current function.
///
/// Combines error creation with early return for error conditions that must
/// immediately terminate execution.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::sink_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::sink_error!($kind, $desc, $detail))
    };
}
