//! Record validation against a stream's declared JSON Schema.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{ErrorKind, SinkResult};
use crate::types::Record;

/// Validator owned by one stream, compiled once per SCHEMA message.
///
/// Structural validation runs on the raw, pre-flattened record against the
/// original JSON Schema. Key presence is checked separately on the flattened
/// record: every key property must carry a value even when the schema does
/// not mark it `required`, because key presence is a delivery guarantee of
/// the protocol rather than a schema concern.
pub struct RecordValidator {
    schema: JSONSchema,
    key_properties: Vec<String>,
}

impl std::fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordValidator")
            .field("key_properties", &self.key_properties)
            .finish_non_exhaustive()
    }
}

impl RecordValidator {
    /// Compiles the given JSON Schema with draft-4 semantics and format checks.
    pub fn new(schema: &Value, key_properties: Vec<String>) -> SinkResult<Self> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft4)
            .should_validate_formats(true)
            .compile(schema)
            .map_err(|err| {
                crate::sink_error!(
                    ErrorKind::UnsupportedSchema,
                    "Schema failed to compile",
                    err
                )
            })?;

        Ok(Self {
            schema: compiled,
            key_properties,
        })
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    /// Validates the raw record against the compiled schema.
    pub fn validate(&self, stream: &str, record: &Value) -> SinkResult<()> {
        if let Err(errors) = self.schema.validate(record) {
            let rendered: Vec<String> = errors.map(|err| err.to_string()).collect();
            return Err(crate::sink_error!(
                ErrorKind::ValidationFailed,
                "Record failed schema validation",
                format!("stream {stream}: {}", rendered.join("; "))
            ));
        }

        Ok(())
    }

    /// Verifies that every key property is present on the flattened record.
    pub fn check_key_presence(&self, stream: &str, record: &Record) -> SinkResult<()> {
        let missing: Vec<&str> = self
            .key_properties
            .iter()
            .filter(|key| !record.contains_column(key))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(crate::sink_error!(
                ErrorKind::MissingKeyProperties,
                "Record is missing key properties",
                format!("stream {stream}: missing {}", missing.join(", "))
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_validator() -> RecordValidator {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"}
            },
            "required": ["name"]
        });

        RecordValidator::new(&schema, vec!["id".to_string()]).unwrap()
    }

    #[test]
    fn valid_record_passes() {
        let validator = users_validator();
        assert!(validator
            .validate("users", &json!({"id": 1, "name": "ada"}))
            .is_ok());
    }

    #[test]
    fn type_mismatch_fails_validation() {
        let validator = users_validator();
        let err = validator
            .validate("users", &json!({"id": "one", "name": "ada"}))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn missing_required_property_fails_validation() {
        let validator = users_validator();
        let err = validator.validate("users", &json!({"id": 1})).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn key_must_be_present_even_when_not_required() {
        let validator = users_validator();

        // `id` is not `required` by the schema, so structural validation
        // passes, but the key presence check still rejects the record.
        let raw = json!({"name": "ada"});
        assert!(validator.validate("users", &raw).is_ok());

        let mut flat = Record::new();
        flat.insert("name", json!("ada"));
        let err = validator.check_key_presence("users", &flat).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingKeyProperties);
        assert!(err.detail().unwrap().contains("id"));
    }
}
