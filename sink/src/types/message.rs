use serde_json::Value;
use tracing::error;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// A parsed Singer protocol message.
///
/// One message arrives per input line as a JSON object with a `type`
/// discriminator. Anything that does not parse into one of these variants is
/// a protocol violation and fatal to the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Record {
        stream: String,
        record: Value,
    },
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    State {
        value: Value,
    },
    ActivateVersion {
        stream: Option<String>,
    },
}

impl Message {
    /// Parses a single input line into a [`Message`].
    ///
    /// Malformed JSON is logged with the offending line and re-raised as a
    /// fatal error. A missing `type` key, a missing type-specific required
    /// field, or an unrecognized `type` are also fatal.
    pub fn parse(line: &str) -> SinkResult<Message> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                error!("unable to parse message line: {line}");
                return Err(crate::sink_error!(
                    ErrorKind::InvalidMessage,
                    "Malformed message line",
                    err
                ));
            }
        };

        let Some(message_type) = value.get("type").and_then(Value::as_str) else {
            bail!(
                ErrorKind::MissingRequiredField,
                "Message is missing required key 'type'",
                line
            );
        };

        match message_type {
            "RECORD" => {
                let stream = required_string_field(&value, "stream", line)?;
                let record = required_field(&value, "record", line)?;

                Ok(Message::Record { stream, record })
            }
            "SCHEMA" => {
                let stream = required_string_field(&value, "stream", line)?;
                let schema = required_field(&value, "schema", line)?;

                let Some(key_properties) = value.get("key_properties") else {
                    bail!(
                        ErrorKind::MissingRequiredField,
                        "Message is missing a required key",
                        format!("'key_properties' in line: {line}")
                    );
                };
                let key_properties: Vec<String> =
                    serde_json::from_value(key_properties.clone()).map_err(|err| {
                        crate::sink_error!(
                            ErrorKind::MissingRequiredField,
                            "key_properties must be an array of property names",
                            err
                        )
                    })?;

                Ok(Message::Schema {
                    stream,
                    schema,
                    key_properties,
                })
            }
            "STATE" => {
                let state = required_field(&value, "value", line)?;

                Ok(Message::State { value: state })
            }
            "ACTIVATE_VERSION" => Ok(Message::ActivateVersion {
                stream: value
                    .get("stream")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            other => Err(crate::sink_error!(
                ErrorKind::UnknownMessageType,
                "Unknown message type",
                format!("{other} in message {line}")
            )),
        }
    }
}

fn required_field(value: &Value, field: &'static str, line: &str) -> SinkResult<Value> {
    match value.get(field) {
        Some(field_value) => Ok(field_value.clone()),
        None => Err(crate::sink_error!(
            ErrorKind::MissingRequiredField,
            "Message is missing a required key",
            format!("'{field}' in line: {line}")
        )),
    }
}

fn required_string_field(value: &Value, field: &'static str, line: &str) -> SinkResult<String> {
    let field_value = required_field(value, field, line)?;
    match field_value.as_str() {
        Some(text) => Ok(text.to_string()),
        None => Err(crate::sink_error!(
            ErrorKind::MissingRequiredField,
            "Message field must be a string",
            format!("'{field}' in line: {line}")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_record_message() {
        let message =
            Message::parse(r#"{"type": "RECORD", "stream": "users", "record": {"id": 1}}"#)
                .unwrap();

        assert_eq!(
            message,
            Message::Record {
                stream: "users".to_string(),
                record: json!({"id": 1}),
            }
        );
    }

    #[test]
    fn parses_a_schema_message_with_keys() {
        let message = Message::parse(
            r#"{"type": "SCHEMA", "stream": "users", "schema": {"properties": {}}, "key_properties": ["id"]}"#,
        )
        .unwrap();

        assert_eq!(
            message,
            Message::Schema {
                stream: "users".to_string(),
                schema: json!({"properties": {}}),
                key_properties: vec!["id".to_string()],
            }
        );
    }

    #[test]
    fn malformed_json_is_an_invalid_message() {
        let err = Message::parse("{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMessage);
    }

    #[test]
    fn missing_type_is_a_missing_field() {
        let err = Message::parse(r#"{"stream": "users"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Message::parse(r#"{"type": "UPSERT"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownMessageType);
    }

    #[test]
    fn schema_without_key_properties_is_rejected() {
        let err = Message::parse(
            r#"{"type": "SCHEMA", "stream": "users", "schema": {"properties": {}}}"#,
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
        assert!(err.detail().unwrap().contains("key_properties"));
    }
}
