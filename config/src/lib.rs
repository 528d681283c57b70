//! Configuration types shared by the Snowflake target crates.
//!
//! All structs in this crate are plain serde-deserializable data carriers.
//! Credentials are wrapped in [`SerializableSecretString`] so that debug and
//! serialized output never leaks them.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub mod shared;

/// A secret string that can be deserialized from plain text but always
/// serializes redacted.
///
/// Wraps [`secrecy::SecretString`] to keep the underlying value out of debug
/// output, logs, and any re-serialized configuration.
#[derive(Clone)]
pub struct SerializableSecretString(SecretString);

impl SerializableSecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into()))
    }

    /// Returns the wrapped secret value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerializableSecretString(***REDACTED***)")
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted_in_debug_and_serialized_output() {
        let secret = SerializableSecretString::new("hunter2");

        assert_eq!(secret.expose_secret(), "hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            "\"***REDACTED***\""
        );
    }
}
