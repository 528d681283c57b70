use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

const DEFAULT_BATCH_SIZE: usize = 5000;
const DEFAULT_BUFFER_TTL_SECS: u64 = 60;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_buffer_ttl_secs() -> u64 {
    DEFAULT_BUFFER_TTL_SECS
}

fn default_timestamp_column() -> String {
    "__loaded_at".to_string()
}

/// Batching behavior of the target pipeline.
///
/// Controls when a stream's record buffer is flushed to the warehouse: either
/// when it holds [`BatchConfig::batch_size`] records or when it has been
/// sitting idle and non-empty for [`BatchConfig::buffer_ttl_secs`] seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Number of buffered records per stream that forces a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum idle time in seconds a non-empty buffer may stay unflushed.
    #[serde(default = "default_buffer_ttl_secs")]
    pub buffer_ttl_secs: u64,
    /// Name of the ingestion-time column stamped on every record.
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            buffer_ttl_secs: default_buffer_ttl_secs(),
            timestamp_column: default_timestamp_column(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_to_missing_fields() {
        let config: BatchConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.buffer_ttl_secs, 60);
        assert_eq!(config.timestamp_column, "__loaded_at");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = BatchConfig {
            batch_size: 0,
            ..BatchConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
