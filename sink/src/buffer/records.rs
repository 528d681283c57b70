use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::buffer::Expiry;
use crate::types::Record;

/// Per-stream record buffer.
///
/// Streams with key properties deduplicate in memory with last-write-wins
/// semantics, so a batch never carries two versions of the same row into a
/// merge. Streams without keys append every record verbatim.
///
/// Adding a record rearms the time-to-live deadline; clearing disarms it.
#[derive(Debug)]
pub enum RecordBuffer {
    Append {
        records: Vec<Record>,
        expiry: Expiry,
    },
    Keyed {
        key_columns: Vec<String>,
        records: BTreeMap<String, Record>,
        expiry: Expiry,
    },
}

impl RecordBuffer {
    pub fn append(ttl: Duration, now: DateTime<Utc>) -> Self {
        RecordBuffer::Append {
            records: Vec::new(),
            expiry: Expiry::new(ttl, now),
        }
    }

    pub fn keyed(key_columns: Vec<String>, ttl: Duration, now: DateTime<Utc>) -> Self {
        RecordBuffer::Keyed {
            key_columns,
            records: BTreeMap::new(),
            expiry: Expiry::new(ttl, now),
        }
    }

    pub fn add(&mut self, record: Record, now: DateTime<Utc>) {
        match self {
            RecordBuffer::Append { records, expiry } => {
                records.push(record);
                expiry.rearm(now);
            }
            RecordBuffer::Keyed {
                key_columns,
                records,
                expiry,
            } => {
                records.insert(record.key_tuple(key_columns), record);
                expiry.rearm(now);
            }
        }
    }

    /// Returns the buffered records in a stable order.
    pub fn values(&self) -> Vec<Record> {
        match self {
            RecordBuffer::Append { records, .. } => records.clone(),
            RecordBuffer::Keyed { records, .. } => records.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordBuffer::Append { records, .. } => records.len(),
            RecordBuffer::Keyed { records, .. } => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the buffer and disarms its deadline.
    pub fn clear(&mut self) {
        match self {
            RecordBuffer::Append { records, expiry } => {
                records.clear();
                expiry.disarm();
            }
            RecordBuffer::Keyed {
                records, expiry, ..
            } => {
                records.clear();
                expiry.disarm();
            }
        }
    }

    pub fn expired(&self, at: DateTime<Utc>) -> bool {
        match self {
            RecordBuffer::Append { expiry, .. } | RecordBuffer::Keyed { expiry, .. } => {
                expiry.expired(at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user(id: i64, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("id", json!(id));
        record.insert("name", json!(name));
        record
    }

    #[test]
    fn append_buffer_keeps_duplicates() {
        let mut buffer = RecordBuffer::append(Duration::seconds(60), base());
        buffer.add(user(1, "ada"), base());
        buffer.add(user(1, "ada"), base());

        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn keyed_buffer_deduplicates_last_write_wins() {
        let mut buffer =
            RecordBuffer::keyed(vec!["id".to_string()], Duration::seconds(60), base());
        buffer.add(user(1, "ada"), base());
        buffer.add(user(2, "grace"), base());
        buffer.add(user(1, "ada lovelace"), base());

        assert_eq!(buffer.len(), 2);
        let names: Vec<_> = buffer
            .values()
            .iter()
            .map(|r| r.get("name").cloned().unwrap())
            .collect();
        assert!(names.contains(&json!("ada lovelace")));
        assert!(!names.contains(&json!("ada")));
    }

    #[test]
    fn empty_buffer_is_not_expired() {
        let buffer = RecordBuffer::append(Duration::seconds(60), base());
        assert!(!buffer.expired(base() + Duration::hours(1)));
    }

    #[test]
    fn buffer_expires_after_quiet_period_and_clear_disarms() {
        let mut buffer = RecordBuffer::append(Duration::seconds(60), base());
        buffer.add(user(1, "ada"), base());

        let late = base() + Duration::seconds(90);
        assert!(buffer.expired(late));

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.expired(late));
    }

    #[test]
    fn adding_a_record_rearms_the_deadline() {
        let mut buffer = RecordBuffer::append(Duration::seconds(60), base());
        buffer.add(user(1, "ada"), base());
        buffer.add(user(2, "grace"), base() + Duration::seconds(50));

        assert!(!buffer.expired(base() + Duration::seconds(100)));
        assert!(buffer.expired(base() + Duration::seconds(110)));
    }
}
