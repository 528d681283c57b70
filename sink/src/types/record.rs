use std::collections::BTreeMap;

use serde_json::Value;

/// A single flattened record destined for one warehouse table.
///
/// Maps column names to scalar JSON values. Before a record enters a buffer
/// it is always full width: every column of the live table is present, with
/// explicit nulls for attributes the incoming message did not carry. This
/// guards against missing bind parameters at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Creates an all-null template record for the given column names.
    ///
    /// Used to normalize every incoming record to the full width of the live
    /// table before buffering.
    pub fn template<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: columns
                .into_iter()
                .map(|name| (name.into(), Value::Null))
                .collect(),
        }
    }

    /// Overlays `other` on top of this record, replacing any shared columns.
    ///
    /// Columns only present in `self` keep their value, which is how a
    /// template contributes explicit nulls for absent attributes.
    pub fn overlay(mut self, other: Record) -> Record {
        self.values.extend(other.values);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Returns the canonical key for this record over the given key columns.
    ///
    /// The key is the JSON serialization of the array of key values, which is
    /// stable and hashable regardless of the value types involved. Missing
    /// key columns contribute explicit nulls; the pipeline rejects such
    /// records before they are buffered.
    pub fn key_tuple(&self, key_columns: &[String]) -> String {
        let values: Vec<&Value> = key_columns
            .iter()
            .map(|column| self.values.get(column).unwrap_or(&Value::Null))
            .collect();

        serde_json::to_string(&values).unwrap_or_default()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
