//! Logical table definitions and the type/transition catalog.

/// Logical column types the target can materialize.
///
/// Each logical type maps to exactly one Snowflake-native type name. Nested
/// objects and arrays that cannot be flattened further become [`ColumnType::Variant`]
/// semi-structured columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    Number,
    Text,
    Timestamp,
    Variant,
}

impl ColumnType {
    /// Returns the warehouse-native type name for this logical type.
    pub fn native(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "BIGINT",
            ColumnType::Number => "FLOAT",
            ColumnType::Text => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP_NTZ",
            ColumnType::Variant => "VARIANT",
        }
    }
}

/// Native type pairs that are safe to apply in place with an `ALTER`.
///
/// Only synonyms of the unbounded text type are interchangeable; every other
/// transition risks data loss and is rejected during reconciliation.
const ALLOWED_TYPE_TRANSITIONS: &[(&str, &str)] = &[
    ("VARCHAR", "TEXT"),
    ("VARCHAR", "STRING"),
    ("TEXT", "VARCHAR"),
    ("TEXT", "STRING"),
    ("STRING", "VARCHAR"),
    ("STRING", "TEXT"),
];

/// Returns whether changing a column from `from` to `to` is allow-listed.
///
/// Identical types are not a transition and return false; callers treat them
/// as a no-op before consulting the allow-list.
pub fn transition_allowed(from: &str, to: &str) -> bool {
    let from = from.to_ascii_uppercase();
    let to = to.to_ascii_uppercase();

    ALLOWED_TYPE_TRANSITIONS
        .iter()
        .any(|(allowed_from, allowed_to)| *allowed_from == from && *allowed_to == to)
}

/// A single column of a logical table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    /// Creates a column definition. Primary key columns are implicitly
    /// non-nullable.
    pub fn new(name: impl Into<String>, ty: ColumnType, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: !primary_key,
            primary_key,
        }
    }
}

/// The logical definition of one target table.
///
/// Derived from a SCHEMA message and refined by later SCHEMA messages for the
/// same stream. Columns are ordered; the primary key is a subset of columns
/// and is immutable for the lifetime of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    /// Schema namespace the table lives in.
    pub schema: String,
    /// Table name, equal to the stream name.
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }

    /// Returns the name of the staging table used for merge loads.
    pub fn temp_table_name(&self) -> String {
        format!("TMP_{}", self.name.to_ascii_uppercase())
    }

    /// Returns a same-shaped definition for the staging table.
    pub fn temp_table_def(&self) -> TableDef {
        TableDef {
            schema: self.schema.clone(),
            name: self.temp_table_name(),
            columns: self.columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_synonyms_are_interchangeable() {
        assert!(transition_allowed("VARCHAR", "TEXT"));
        assert!(transition_allowed("text", "string"));
        assert!(transition_allowed("STRING", "VARCHAR"));
    }

    #[test]
    fn narrowing_and_widening_are_rejected() {
        assert!(!transition_allowed("FLOAT", "VARCHAR"));
        assert!(!transition_allowed("VARCHAR", "FLOAT"));
        assert!(!transition_allowed("BIGINT", "BOOLEAN"));
        // Identity is a no-op, not a transition.
        assert!(!transition_allowed("VARCHAR", "VARCHAR"));
    }

    #[test]
    fn temp_table_def_mirrors_columns() {
        let table = TableDef::new(
            "raw",
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, true),
                ColumnDef::new("name", ColumnType::Text, false),
            ],
        );

        let tmp = table.temp_table_def();
        assert_eq!(tmp.name, "TMP_USERS");
        assert_eq!(tmp.columns, table.columns);
        assert_eq!(tmp.qualified_name(), "raw.TMP_USERS");
    }
}
