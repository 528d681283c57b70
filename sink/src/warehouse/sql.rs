//! Generators for the SQL statements the target issues.
//!
//! Every statement sent to the warehouse is built here, so the full SQL
//! surface stays in one place and is covered by tests as text.

use crate::types::{ColumnDef, TableDef};

/// Snowflake reserved keywords that must be double-quoted when used as
/// identifiers.
const RESERVED_WORDS: &[&str] = &[
    "account",
    "all",
    "alter",
    "and",
    "any",
    "as",
    "between",
    "by",
    "case",
    "cast",
    "check",
    "column",
    "connect",
    "connection",
    "constraint",
    "create",
    "cross",
    "current",
    "current_date",
    "current_time",
    "current_timestamp",
    "current_user",
    "database",
    "delete",
    "distinct",
    "drop",
    "else",
    "exists",
    "false",
    "following",
    "for",
    "from",
    "full",
    "grant",
    "group",
    "gscluster",
    "having",
    "ilike",
    "in",
    "increment",
    "inner",
    "insert",
    "intersect",
    "into",
    "is",
    "issue",
    "join",
    "lateral",
    "left",
    "like",
    "localtime",
    "localtimestamp",
    "minus",
    "natural",
    "not",
    "null",
    "of",
    "on",
    "or",
    "order",
    "organization",
    "qualify",
    "regexp",
    "revoke",
    "right",
    "rlike",
    "row",
    "rows",
    "sample",
    "schema",
    "select",
    "set",
    "some",
    "start",
    "table",
    "tablesample",
    "then",
    "to",
    "trigger",
    "true",
    "try_cast",
    "union",
    "unique",
    "update",
    "using",
    "values",
    "view",
    "when",
    "whenever",
    "where",
    "with",
];

/// Quotes an identifier when it collides with a reserved keyword.
pub fn quote_identifier(name: &str) -> String {
    if RESERVED_WORDS.contains(&name.to_ascii_lowercase().as_str()) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

fn qualified(table: &TableDef) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(&table.name)
    )
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA {}", quote_identifier(schema))
}

fn column_clause(column: &ColumnDef) -> String {
    let mut clause = format!("{} {}", quote_identifier(&column.name), column.ty.native());
    if !column.nullable {
        clause.push_str(" NOT NULL");
    }
    clause
}

pub fn create_table(table: &TableDef, temporary: bool) -> String {
    let mut clauses: Vec<String> = table.columns.iter().map(column_clause).collect();

    let keys = table.primary_key_names();
    if !keys.is_empty() {
        let quoted: Vec<String> = keys.iter().map(|k| quote_identifier(k)).collect();
        clauses.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
    }

    let keyword = if temporary {
        "CREATE TEMPORARY TABLE"
    } else {
        "CREATE TABLE"
    };

    format!("{keyword} {} ({})", qualified(table), clauses.join(", "))
}

pub fn drop_table(table: &TableDef, if_exists: bool) -> String {
    if if_exists {
        format!("DROP TABLE IF EXISTS {}", qualified(table))
    } else {
        format!("DROP TABLE {}", qualified(table))
    }
}

pub fn add_column(table: &TableDef, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        qualified(table),
        quote_identifier(&column.name),
        column.ty.native()
    )
}

pub fn alter_column_type(table: &TableDef, column: &str, native_type: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER {} TYPE {native_type}",
        qualified(table),
        quote_identifier(column)
    )
}

pub fn grant_usage_on_schema(database: &str, schema: &str, role: &str) -> String {
    format!("GRANT USAGE ON SCHEMA \"{database}\".\"{schema}\" TO ROLE {role}")
}

pub fn grant_select_on_all_tables(database: &str, schema: &str, role: &str) -> String {
    format!("GRANT SELECT ON ALL TABLES IN SCHEMA \"{database}\".\"{schema}\" TO ROLE {role}")
}

/// Builds the merge that folds the staging table into the target.
///
/// Rows are matched on the primary key; matched rows have their non-key
/// columns updated, unmatched rows are inserted whole.
pub fn merge_from_temp_table(table: &TableDef) -> String {
    let target = qualified(table);
    let source = qualified(&table.temp_table_def());

    let on: Vec<String> = table
        .primary_key_names()
        .iter()
        .map(|key| {
            let key = quote_identifier(key);
            format!("{target}.{key} = {source}.{key}")
        })
        .collect();

    let updates: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| {
            let name = quote_identifier(&c.name);
            format!("{name} = {source}.{name}")
        })
        .collect();

    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect();
    let source_columns: Vec<String> = columns.iter().map(|c| format!("{source}.{c}")).collect();

    format!(
        "MERGE INTO {target} USING {source} ON {} \
         WHEN MATCHED THEN UPDATE SET {} \
         WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        on.join(" AND "),
        updates.join(", "),
        columns.join(", "),
        source_columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn users_table() -> TableDef {
        TableDef::new(
            "raw",
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, true),
                ColumnDef::new("name", ColumnType::Text, false),
                ColumnDef::new("from", ColumnType::Text, false),
            ],
        )
    }

    #[test]
    fn reserved_words_are_quoted() {
        assert_eq!(quote_identifier("from"), "\"from\"");
        assert_eq!(quote_identifier("CURRENT_USER"), "\"CURRENT_USER\"");
        assert_eq!(quote_identifier("name"), "name");
    }

    #[test]
    fn create_table_includes_keys_and_nullability() {
        let sql = create_table(&users_table(), false);
        assert_eq!(
            sql,
            "CREATE TABLE raw.users (id BIGINT NOT NULL, name VARCHAR, \
             \"from\" VARCHAR, PRIMARY KEY (id))"
        );
    }

    #[test]
    fn temporary_table_targets_the_staging_name() {
        let sql = create_table(&users_table().temp_table_def(), true);
        assert!(sql.starts_with("CREATE TEMPORARY TABLE raw.TMP_USERS ("));
    }

    #[test]
    fn merge_matches_on_keys_and_updates_the_rest() {
        let sql = merge_from_temp_table(&users_table());
        assert_eq!(
            sql,
            "MERGE INTO raw.users USING raw.TMP_USERS \
             ON raw.users.id = raw.TMP_USERS.id \
             WHEN MATCHED THEN UPDATE SET name = raw.TMP_USERS.name, \
             \"from\" = raw.TMP_USERS.\"from\" \
             WHEN NOT MATCHED THEN INSERT (id, name, \"from\") \
             VALUES (raw.TMP_USERS.id, raw.TMP_USERS.name, raw.TMP_USERS.\"from\")"
        );
    }

    #[test]
    fn grants_name_the_qualified_schema() {
        assert_eq!(
            grant_usage_on_schema("analytics", "raw", "loader"),
            "GRANT USAGE ON SCHEMA \"analytics\".\"raw\" TO ROLE loader"
        );
        assert_eq!(
            grant_select_on_all_tables("analytics", "raw", "loader"),
            "GRANT SELECT ON ALL TABLES IN SCHEMA \"analytics\".\"raw\" TO ROLE loader"
        );
    }

    #[test]
    fn alter_statements() {
        let table = users_table();
        let column = ColumnDef::new("age", ColumnType::Integer, false);
        assert_eq!(
            add_column(&table, &column),
            "ALTER TABLE raw.users ADD COLUMN age BIGINT"
        );
        assert_eq!(
            alter_column_type(&table, "name", "TEXT"),
            "ALTER TABLE raw.users ALTER name TYPE TEXT"
        );
    }
}
