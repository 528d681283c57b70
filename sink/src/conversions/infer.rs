use serde_json::Value;

use crate::bail;
use crate::conversions::flatten_key;
use crate::error::{ErrorKind, SinkResult};
use crate::types::{ColumnDef, ColumnType, TableDef};

/// Derives a logical table definition from a declared JSON Schema.
///
/// Properties are walked depth-first with the same flattening rules the
/// record flattener applies, so column names line up with flattened record
/// attributes. Objects that declare their own properties contribute one
/// column per nested property; objects and arrays without properties become
/// a single semi-structured column. The configured ingestion timestamp
/// column is appended when the schema does not already declare it.
///
/// A schema without at least one top-level property cannot be materialized
/// as a relational table and is rejected.
pub fn table_definition_from_schema(
    schema_namespace: &str,
    stream: &str,
    json_schema: &Value,
    key_properties: &[String],
    timestamp_column: &str,
) -> SinkResult<TableDef> {
    let properties = json_schema.get("properties").and_then(Value::as_object);
    let Some(properties) = properties.filter(|map| !map.is_empty()) else {
        bail!(
            ErrorKind::UnsupportedSchema,
            "Schema has no properties",
            format!(
                "stream {stream}: it should have at least one top level property in its schema"
            )
        );
    };

    let mut columns = Vec::new();
    collect_columns(properties, &[], key_properties, &mut columns);

    if !columns.iter().any(|c| c.name == timestamp_column) {
        columns.push(ColumnDef::new(
            timestamp_column,
            ColumnType::Timestamp,
            false,
        ));
    }

    Ok(TableDef::new(schema_namespace, stream, columns))
}

fn collect_columns(
    properties: &serde_json::Map<String, Value>,
    parents: &[String],
    key_properties: &[String],
    out: &mut Vec<ColumnDef>,
) {
    for (name, property) in properties {
        let flat = flatten_key(name, parents);

        let nested = property.get("properties").and_then(Value::as_object);
        if let Some(nested) = nested.filter(|map| !map.is_empty()) {
            let mut next_parents = parents.to_vec();
            next_parents.push(flatten_key(name, &[]));
            collect_columns(nested, &next_parents, key_properties, out);
            continue;
        }

        let primary_key = key_properties.contains(&flat);
        out.push(ColumnDef::new(flat, column_type(property), primary_key));
    }
}

/// Maps one property schema to a logical column type.
fn column_type(property: &Value) -> ColumnType {
    let declared = match property.get("type") {
        Some(Value::String(ty)) => Some(ty.as_str()),
        // Union types like ["null", "string"] mean a nullable column of the
        // first non-null member.
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ => None,
    };

    match declared {
        Some("string") => {
            if property.get("format").and_then(Value::as_str) == Some("date-time") {
                ColumnType::Timestamp
            } else {
                ColumnType::Text
            }
        }
        Some("integer") => ColumnType::Integer,
        Some("number") => ColumnType::Number,
        Some("boolean") => ColumnType::Boolean,
        // Objects without properties, arrays, and undeclared types all land
        // in a semi-structured column.
        _ => ColumnType::Variant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_scalar_columns_and_keys() {
        let schema = json!({
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": ["null", "string"]},
                "score": {"type": "number"},
                "active": {"type": "boolean"},
                "created_at": {"type": "string", "format": "date-time"}
            }
        });

        let table = table_definition_from_schema(
            "raw",
            "users",
            &schema,
            &["id".to_string()],
            "__loaded_at",
        )
        .unwrap();

        let by_name = |name: &str| table.columns.iter().find(|c| c.name == name).unwrap();
        assert_eq!(by_name("id").ty, ColumnType::Integer);
        assert!(by_name("id").primary_key);
        assert_eq!(by_name("name").ty, ColumnType::Text);
        assert_eq!(by_name("score").ty, ColumnType::Number);
        assert_eq!(by_name("active").ty, ColumnType::Boolean);
        assert_eq!(by_name("created_at").ty, ColumnType::Timestamp);
        assert_eq!(by_name("__loaded_at").ty, ColumnType::Timestamp);
    }

    #[test]
    fn nested_properties_flatten_into_columns() {
        let schema = json!({
            "properties": {
                "id": {"type": "integer"},
                "info": {
                    "type": "object",
                    "properties": {
                        "weather": {"type": "string"},
                        "mood": {"type": "string"}
                    }
                }
            }
        });

        let table =
            table_definition_from_schema("raw", "visits", &schema, &[], "__loaded_at").unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();

        assert!(names.contains(&"info__weather"));
        assert!(names.contains(&"info__mood"));
        assert!(!names.contains(&"info"));
    }

    #[test]
    fn object_without_properties_becomes_variant() {
        let schema = json!({
            "properties": {
                "object_store": {"type": "object"}
            }
        });

        let table =
            table_definition_from_schema("raw", "objects", &schema, &[], "__loaded_at").unwrap();
        let store = table
            .columns
            .iter()
            .find(|c| c.name == "object_store")
            .unwrap();

        assert_eq!(store.ty, ColumnType::Variant);
    }

    #[test]
    fn schema_without_properties_is_rejected() {
        let err = table_definition_from_schema(
            "raw",
            "users",
            &json!({"type": "object"}),
            &[],
            "__loaded_at",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsupportedSchema);
    }

    #[test]
    fn empty_properties_object_is_rejected() {
        let err = table_definition_from_schema(
            "raw",
            "users",
            &json!({"properties": {}}),
            &[],
            "__loaded_at",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsupportedSchema);
    }
}
