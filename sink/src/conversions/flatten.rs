use std::collections::BTreeSet;

use serde_json::Value;

use crate::types::Record;

/// Normalizes one path segment into a column-safe identifier.
///
/// CamelCase turns into snake_case and any character outside `[a-z0-9_]` is
/// squashed to an underscore, so `clientName` becomes `client_name` and
/// `$.env` becomes `d__env`-style names when nested under `d`.
fn normalize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_lower_or_digit = false;

    for ch in segment.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            prev_lower_or_digit = true;
        } else {
            out.push('_');
            prev_lower_or_digit = false;
        }
    }

    out
}

/// Builds the flattened column name for a key nested under `parents`.
///
/// Nesting levels are joined with a double underscore, matching the column
/// names the schema inference produces.
pub fn flatten_key(key: &str, parents: &[String]) -> String {
    let mut parts: Vec<String> = parents.to_vec();
    parts.push(normalize_segment(key));
    parts.join("__")
}

/// Flattens a nested record into a flat column-name to scalar mapping.
///
/// Objects are descended into unless their flattened path is itself a
/// declared column, in which case the whole value is kept as semi-structured
/// data. Arrays and scalars are always stored as-is under their flattened
/// name.
pub fn flatten_record(record: &Value, declared_columns: &BTreeSet<String>) -> Record {
    let mut out = Record::new();

    if let Value::Object(map) = record {
        flatten_object(map, &[], declared_columns, &mut out);
    }

    out
}

fn flatten_object(
    map: &serde_json::Map<String, Value>,
    parents: &[String],
    declared_columns: &BTreeSet<String>,
    out: &mut Record,
) {
    for (key, value) in map {
        let flat = flatten_key(key, parents);

        match value {
            Value::Object(nested) if !declared_columns.contains(&flat) => {
                let mut next_parents = parents.to_vec();
                next_parents.push(normalize_segment(key));
                flatten_object(nested, &next_parents, declared_columns, out);
            }
            _ => out.insert(flat, value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn camelcase_keys_are_snake_cased() {
        assert_eq!(flatten_key("clientName", &[]), "client_name");
        assert_eq!(flatten_key("id", &[]), "id");
        assert_eq!(flatten_key("_id", &[]), "_id");
    }

    #[test]
    fn nested_objects_flatten_with_double_underscores() {
        let record = json!({"id": 1, "info": {"weather": "sunny", "mood": "ok"}});
        let flat = flatten_record(
            &record,
            &columns(&["id", "info__weather", "info__mood"]),
        );

        assert_eq!(flat.get("id"), Some(&json!(1)));
        assert_eq!(flat.get("info__weather"), Some(&json!("sunny")));
        assert_eq!(flat.get("info__mood"), Some(&json!("ok")));
    }

    #[test]
    fn declared_object_columns_stay_semistructured() {
        let record = json!({"object_store": {"id": 1, "metric": 187}});
        let flat = flatten_record(&record, &columns(&["object_store"]));

        assert_eq!(
            flat.get("object_store"),
            Some(&json!({"id": 1, "metric": 187}))
        );
    }

    #[test]
    fn special_characters_become_underscores() {
        let record = json!({"d": {"agent-type": "bot", "agent os version": "1.2"}});
        let flat = flatten_record(
            &record,
            &columns(&["d__agent_type", "d__agent_os_version"]),
        );

        assert_eq!(flat.get("d__agent_type"), Some(&json!("bot")));
        assert_eq!(flat.get("d__agent_os_version"), Some(&json!("1.2")));
    }

    #[test]
    fn arrays_are_kept_whole() {
        let record = json!({"id": 1, "fruits": ["apple", "pear"]});
        let flat = flatten_record(&record, &columns(&["id", "fruits"]));

        assert_eq!(flat.get("fruits"), Some(&json!(["apple", "pear"])));
    }
}
