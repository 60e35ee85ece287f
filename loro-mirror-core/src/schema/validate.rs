//! Recursive validation of state values against a schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::SchemaType;
use crate::utils::value_type_name;

/// Outcome of validating a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Path-qualified messages, e.g. `todos[0].id: is required`.
    pub errors: Vec<String>,
}

/// Validates `value` against `schema`, collecting every error found.
///
/// `null` is treated as an absent value. Errors from sibling fields are
/// aggregated rather than stopping at the first one.
pub fn validate_schema(schema: &SchemaType, value: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    validate_at(schema, Some(value), "", &mut errors);
    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn validate_at(schema: &SchemaType, value: Option<&Value>, path: &str, errors: &mut Vec<String>) {
    let value = match value {
        None | Some(Value::Null) => {
            if schema.options().required && !schema.is_ignore() {
                errors.push(message(path, "is required"));
            }
            return;
        }
        Some(v) => v,
    };

    match schema {
        SchemaType::Ignore(_) => return,
        SchemaType::String(_) | SchemaType::LoroText(_) => {
            if !value.is_string() {
                errors.push(type_mismatch(path, "string", value));
                return;
            }
        }
        SchemaType::Number(_) => {
            if !value.is_number() {
                errors.push(type_mismatch(path, "number", value));
                return;
            }
        }
        SchemaType::Boolean(_) => {
            if !value.is_boolean() {
                errors.push(type_mismatch(path, "boolean", value));
                return;
            }
        }
        SchemaType::LoroMap(m) | SchemaType::Root(m) => {
            let Some(object) = value.as_object() else {
                errors.push(type_mismatch(path, "object", value));
                return;
            };
            for (key, field) in &m.definition {
                if let Some(field_schema) = field.get() {
                    validate_at(field_schema, object.get(key), &key_path(path, key), errors);
                }
            }
        }
        SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => {
            let Some(items) = value.as_array() else {
                errors.push(type_mismatch(path, "array", value));
                return;
            };
            if let Some(item_schema) = l.item.get() {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, Some(item), &index_path(path, i), errors);
                }
            }
            if let Some(select) = &l.id_selector {
                let mut seen = HashSet::new();
                for (i, item) in items.iter().enumerate() {
                    match select(item) {
                        Some(id) => {
                            if !seen.insert(id.clone()) {
                                errors.push(message(
                                    &index_path(path, i),
                                    &format!("duplicate id '{}'", id),
                                ));
                            }
                        }
                        None => errors.push(message(&index_path(path, i), "item has no id")),
                    }
                }
            }
        }
    }

    if let Some(hook) = &schema.options().validate {
        if let Err(reason) = hook(value) {
            errors.push(message(path, &reason));
        }
    }
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

fn message(path: &str, msg: &str) -> String {
    if path.is_empty() {
        format!("root: {}", msg)
    } else {
        format!("{}: {}", path, msg)
    }
}

fn type_mismatch(path: &str, expected: &str, value: &Value) -> String {
    message(
        path,
        &format!("expected {}, got {}", expected, value_type_name(value)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{boolean, by_key, loro_list, loro_map, loro_movable_list, number, schema, string};
    use serde_json::json;

    fn todo_schema() -> SchemaType {
        schema([(
            "todos",
            loro_list(loro_map([
                ("id", string().required()),
                ("text", string()),
                ("completed", boolean()),
            ]))
            .with_id_selector(by_key("id")),
        )])
    }

    #[test]
    fn test_valid_state() {
        let result = validate_schema(
            &todo_schema(),
            &json!({"todos": [{"id": "1", "text": "a", "completed": false}]}),
        );
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let result = validate_schema(&todo_schema(), &json!({"todos": [{"text": "no id"}]}));
        assert!(!result.valid);
        assert!(result.errors.contains(&"todos[0].id: is required".to_string()));
        assert!(result.errors.contains(&"todos[0]: item has no id".to_string()));
    }

    #[test]
    fn test_type_mismatch_aggregates_siblings() {
        let root = schema([(
            "profile",
            loro_map([("name", string()), ("age", number()), ("admin", boolean())]),
        )]);
        let result = validate_schema(
            &root,
            &json!({"profile": {"name": 1, "age": "x", "admin": true}}),
        );
        assert_eq!(result.errors.len(), 2);
        assert!(result
            .errors
            .contains(&"profile.name: expected string, got number".to_string()));
        assert!(result
            .errors
            .contains(&"profile.age: expected number, got string".to_string()));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let root = schema([("profile", loro_map([("name", string())]))]);
        assert!(validate_schema(&root, &json!({"profile": {"name": null}})).valid);

        let strict = schema([("profile", loro_map([("name", string().required())]))]);
        assert!(!validate_schema(&strict, &json!({"profile": {"name": null}})).valid);
    }

    #[test]
    fn test_root_must_be_object() {
        let result = validate_schema(&todo_schema(), &json!([1, 2]));
        assert_eq!(result.errors, vec!["root: expected object, got array".to_string()]);
    }

    #[test]
    fn test_duplicate_ids() {
        let root = schema([(
            "items",
            loro_movable_list(loro_map([("id", string())]), by_key("id")),
        )]);
        let result = validate_schema(&root, &json!({"items": [{"id": "a"}, {"id": "a"}]}));
        assert_eq!(result.errors, vec!["items[1]: duplicate id 'a'".to_string()]);
    }

    #[test]
    fn test_custom_validator() {
        let root = schema([(
            "settings",
            loro_map([(
                "volume",
                number().validate(|v| match v.as_f64() {
                    Some(n) if (0.0..=10.0).contains(&n) => Ok(()),
                    _ => Err("volume must be between 0 and 10".to_string()),
                }),
            )]),
        )]);
        assert!(validate_schema(&root, &json!({"settings": {"volume": 3}})).valid);

        let result = validate_schema(&root, &json!({"settings": {"volume": 11}}));
        assert_eq!(
            result.errors,
            vec!["settings.volume: volume must be between 0 and 10".to_string()]
        );
    }

    #[test]
    fn test_custom_validator_skipped_on_type_error() {
        let root = schema([("n", number().validate(|_| Err("never".to_string())))]);
        let result = validate_schema(&root, &json!({"n": "x"}));
        assert_eq!(result.errors, vec!["n: expected number, got string".to_string()]);
    }
}
