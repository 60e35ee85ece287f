//! Default value derivation.

use serde_json::{Map, Value};

use super::{SchemaRef, SchemaType};

/// Derives the default value of a schema.
///
/// An explicit `default_value` wins. Otherwise primitives and text get an
/// empty value when required and `None` when optional, while maps and lists
/// always default to an empty container (maps filled with their children's
/// defaults).
pub fn get_default_value(schema: &SchemaType) -> Option<Value> {
    default_with_stack(schema, &mut Vec::new())
}

fn default_with_stack(schema: &SchemaType, expanding: &mut Vec<SchemaRef>) -> Option<Value> {
    let options = schema.options();
    if let Some(value) = &options.default_value {
        return Some(value.clone());
    }

    match schema {
        SchemaType::String(o) | SchemaType::LoroText(o) => {
            o.required.then(|| Value::String(String::new()))
        }
        SchemaType::Number(o) => o.required.then(|| Value::from(0)),
        SchemaType::Boolean(o) => o.required.then_some(Value::Bool(false)),
        SchemaType::Ignore(_) => None,
        SchemaType::LoroList(_) | SchemaType::LoroMovableList(_) => Some(Value::Array(Vec::new())),
        SchemaType::LoroMap(m) | SchemaType::Root(m) => {
            let mut object = Map::new();
            for (key, field) in &m.definition {
                // A map that contains itself directly has no finite default.
                if expanding.iter().any(|r| r.same_node(field)) {
                    continue;
                }
                let Some(field_schema) = field.get() else {
                    continue;
                };
                expanding.push(field.clone());
                let value = default_with_stack(field_schema, expanding);
                expanding.pop();
                if let Some(value) = value {
                    object.insert(key.clone(), value);
                }
            }
            Some(Value::Object(object))
        }
    }
}
