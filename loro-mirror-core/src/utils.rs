//! Container kinds, type inference and value helpers.

use loro::{ContainerID, ContainerType, LoroValue};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

use crate::schema::SchemaType;

/// Kinds of Loro containers the mirror knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    Map,
    List,
    MovableList,
    Text,
}

impl ContainerKind {
    pub fn from_container_type(container_type: ContainerType) -> Option<Self> {
        match container_type {
            ContainerType::Map => Some(ContainerKind::Map),
            ContainerType::List => Some(ContainerKind::List),
            ContainerType::MovableList => Some(ContainerKind::MovableList),
            ContainerType::Text => Some(ContainerKind::Text),
            _ => None,
        }
    }

    /// Reads the kind encoded in a container id.
    pub fn from_container_id(id: &ContainerID) -> Option<Self> {
        Self::from_container_type(id.container_type())
    }

    /// Decodes the kind from the string form of a container id, e.g.
    /// `cid:root-todos:List` or `cid:3@12345:MovableList`.
    pub fn from_id_str(id: &str) -> Option<Self> {
        if !id.starts_with("cid:") {
            return None;
        }
        match id.rsplit(':').next()? {
            "Map" => Some(ContainerKind::Map),
            "List" => Some(ContainerKind::List),
            "MovableList" => Some(ContainerKind::MovableList),
            "Text" => Some(ContainerKind::Text),
            _ => None,
        }
    }

    pub fn container_type(self) -> ContainerType {
        match self {
            ContainerKind::Map => ContainerType::Map,
            ContainerKind::List => ContainerType::List,
            ContainerKind::MovableList => ContainerType::MovableList,
            ContainerKind::Text => ContainerType::Text,
        }
    }

    /// The state value of an empty container of this kind.
    pub fn empty_value(self) -> Value {
        match self {
            ContainerKind::Map => Value::Object(serde_json::Map::new()),
            ContainerKind::List | ContainerKind::MovableList => Value::Array(Vec::new()),
            ContainerKind::Text => Value::String(String::new()),
        }
    }

    /// Whether `value` has the shape of this kind's state value.
    pub fn holds(self, value: &Value) -> bool {
        match self {
            ContainerKind::Map => value.is_object(),
            ContainerKind::List | ContainerKind::MovableList => value.is_array(),
            ContainerKind::Text => value.is_string(),
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Map => write!(f, "Map"),
            ContainerKind::List => write!(f, "List"),
            ContainerKind::MovableList => write!(f, "MovableList"),
            ContainerKind::Text => write!(f, "Text"),
        }
    }
}

/// Options for inferring container kinds of values without a schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferOptions {
    /// Store schemaless strings as `LoroText` instead of plain values.
    #[serde(default)]
    pub default_loro_text: bool,
}

/// Decides whether `value` is backed by a container, and of which kind.
///
/// `null` is always a plain value. A container schema decides on its own.
/// Primitive schemas keep scalar
/// values as plain values. Without a usable schema, objects become maps,
/// arrays become lists and strings become text only when
/// `default_loro_text` is set.
pub fn infer_container_kind(
    value: &Value,
    schema: Option<&SchemaType>,
    options: &InferOptions,
) -> Option<ContainerKind> {
    if value.is_null() {
        return None;
    }
    if let Some(schema) = schema {
        if schema.is_ignore() {
            return None;
        }
        if let Some(kind) = schema.container_kind() {
            return Some(kind);
        }
        if !is_compound(value) {
            return None;
        }
    }

    match value {
        Value::Object(_) => Some(ContainerKind::Map),
        Value::Array(_) => Some(ContainerKind::List),
        Value::String(_) if options.default_loro_text && schema.is_none() => {
            Some(ContainerKind::Text)
        }
        _ => None,
    }
}

fn is_compound(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Structural equality where numerically equal numbers (`1` and `1.0`) match.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Integers compare exactly; floats compare by value.
fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if x.is_f64() || y.is_f64() {
        return x.as_f64() == y.as_f64();
    }
    // A negative integer against one above i64::MAX.
    false
}

pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Converts a scalar state value into a Loro value.
///
/// Arrays and objects are always stored as containers, so they yield `None`.
pub fn json_to_loro(value: &Value) -> Option<LoroValue> {
    match value {
        Value::Null => Some(LoroValue::Null),
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => Some(n.as_f64().unwrap_or(0.0).into()),
        },
        Value::String(s) => Some(s.as_str().into()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Converts a (deep) Loro value into a state value.
pub fn loro_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Null => Value::Null,
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::Double(d) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LoroValue::I64(i) => Value::from(*i),
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        LoroValue::List(items) => Value::Array(items.iter().map(loro_to_json).collect()),
        LoroValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), loro_to_json(v)))
                .collect(),
        ),
        LoroValue::Container(id) => Value::String(id.to_string()),
    }
}
