//! Schema descriptors for mirrored state.
//!
//! A schema describes how each field of the application state maps onto the
//! Loro document: primitive leaves are stored as plain values inside their
//! parent container, while `LoroMap`, `LoroList`, `LoroMovableList` and
//! `LoroText` fields are backed by containers of their own.
//!
//! # Example
//!
//! ```ignore
//! use loro_mirror_core::schema::*;
//!
//! let todo = loro_map([
//!     ("id", string().required()),
//!     ("text", string()),
//!     ("completed", boolean()),
//! ]);
//! let root = schema([("todos", loro_list(todo).with_id_selector(by_key("id")))]);
//! ```
//!
//! # Recursive schemas
//!
//! Tree-shaped data is described with a deferred [`SchemaRef`] that is used
//! inside its own definition and defined afterwards:
//!
//! ```ignore
//! let node = SchemaRef::deferred();
//! let _ = node.define(loro_map([
//!     ("id", string().required().into()),
//!     ("children", loro_movable_list(node.clone(), by_key("id")).into()),
//! ]));
//! ```

mod defaults;
mod validate;

pub use defaults::get_default_value;
pub use validate::{validate_schema, ValidationResult};

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::utils::ContainerKind;

/// Extracts a stable identity string from a list item.
pub type IdSelector = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Custom validation hook. Returns an error message for invalid values.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Named sub-schemas of a map or of the root.
pub type SchemaDefinition = BTreeMap<String, SchemaRef>;

/// Options shared by every schema type.
#[derive(Clone, Default)]
pub struct FieldOptions {
    pub required: bool,
    pub default_value: Option<Value>,
    pub description: Option<String>,
    pub validate: Option<Validator>,
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("required", &self.required)
            .field("default_value", &self.default_value)
            .field("description", &self.description)
            .field("validate", &self.validate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Schema of a map container (or of the document root).
#[derive(Clone, Default)]
pub struct MapSchema {
    pub definition: SchemaDefinition,
    pub options: FieldOptions,
}

/// Schema of a list or movable list container.
#[derive(Clone)]
pub struct ListSchema {
    pub item: SchemaRef,
    pub id_selector: Option<IdSelector>,
    pub options: FieldOptions,
}

/// A schema node.
#[derive(Clone)]
pub enum SchemaType {
    String(FieldOptions),
    Number(FieldOptions),
    Boolean(FieldOptions),
    /// Field kept in memory only, never written to the document.
    Ignore(FieldOptions),
    LoroMap(MapSchema),
    LoroList(ListSchema),
    LoroMovableList(ListSchema),
    LoroText(FieldOptions),
    Root(MapSchema),
}

impl SchemaType {
    /// Returns the short type name used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SchemaType::String(_) => "string",
            SchemaType::Number(_) => "number",
            SchemaType::Boolean(_) => "boolean",
            SchemaType::Ignore(_) => "ignore",
            SchemaType::LoroMap(_) => "loro-map",
            SchemaType::LoroList(_) => "loro-list",
            SchemaType::LoroMovableList(_) => "loro-movable-list",
            SchemaType::LoroText(_) => "loro-text",
            SchemaType::Root(_) => "schema",
        }
    }

    pub fn options(&self) -> &FieldOptions {
        match self {
            SchemaType::String(o)
            | SchemaType::Number(o)
            | SchemaType::Boolean(o)
            | SchemaType::Ignore(o)
            | SchemaType::LoroText(o) => o,
            SchemaType::LoroMap(m) | SchemaType::Root(m) => &m.options,
            SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => &l.options,
        }
    }

    pub fn options_mut(&mut self) -> &mut FieldOptions {
        match self {
            SchemaType::String(o)
            | SchemaType::Number(o)
            | SchemaType::Boolean(o)
            | SchemaType::Ignore(o)
            | SchemaType::LoroText(o) => o,
            SchemaType::LoroMap(m) | SchemaType::Root(m) => &mut m.options,
            SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => &mut l.options,
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.options_mut().required = true;
        self
    }

    /// Sets an explicit default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.options_mut().default_value = Some(value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.options_mut().description = Some(description.into());
        self
    }

    /// Adds a custom validation hook that runs after the structural checks.
    pub fn validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.options_mut().validate = Some(Arc::new(hook));
        self
    }

    /// Sets the id selector of a list schema.
    ///
    /// With a selector a `LoroList` is reconciled by item identity instead of
    /// by position. Has no effect on non-list schemas.
    pub fn with_id_selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        if let SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) = &mut self {
            l.id_selector = Some(Arc::new(selector));
        }
        self
    }

    /// Returns the container kind backing this schema, if any.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match self {
            SchemaType::LoroMap(_) => Some(ContainerKind::Map),
            SchemaType::LoroList(_) => Some(ContainerKind::List),
            SchemaType::LoroMovableList(_) => Some(ContainerKind::MovableList),
            SchemaType::LoroText(_) => Some(ContainerKind::Text),
            _ => None,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, SchemaType::Ignore(_))
    }

    /// Looks up a named field of a map or root schema.
    pub fn field(&self, key: &str) -> Option<&SchemaType> {
        self.field_ref(key).and_then(SchemaRef::get)
    }

    pub fn field_ref(&self, key: &str) -> Option<&SchemaRef> {
        match self {
            SchemaType::LoroMap(m) | SchemaType::Root(m) => m.definition.get(key),
            _ => None,
        }
    }

    /// Returns the item schema of a list.
    pub fn item(&self) -> Option<&SchemaType> {
        self.item_ref().and_then(SchemaRef::get)
    }

    pub fn item_ref(&self) -> Option<&SchemaRef> {
        match self {
            SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => Some(&l.item),
            _ => None,
        }
    }

    pub fn id_selector(&self) -> Option<&IdSelector> {
        match self {
            SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => l.id_selector.as_ref(),
            _ => None,
        }
    }

    /// Returns the named fields of a map or root schema.
    pub fn definition(&self) -> Option<&SchemaDefinition> {
        match self {
            SchemaType::LoroMap(m) | SchemaType::Root(m) => Some(&m.definition),
            _ => None,
        }
    }
}

impl fmt::Debug for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::LoroMap(m) | SchemaType::Root(m) => f
                .debug_struct(self.kind_name())
                .field("definition", &m.definition)
                .field("options", &m.options)
                .finish(),
            SchemaType::LoroList(l) | SchemaType::LoroMovableList(l) => f
                .debug_struct(self.kind_name())
                .field("item", &l.item)
                .field("id_selector", &l.id_selector.as_ref().map(|_| "<fn>"))
                .field("options", &l.options)
                .finish(),
            other => f
                .debug_struct(other.kind_name())
                .field("options", other.options())
                .finish(),
        }
    }
}

/// Shared, possibly deferred, reference to a schema node.
///
/// Cloning is cheap; clones point at the same node. A deferred reference
/// resolves to `None` until [`SchemaRef::define`] is called, and a
/// self-referencing definition forms a cycle in the schema graph only.
#[derive(Clone)]
pub struct SchemaRef(Arc<OnceLock<SchemaType>>);

impl SchemaRef {
    pub fn new(schema: SchemaType) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(schema);
        Self(Arc::new(cell))
    }

    /// Creates an undefined reference, to be filled with [`SchemaRef::define`].
    pub fn deferred() -> Self {
        Self(Arc::new(OnceLock::new()))
    }

    /// Defines a deferred reference. Fails with the given schema if the
    /// reference was already defined.
    pub fn define(&self, schema: SchemaType) -> Result<(), SchemaType> {
        self.0.set(schema)
    }

    pub fn get(&self) -> Option<&SchemaType> {
        self.0.get()
    }

    /// Returns true if both references point at the same node.
    pub fn same_node(&self, other: &SchemaRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<SchemaType> for SchemaRef {
    fn from(schema: SchemaType) -> Self {
        SchemaRef::new(schema)
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the kind is printed so recursive schemas terminate.
        match self.get() {
            Some(schema) => write!(f, "SchemaRef({})", schema.kind_name()),
            None => write!(f, "SchemaRef(<undefined>)"),
        }
    }
}

fn definition<I, K, S>(fields: I) -> SchemaDefinition
where
    I: IntoIterator<Item = (K, S)>,
    K: Into<String>,
    S: Into<SchemaRef>,
{
    fields
        .into_iter()
        .map(|(k, s)| (k.into(), s.into()))
        .collect()
}

/// Builds the top-level schema of a mirrored document.
pub fn schema<I, K, S>(fields: I) -> SchemaType
where
    I: IntoIterator<Item = (K, S)>,
    K: Into<String>,
    S: Into<SchemaRef>,
{
    SchemaType::Root(MapSchema {
        definition: definition(fields),
        options: FieldOptions::default(),
    })
}

pub fn string() -> SchemaType {
    SchemaType::String(FieldOptions::default())
}

pub fn number() -> SchemaType {
    SchemaType::Number(FieldOptions::default())
}

pub fn boolean() -> SchemaType {
    SchemaType::Boolean(FieldOptions::default())
}

pub fn ignore() -> SchemaType {
    SchemaType::Ignore(FieldOptions::default())
}

/// A map container with named sub-schemas.
pub fn loro_map<I, K, S>(fields: I) -> SchemaType
where
    I: IntoIterator<Item = (K, S)>,
    K: Into<String>,
    S: Into<SchemaRef>,
{
    SchemaType::LoroMap(MapSchema {
        definition: definition(fields),
        options: FieldOptions::default(),
    })
}

/// A list container. Add an id selector with [`SchemaType::with_id_selector`]
/// to reconcile items by identity.
pub fn loro_list(item: impl Into<SchemaRef>) -> SchemaType {
    SchemaType::LoroList(ListSchema {
        item: item.into(),
        id_selector: None,
        options: FieldOptions::default(),
    })
}

/// A movable list container. Moves need stable identity, so the id selector
/// is mandatory.
pub fn loro_movable_list<F>(item: impl Into<SchemaRef>, id_selector: F) -> SchemaType
where
    F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
{
    SchemaType::LoroMovableList(ListSchema {
        item: item.into(),
        id_selector: Some(Arc::new(id_selector)),
        options: FieldOptions::default(),
    })
}

/// A collaborative text field.
pub fn loro_text() -> SchemaType {
    SchemaType::LoroText(FieldOptions::default())
}

/// Id selector reading a string or number field of an object item.
pub fn by_key(key: &str) -> impl Fn(&Value) -> Option<String> + Send + Sync + 'static {
    let key = key.to_string();
    move |item: &Value| match item.get(&key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders_set_options() {
        let s = string()
            .required()
            .default_value("x")
            .description("a name");
        let opts = s.options();
        assert!(opts.required);
        assert_eq!(opts.default_value, Some(json!("x")));
        assert_eq!(opts.description.as_deref(), Some("a name"));
    }

    #[test]
    fn test_container_kind() {
        assert_eq!(string().container_kind(), None);
        assert_eq!(
            loro_map([("a", string())]).container_kind(),
            Some(ContainerKind::Map)
        );
        assert_eq!(
            loro_list(string()).container_kind(),
            Some(ContainerKind::List)
        );
        assert_eq!(
            loro_movable_list(string(), by_key("id")).container_kind(),
            Some(ContainerKind::MovableList)
        );
        assert_eq!(loro_text().container_kind(), Some(ContainerKind::Text));
        assert_eq!(schema([("a", loro_text())]).container_kind(), None);
    }

    #[test]
    fn test_id_selector_only_on_lists() {
        let list = loro_list(string()).with_id_selector(|v| v.as_str().map(String::from));
        assert!(list.id_selector().is_some());

        let map = loro_map([("a", string())]).with_id_selector(|_| None);
        assert!(map.id_selector().is_none());
    }

    #[test]
    fn test_by_key() {
        let select = by_key("id");
        assert_eq!(select(&json!({"id": "a"})), Some("a".to_string()));
        assert_eq!(select(&json!({"id": 7})), Some("7".to_string()));
        assert_eq!(select(&json!({"name": "a"})), None);
        assert_eq!(select(&json!("a")), None);
    }

    #[test]
    fn test_field_lookup() {
        let root = schema([("todos", loro_list(loro_map([("id", string())])))]);
        let todos = root.field("todos").unwrap();
        assert_eq!(todos.kind_name(), "loro-list");
        assert_eq!(todos.item().unwrap().field("id").unwrap().kind_name(), "string");
        assert!(root.field("missing").is_none());
    }

    #[test]
    fn test_recursive_schema() {
        let node = SchemaRef::deferred();
        assert!(node.get().is_none());

        let defined = node.define(loro_map([
            ("id", SchemaRef::from(string().required())),
            ("children", loro_movable_list(node.clone(), by_key("id")).into()),
        ]));
        assert!(defined.is_ok());

        let children = node.get().unwrap().field("children").unwrap();
        let item = children.item().unwrap();
        assert_eq!(item.kind_name(), "loro-map");
        assert!(item.field("children").is_some());

        // Debug output must terminate on the cycle.
        let printed = format!("{:?}", node.get().unwrap());
        assert!(printed.contains("SchemaRef(loro-movable-list)"));
    }

    #[test]
    fn test_define_twice_fails() {
        let node = SchemaRef::deferred();
        assert!(node.define(string()).is_ok());
        assert!(node.define(number()).is_err());
        assert_eq!(node.get().unwrap().kind_name(), "string");
    }
}
