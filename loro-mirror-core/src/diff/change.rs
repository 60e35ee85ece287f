//! Change records produced by the diff engine.

use loro::ContainerID;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaRef;
use crate::utils::ContainerKind;

/// What a change does to its target slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Insert,
    Delete,
    InsertContainer,
    Move { from_index: usize, to_index: usize },
}

/// Target slot of a change inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKey {
    Key(String),
    Index(usize),
    /// The whole content of a text container.
    Whole,
}

impl ChangeKey {
    pub fn index(&self) -> Option<usize> {
        match self {
            ChangeKey::Index(i) => Some(*i),
            _ => None,
        }
    }
}

/// A single operation on one container.
#[derive(Debug, Clone)]
pub struct Change {
    pub container: ContainerID,
    pub key: ChangeKey,
    pub value: Value,
    pub kind: ChangeKind,
    pub child_container_type: Option<ContainerKind>,
    /// Schema of a container created by an `InsertContainer` change.
    pub child_schema: Option<SchemaRef>,
}

impl Change {
    pub fn insert(container: &ContainerID, key: ChangeKey, value: Value) -> Self {
        Self {
            container: container.clone(),
            key,
            value,
            kind: ChangeKind::Insert,
            child_container_type: None,
            child_schema: None,
        }
    }

    pub fn delete(container: &ContainerID, key: ChangeKey) -> Self {
        Self {
            container: container.clone(),
            key,
            value: Value::Null,
            kind: ChangeKind::Delete,
            child_container_type: None,
            child_schema: None,
        }
    }

    pub fn insert_container(
        container: &ContainerID,
        key: ChangeKey,
        value: Value,
        child_kind: ContainerKind,
        child_schema: Option<SchemaRef>,
    ) -> Self {
        Self {
            container: container.clone(),
            key,
            value,
            kind: ChangeKind::InsertContainer,
            child_container_type: Some(child_kind),
            child_schema,
        }
    }

    /// Inserts `value` as a container when `kind` is set, as a plain value otherwise.
    pub fn insert_value(
        container: &ContainerID,
        key: ChangeKey,
        value: Value,
        kind: Option<ContainerKind>,
        schema: Option<&SchemaRef>,
    ) -> Self {
        match kind {
            Some(kind) => Self::insert_container(container, key, value, kind, schema.cloned()),
            None => Self::insert(container, key, value),
        }
    }

    pub fn move_item(container: &ContainerID, from_index: usize, to_index: usize, value: Value) -> Self {
        Self {
            container: container.clone(),
            key: ChangeKey::Index(from_index),
            value,
            kind: ChangeKind::Move {
                from_index,
                to_index,
            },
            child_container_type: None,
            child_schema: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }

    pub fn is_move(&self) -> bool {
        matches!(self.kind, ChangeKind::Move { .. })
    }
}
