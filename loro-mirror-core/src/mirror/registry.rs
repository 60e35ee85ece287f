//! Registry of containers known to a mirror.

use loro::ContainerID;
use std::collections::HashMap;

use crate::schema::SchemaRef;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub container_id: ContainerID,
    pub schema: Option<SchemaRef>,
    pub registered: bool,
}

/// Containers the mirror has seen, keyed by id, with the schema that
/// describes each one.
///
/// Entries are never removed when a container is deleted from the document.
/// Deleted containers keep their entry until the mirror is dropped.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entries: HashMap<ContainerID, RegistryEntry>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container. A known container keeps its schema unless it
    /// had none yet. Returns true if the container was not known before.
    pub fn register(&mut self, container_id: ContainerID, schema: Option<SchemaRef>) -> bool {
        match self.entries.get_mut(&container_id) {
            Some(entry) => {
                if entry.schema.is_none() {
                    entry.schema = schema;
                }
                false
            }
            None => {
                self.entries.insert(
                    container_id.clone(),
                    RegistryEntry {
                        container_id,
                        schema,
                        registered: true,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, container_id: &ContainerID) -> Option<&RegistryEntry> {
        self.entries.get(container_id)
    }

    pub fn schema_of(&self, container_id: &ContainerID) -> Option<&SchemaRef> {
        self.get(container_id).and_then(|e| e.schema.as_ref())
    }

    pub fn contains(&self, container_id: &ContainerID) -> bool {
        self.entries.contains_key(container_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
