//! Store facade over a [`Mirror`].

use loro::LoroDoc;
use serde_json::Value;
use thiserror::Error;

use loro_mirror_core::{
    InferOptions, Mirror, MirrorError, MirrorOptions, SchemaRef, SetStateOptions, StateUpdate,
    SubscriberId, UpdateMetadata,
};

use crate::config::StoreConfig;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct StoreOptions {
    pub doc: LoroDoc,
    pub schema: SchemaRef,
    pub initial_state: Option<Value>,
    pub validate_updates: bool,
    pub throw_on_validation_error: bool,
    pub debug: bool,
    pub infer_options: InferOptions,
}

impl StoreOptions {
    pub fn new(doc: LoroDoc, schema: impl Into<SchemaRef>) -> Self {
        Self {
            doc,
            schema: schema.into(),
            initial_state: None,
            validate_updates: true,
            throw_on_validation_error: false,
            debug: false,
            infer_options: InferOptions::default(),
        }
    }

    /// Takes the behavior settings from a loaded config.
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.validate_updates = config.validate_updates.value;
        self.throw_on_validation_error = config.throw_on_validation_error.value;
        self.debug = config.debug.value;
        self.infer_options = config.infer_options();
        self
    }

    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn throw_on_validation_error(mut self, enabled: bool) -> Self {
        self.throw_on_validation_error = enabled;
        self
    }

    fn into_mirror_options(self) -> MirrorOptions {
        let options = MirrorOptions::new(self.doc, self.schema)
            .validate_updates(self.validate_updates)
            .throw_on_validation_error(self.throw_on_validation_error)
            .debug(self.debug)
            .infer_options(self.infer_options);
        match self.initial_state {
            Some(state) => options.initial_state(state),
            None => options,
        }
    }
}

/// Creates a store backed by a new mirror.
pub fn create_store(options: StoreOptions) -> Result<Store> {
    let mirror = Mirror::new(options.into_mirror_options())?;
    Ok(Store { mirror })
}

/// Application-facing wrapper around a [`Mirror`].
#[derive(Debug)]
pub struct Store {
    mirror: Mirror,
}

impl Store {
    pub fn get_state(&self) -> &Value {
        self.mirror.state()
    }

    /// Merges `partial` into the top level of the state.
    pub fn set_state(&mut self, partial: Value) -> Result<()> {
        self.set_state_with(StateUpdate::Partial(partial), Vec::new())
    }

    /// Replaces the state with the result of `updater`.
    pub fn update_state<F>(&mut self, updater: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value + 'static,
    {
        self.set_state_with(StateUpdate::updater(updater), Vec::new())
    }

    pub fn set_state_with(&mut self, update: StateUpdate, tags: Vec<String>) -> Result<()> {
        self.mirror.set_state(update, SetStateOptions { tags })?;
        Ok(())
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: Fn(&Value, &UpdateMetadata) + Send + 'static,
    {
        self.mirror.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.mirror.unsubscribe(id)
    }

    pub fn sync_from_loro(&mut self) -> usize {
        self.mirror.sync_from_loro()
    }

    pub fn sync_to_loro(&mut self) -> Result<()> {
        self.mirror.sync_to_loro()?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.mirror.sync()?;
        Ok(())
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut Mirror {
        &mut self.mirror
    }

    pub fn loro(&self) -> &LoroDoc {
        self.mirror.doc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro_mirror_core::schema::{by_key, loro_list, loro_map, schema, string};
    use loro_mirror_core::SyncDirection;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn notes_store() -> Store {
        let root = schema([
            (
                "notes",
                loro_list(loro_map([("id", string().required()), ("body", string())]))
                    .with_id_selector(by_key("id")),
            ),
            ("filter", string()),
        ]);
        create_store(StoreOptions::new(LoroDoc::new(), root)).unwrap()
    }

    #[test]
    fn test_set_and_get_state() {
        let mut store = notes_store();
        store
            .set_state(json!({"notes": [{"id": "n1", "body": "hi"}]}))
            .unwrap();
        store.set_state(json!({"filter": "all"})).unwrap();

        assert_eq!(
            store.get_state(),
            &json!({"notes": [{"id": "n1", "body": "hi"}], "filter": "all"})
        );
    }

    #[test]
    fn test_update_state_and_sync() {
        let mut store = notes_store();
        store
            .update_state(|state| {
                let mut next = state.clone();
                next["notes"] = json!([{"id": "n1"}, {"id": "n2"}]);
                next
            })
            .unwrap();

        let notes = store.loro().get_list("notes");
        notes.delete(0, 1).unwrap();
        store.loro().commit();
        store.sync().unwrap();

        assert_eq!(store.get_state()["notes"], json!([{"id": "n2"}]));
    }

    #[test]
    fn test_subscribers_see_directions() {
        let mut store = notes_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(move |_, meta| sink.lock().unwrap().push(meta.direction));

        store.set_state(json!({"filter": "open"})).unwrap();
        store.sync_from_loro();
        assert!(store.unsubscribe(id));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncDirection::ToLoro, SyncDirection::FromLoro]
        );
    }

    #[test]
    fn test_validation_errors_surface() {
        let root = schema([("notes", loro_list(loro_map([("id", string().required())])))]);
        let mut store = create_store(
            StoreOptions::new(LoroDoc::new(), root).throw_on_validation_error(true),
        )
        .unwrap();

        let err = store.set_state(json!({"notes": [{}]})).unwrap_err();
        assert!(matches!(err, StoreError::Mirror(MirrorError::Validation(_))));
    }
}
