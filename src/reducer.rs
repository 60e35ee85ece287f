//! Action-based updates on top of a [`Store`].

use serde_json::Value;
use std::collections::HashMap;

use loro_mirror_core::StateUpdate;

use crate::store::{Result, Store, StoreError};

/// Mutates a draft of the state in response to an action payload.
pub type ActionHandler = Box<dyn Fn(&mut Value, &Value) + Send + Sync>;

/// Dispatches named actions to their handlers.
pub struct Reducer {
    handlers: HashMap<String, ActionHandler>,
}

/// Builds a reducer from `(action type, handler)` pairs.
pub fn create_reducer<I, K>(handlers: I) -> Reducer
where
    I: IntoIterator<Item = (K, ActionHandler)>,
    K: Into<String>,
{
    Reducer {
        handlers: handlers
            .into_iter()
            .map(|(action, handler)| (action.into(), handler))
            .collect(),
    }
}

impl Reducer {
    pub fn handles(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Runs the handler for `action` on a copy of the store state and writes
    /// the result back, tagged with the action type.
    pub fn dispatch(&self, store: &mut Store, action: &str, payload: Value) -> Result<()> {
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| StoreError::UnknownAction(action.to_string()))?;

        let mut draft = store.get_state().clone();
        handler(&mut draft, &payload);
        tracing::debug!(action, "dispatching action");
        store.set_state_with(StateUpdate::Partial(draft), vec![action.to_string()])
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<&String> = self.handlers.keys().collect();
        actions.sort();
        f.debug_struct("Reducer").field("actions", &actions).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{create_store, StoreOptions};
    use loro::LoroDoc;
    use loro_mirror_core::schema::{boolean, by_key, loro_list, loro_map, schema, string};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn todo_store() -> Store {
        let root = schema([(
            "todos",
            loro_list(loro_map([
                ("id", string().required()),
                ("text", string()),
                ("completed", boolean()),
            ]))
            .with_id_selector(by_key("id")),
        )]);
        create_store(StoreOptions::new(LoroDoc::new(), root)).unwrap()
    }

    fn todo_reducer() -> Reducer {
        create_reducer([
            (
                "add",
                Box::new(|draft: &mut Value, payload: &Value| {
                    if let Some(todos) = draft["todos"].as_array_mut() {
                        todos.push(payload.clone());
                    }
                }) as ActionHandler,
            ),
            (
                "toggle",
                Box::new(|draft: &mut Value, payload: &Value| {
                    let Some(todos) = draft["todos"].as_array_mut() else {
                        return;
                    };
                    for todo in todos.iter_mut().filter(|t| t["id"] == payload["id"]) {
                        let done = todo["completed"].as_bool().unwrap_or(false);
                        todo["completed"] = json!(!done);
                    }
                }) as ActionHandler,
            ),
        ])
    }

    #[test]
    fn test_dispatch_updates_state_and_doc() {
        let mut store = todo_store();
        let reducer = todo_reducer();

        reducer
            .dispatch(&mut store, "add", json!({"id": "1", "text": "a", "completed": false}))
            .unwrap();
        reducer.dispatch(&mut store, "toggle", json!({"id": "1"})).unwrap();

        let expected = json!({"todos": [{"id": "1", "text": "a", "completed": true}]});
        assert_eq!(store.get_state(), &expected);
        store.sync_from_loro();
        assert_eq!(store.get_state(), &expected);
    }

    #[test]
    fn test_dispatch_tags_updates_with_action() {
        let mut store = todo_store();
        let reducer = todo_reducer();
        let tags = Arc::new(Mutex::new(Vec::new()));
        let sink = tags.clone();
        store.subscribe(move |_, meta| sink.lock().unwrap().extend(meta.tags.clone()));

        reducer.dispatch(&mut store, "add", json!({"id": "1"})).unwrap();
        assert_eq!(*tags.lock().unwrap(), vec!["add".to_string()]);
    }

    #[test]
    fn test_unknown_action() {
        let mut store = todo_store();
        let reducer = todo_reducer();
        assert!(reducer.handles("add"));

        let err = reducer.dispatch(&mut store, "remove", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::UnknownAction(a) if a == "remove"));
    }
}
