//! The mirror: keeps a plain state tree and a Loro document in sync.
//!
//! ## Directions
//!
//! - TO_LORO: [`Mirror::set_state`] diffs the current state against the next
//!   one, applies the changes to the document and commits them with the
//!   [`TO_LORO_ORIGIN`] origin.
//! - FROM_LORO: document events are queued by the subscription callback and
//!   drained by [`Mirror::process_pending`], [`Mirror::sync_from_loro`] and at
//!   the start of every `set_state`. Events carrying the mirror's own origin
//!   are echoes and are skipped.
//!
//! The mirror is single-threaded: every sync runs to completion under
//! `&mut self`, and [`SyncPhase`] rejects a sync that starts while another is
//! still in progress.

mod apply;
mod events;
mod registry;

pub use apply::{apply_changes, group_by_container, CreatedContainer};
pub use events::{ObservedContainer, ObservedEvent};
pub use registry::{ContainerRegistry, RegistryEntry};

use loro::event::DiffEvent;
use loro::{CommitOptions, ContainerID, LoroDoc, LoroValue, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::diff::{diff_root, Change, DiffContext};
use crate::error::{MirrorError, Result};
use crate::handle::{container_handle, shallow_children, ChildSlot};
use crate::schema::{get_default_value, validate_schema, SchemaRef, SchemaType};
use crate::utils::{infer_container_kind, loro_to_json, InferOptions};

/// Commit origin of changes written by the mirror.
pub const TO_LORO_ORIGIN: &str = "to-loro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    FromLoro,
    ToLoro,
}

/// Passed to subscribers together with the new state.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMetadata {
    pub direction: SyncDirection,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    FromLoro,
    ToLoro,
}

pub type SubscriberId = u64;

type Subscriber = Box<dyn Fn(&Value, &UpdateMetadata) + Send>;

/// Construction options of a [`Mirror`].
pub struct MirrorOptions {
    pub doc: LoroDoc,
    pub schema: SchemaRef,
    pub initial_state: Option<Value>,
    pub validate_updates: bool,
    pub throw_on_validation_error: bool,
    pub debug: bool,
    pub infer_options: InferOptions,
}

impl MirrorOptions {
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

    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn validate_updates(mut self, enabled: bool) -> Self {
        self.validate_updates = enabled;
        self
    }

    pub fn throw_on_validation_error(mut self, enabled: bool) -> Self {
        self.throw_on_validation_error = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn infer_options(mut self, options: InferOptions) -> Self {
        self.infer_options = options;
        self
    }
}

/// A state change requested through [`Mirror::set_state`].
pub enum StateUpdate {
    /// Merged into the current state, one top-level field at a time.
    Partial(Value),
    /// Computes the next state from the current one.
    Updater(Box<dyn FnOnce(&Value) -> Value>),
}

impl StateUpdate {
    pub fn updater<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + 'static,
    {
        StateUpdate::Updater(Box::new(f))
    }
}

impl From<Value> for StateUpdate {
    fn from(value: Value) -> Self {
        StateUpdate::Partial(value)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Partial(value) => f.debug_tuple("Partial").field(value).finish(),
            StateUpdate::Updater(_) => write!(f, "Updater(<fn>)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetStateOptions {
    pub tags: Vec<String>,
}

impl SetStateOptions {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// Bidirectional sync between a state tree and a Loro document.
pub struct Mirror {
    doc: LoroDoc,
    schema: SchemaRef,
    state: Value,
    registry: ContainerRegistry,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber_id: SubscriberId,
    phase: SyncPhase,
    inbox: mpsc::UnboundedReceiver<ObservedEvent>,
    doc_subscription: Option<Subscription>,
    validate_updates: bool,
    throw_on_validation_error: bool,
    debug: bool,
    infer: InferOptions,
}

impl Mirror {
    /// Creates a mirror over `options.doc`.
    ///
    /// The initial state is built from the schema defaults, then the
    /// `initial_state` fields, then whatever the document already holds.
    /// Fields the document does not hold yet are written to it.
    pub fn new(options: MirrorOptions) -> Result<Self> {
        let (sender, inbox) = mpsc::unbounded_channel();
        let subscription = options.doc.subscribe_root(Arc::new(move |event: DiffEvent<'_>| {
            // The receiver only goes away with the mirror.
            let _ = sender.send(ObservedEvent::from_diff_event(&event));
        }));

        let mut mirror = Self {
            doc: options.doc,
            schema: options.schema,
            state: Value::Object(Map::new()),
            registry: ContainerRegistry::new(),
            subscribers: Vec::new(),
            next_subscriber_id: 0,
            phase: SyncPhase::Idle,
            inbox,
            doc_subscription: Some(subscription),
            validate_updates: options.validate_updates,
            throw_on_validation_error: options.throw_on_validation_error,
            debug: options.debug,
            infer: options.infer_options,
        };

        mirror.register_schema_roots();
        mirror.state = mirror.initial_state(options.initial_state);
        mirror.sync_to_loro()?;
        mirror.register_doc_roots();

        // Drop the echoes of the initial write.
        mirror.process_pending();

        debug!(
            containers = mirror.registry.len(),
            "mirror initialized"
        );
        Ok(mirror)
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Updates the state and writes the difference to the document.
    ///
    /// Pending document events are processed first. Validation failures are
    /// returned as [`MirrorError::Validation`] when `throw_on_validation_error`
    /// is set, before the document is touched; otherwise they are logged and
    /// the update is applied anyway.
    pub fn set_state(&mut self, update: impl Into<StateUpdate>, options: SetStateOptions) -> Result<()> {
        self.process_pending();
        if self.phase != SyncPhase::Idle {
            debug!(phase = ?self.phase, "set_state ignored during sync");
            return Ok(());
        }

        let next = match update.into() {
            StateUpdate::Partial(partial) => merge_shallow(&self.state, partial),
            StateUpdate::Updater(f) => f(&self.state),
        };
        self.check(&next)?;

        self.phase = SyncPhase::ToLoro;
        let current = self.state.clone();
        let outcome = self.write_changes(&current, &next);
        self.phase = SyncPhase::Idle;
        outcome?;

        self.state = next;
        self.notify(SyncDirection::ToLoro, options.tags);
        Ok(())
    }

    fn check(&self, next: &Value) -> Result<()> {
        if !self.validate_updates {
            return Ok(());
        }
        let Some(schema) = self.schema.get() else {
            return Ok(());
        };
        let result = validate_schema(schema, next);
        if result.valid {
            return Ok(());
        }
        if self.throw_on_validation_error {
            return Err(MirrorError::Validation(result.errors));
        }
        warn!(errors = ?result.errors, "state failed validation, applying anyway");
        Ok(())
    }

    /// Processes queued document events. Returns the number of non-echo
    /// events that were applied to the state.
    pub fn process_pending(&mut self) -> usize {
        self.pull(false)
    }

    /// Processes queued document events and re-derives the state from the
    /// document, notifying subscribers even when nothing was queued.
    pub fn sync_from_loro(&mut self) -> usize {
        self.pull(true)
    }

    /// Writes whatever differs between the document and the current state to
    /// the document. Pending document events are processed first. Subscribers
    /// are not notified of the write.
    pub fn sync_to_loro(&mut self) -> Result<()> {
        self.process_pending();
        if self.phase != SyncPhase::Idle {
            debug!(phase = ?self.phase, "sync_to_loro ignored during sync");
            return Ok(());
        }
        self.phase = SyncPhase::ToLoro;
        let projection = self.project_doc(&self.state);
        let current = self.state.clone();
        let outcome = self.write_changes(&projection, &current);
        self.phase = SyncPhase::Idle;
        outcome.map(|_| ())
    }

    /// Pushes local state to the document, then pulls the document back.
    pub fn sync(&mut self) -> Result<()> {
        self.sync_to_loro()?;
        self.sync_from_loro();
        Ok(())
    }

    /// Returns the changes needed to bring the document to `next`.
    pub fn diff_state(&self, next: &Value) -> Result<Vec<Change>> {
        let projection = self.project_doc(&self.state);
        diff_root(self.diff_context(), &projection, next, Some(&self.schema))
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: Fn(&Value, &UpdateMetadata) + Send + 'static,
    {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Detaches the mirror from its document and drops all subscribers.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.doc_subscription.take() {
            subscription.unsubscribe();
        }
        self.subscribers.clear();
        while self.inbox.try_recv().is_ok() {}
        debug!("mirror disposed");
    }

    fn diff_context(&self) -> DiffContext<'_> {
        DiffContext::new(&self.doc, &self.infer)
    }

    fn initial_state(&self, initial: Option<Value>) -> Value {
        let defaults = self
            .schema
            .get()
            .and_then(get_default_value)
            .unwrap_or_else(|| Value::Object(Map::new()));
        let mut state = match initial {
            Some(initial) => merge_shallow(&defaults, initial),
            None => defaults,
        };
        if let Value::Object(fields) = &mut state {
            self.fill_schema_roots(fields);
        }

        if let (Value::Object(fields), Value::Object(doc_fields)) =
            (&mut state, loro_to_json(&self.doc.get_deep_value()))
        {
            for (key, value) in doc_fields {
                if !is_empty_value(&value) {
                    fields.insert(key, value);
                }
            }
        }
        state
    }

    /// Writes the changes from `old` to `new` and commits them. Returns the
    /// number of changes.
    fn write_changes(&mut self, old: &Value, new: &Value) -> Result<usize> {
        let changes = diff_root(self.diff_context(), old, new, Some(&self.schema))?;
        if changes.is_empty() {
            return Ok(0);
        }

        let applied = apply_changes(&self.doc, &changes, &self.infer);
        // Partially applied changes are committed too; there is no rollback.
        self.doc
            .commit_with(CommitOptions::new().origin(TO_LORO_ORIGIN));
        let created = applied?;

        for change in &changes {
            if !self.registry.contains(&change.container) {
                let schema = self.root_field_schema(&change.container);
                self.registry.register(change.container.clone(), schema);
            }
        }
        for (id, schema) in created {
            self.registry.register(id, schema);
        }

        debug!(changes = changes.len(), "wrote state changes to document");
        Ok(changes.len())
    }

    fn pull(&mut self, force: bool) -> usize {
        if self.phase != SyncPhase::Idle {
            debug!(phase = ?self.phase, "document events left queued during sync");
            return 0;
        }

        let mut observed = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            if event.is_echo_of(TO_LORO_ORIGIN) {
                trace!("skipping echo of own commit");
                continue;
            }
            observed.push(event);
        }
        if observed.is_empty() && !force {
            return 0;
        }

        self.phase = SyncPhase::FromLoro;
        self.state = self.project_doc(&self.state);
        self.notify(SyncDirection::FromLoro, Vec::new());
        for event in &observed {
            self.register_observed(event);
        }
        self.phase = SyncPhase::Idle;

        debug!(
            events = observed.len(),
            triggered_by = ?observed.iter().map(|e| e.triggered_by.as_str()).collect::<Vec<_>>(),
            "state updated from document"
        );
        observed.len()
    }

    /// Derives a state from the document.
    ///
    /// Schema root containers the document has not materialized show up
    /// empty. Fields that never reach the document (ignored fields and root
    /// fields holding plain values) are carried over from `previous`.
    fn project_doc(&self, previous: &Value) -> Value {
        let mut fields = match loro_to_json(&self.doc.get_deep_value()) {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let root = self.schema.get();
        self.fill_schema_roots(&mut fields);

        if let Some(previous_fields) = previous.as_object() {
            for (key, value) in previous_fields {
                if fields.contains_key(key) {
                    continue;
                }
                let field = root.and_then(|s| s.field(key));
                if infer_container_kind(value, field, &self.infer).is_none() {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }

        let mut state = Value::Object(fields);
        if let Some(root) = root {
            carry_ignored(&mut state, previous, root);
        }
        state
    }

    /// Adds an empty value for every schema root container missing from `fields`.
    fn fill_schema_roots(&self, fields: &mut Map<String, Value>) {
        let Some(definition) = self.schema.get().and_then(SchemaType::definition) else {
            return;
        };
        for (key, field) in definition {
            if let Some(kind) = field.get().and_then(SchemaType::container_kind) {
                fields.entry(key.clone()).or_insert_with(|| kind.empty_value());
            }
        }
    }

    fn notify(&self, direction: SyncDirection, tags: Vec<String>) {
        let metadata = UpdateMetadata { direction, tags };
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.state, &metadata);
        }
    }

    fn root_field_schema(&self, id: &ContainerID) -> Option<SchemaRef> {
        match id {
            ContainerID::Root { name, .. } => self
                .schema
                .get()
                .and_then(|s| s.field_ref(&name.to_string()))
                .cloned(),
            _ => None,
        }
    }

    fn register_schema_roots(&mut self) {
        let Some(definition) = self.schema.get().and_then(SchemaType::definition) else {
            return;
        };
        let roots: Vec<(ContainerID, SchemaRef)> = definition
            .iter()
            .filter_map(|(key, field)| {
                let kind = field.get()?.container_kind()?;
                Some((ContainerID::new_root(key, kind.container_type()), field.clone()))
            })
            .collect();
        for (id, schema) in roots {
            self.registry.register(id, Some(schema));
        }
    }

    fn register_doc_roots(&mut self) {
        let LoroValue::Map(roots) = self.doc.get_value() else {
            return;
        };
        for value in roots.values() {
            if let LoroValue::Container(id) = value {
                let schema = self.root_field_schema(id);
                self.register_tree(id.clone(), schema);
            }
        }
    }

    fn register_observed(&mut self, event: &ObservedEvent) {
        for container in &event.containers {
            let schema = self
                .registry
                .schema_of(&container.target)
                .cloned()
                .or_else(|| self.root_field_schema(&container.target));
            self.registry.register(container.target.clone(), schema.clone());

            for (slot, child) in &container.children {
                let child_schema = child_schema(schema.as_ref(), slot);
                self.register_tree(child.clone(), child_schema);
            }
        }
    }

    /// Registers a container and every container nested inside it.
    fn register_tree(&mut self, id: ContainerID, schema: Option<SchemaRef>) {
        let mut pending = vec![(id, schema)];
        while let Some((id, schema)) = pending.pop() {
            let handle = match container_handle(&self.doc, &id) {
                Ok(handle) => handle,
                Err(e) => {
                    if self.debug {
                        debug!(container = %id, error = %e, "skipping container registration");
                    }
                    continue;
                }
            };
            for (slot, child) in shallow_children(&handle) {
                pending.push((child, child_schema(schema.as_ref(), &slot)));
            }
            self.registry.register(id, schema);
        }
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("containers", &self.registry.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

fn child_schema(parent: Option<&SchemaRef>, slot: &ChildSlot) -> Option<SchemaRef> {
    let parent = parent?.get()?;
    match slot {
        ChildSlot::Key(key) => parent.field_ref(key).cloned(),
        ChildSlot::Index(_) => parent.item_ref().cloned(),
    }
}

/// Merges the top-level fields of `partial` into `state`. A non-object
/// partial replaces the state.
fn merge_shallow(state: &Value, partial: Value) -> Value {
    match (state, partial) {
        (Value::Object(current), Value::Object(partial)) => {
            let mut merged = current.clone();
            merged.extend(partial);
            Value::Object(merged)
        }
        (_, partial) => partial,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Copies ignored fields of map schemas from `previous` into `state`.
fn carry_ignored(state: &mut Value, previous: &Value, schema: &SchemaType) {
    let (Some(definition), Value::Object(fields)) = (schema.definition(), state) else {
        return;
    };
    for (key, field) in definition {
        let Some(field) = field.get() else {
            continue;
        };
        let previous_value = previous.get(key);
        if field.is_ignore() {
            match previous_value {
                Some(value) => fields.insert(key.clone(), value.clone()),
                None => fields.remove(key),
            };
        } else if let (Some(value), Some(previous_value)) = (fields.get_mut(key), previous_value) {
            carry_ignored(value, previous_value, field);
        }
    }
}
