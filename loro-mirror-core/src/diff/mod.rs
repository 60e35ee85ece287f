//! Structural diff between two mirrored state values.
//!
//! The diff engine turns an old and a new state into an ordered list of
//! [`Change`] records, one container at a time. Container kinds are read from
//! the container ids themselves, so the same dispatch covers schema-described
//! and inferred containers.
//!
//! Index ordering: for any single container the emitted changes are valid
//! when applied in order. Deletions come first and carry old indices in
//! descending order, then moves (movable lists only), then insertions with
//! final indices in ascending order. Changes for nested containers address
//! their own container ids and do not depend on the parent's ordering.

mod change;
mod list;
mod map;
mod movable_list;

pub use change::{Change, ChangeKey, ChangeKind};
pub use list::{diff_list, diff_list_with_id_selector};
pub use map::diff_map;
pub use movable_list::{diff_movable_list, CommonListItemInfo};

use loro::{ContainerID, LoroDoc, LoroValue};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::{MirrorError, Result};
use crate::schema::{IdSelector, SchemaRef, SchemaType};
use crate::utils::{deep_equal, infer_container_kind, ContainerKind, InferOptions};

/// Shared inputs of one diff run.
#[derive(Clone, Copy)]
pub struct DiffContext<'a> {
    pub doc: &'a LoroDoc,
    pub infer: &'a InferOptions,
}

impl<'a> DiffContext<'a> {
    pub fn new(doc: &'a LoroDoc, infer: &'a InferOptions) -> Self {
        Self { doc, infer }
    }

    pub(crate) fn kind_of(&self, value: &Value, schema: Option<&SchemaType>) -> Option<ContainerKind> {
        infer_container_kind(value, schema, self.infer)
    }

    /// Kind of the value stored in a slot that may already hold the live
    /// container `live`. A schema decides on its own. Without one, the live
    /// container keeps its kind as long as the new value still fits it.
    pub(crate) fn slot_kind(
        &self,
        value: &Value,
        schema: Option<&SchemaType>,
        live: Option<&ContainerID>,
    ) -> Option<ContainerKind> {
        if schema.is_none() {
            if let Some(kind) = live.and_then(ContainerKind::from_container_id) {
                if kind.holds(value) {
                    return Some(kind);
                }
            }
        }
        self.kind_of(value, schema)
    }
}

/// Root containers the document currently holds, by name.
fn live_roots(doc: &LoroDoc) -> HashMap<String, ContainerID> {
    let LoroValue::Map(roots) = doc.get_value() else {
        return HashMap::new();
    };
    roots
        .iter()
        .filter_map(|(name, value)| match value {
            LoroValue::Container(id) => Some((name.to_string(), id.clone())),
            _ => None,
        })
        .collect()
}

/// Diffs the whole state. The root behaves like a map whose fields are root
/// containers named after the field.
///
/// Root fields that do not hold a container value (and `Ignore` fields) are
/// kept in memory only: Loro roots can only be containers.
pub fn diff_root(
    ctx: DiffContext<'_>,
    old: &Value,
    new: &Value,
    schema: Option<&SchemaRef>,
) -> Result<Vec<Change>> {
    let empty = Map::new();
    let old_fields = old.as_object().unwrap_or(&empty);
    let new_fields = new.as_object().ok_or_else(|| MirrorError::InvalidChange {
        container: "root".to_string(),
        reason: "state must be an object".to_string(),
    })?;
    let root_schema = schema.and_then(SchemaRef::get);
    let roots = live_roots(ctx.doc);

    let mut changes = Vec::new();
    for (key, new_value) in new_fields {
        let field = root_schema.and_then(|s| s.field_ref(key));
        let field_schema = field.and_then(SchemaRef::get);
        if new_value.is_null() {
            continue;
        }
        let Some(kind) = ctx.slot_kind(new_value, field_schema, roots.get(key)) else {
            tracing::trace!(key = %key, "root field kept in memory only");
            continue;
        };

        let id = ContainerID::new_root(key, kind.container_type());
        let empty_value = kind.empty_value();
        let old_value = old_fields
            .get(key)
            .filter(|v| kind.holds(v))
            .unwrap_or(&empty_value);
        changes.extend(diff_container(ctx, old_value, new_value, &id, field)?);
    }

    // Root containers cannot be removed; dropping a field clears it instead.
    for (key, old_value) in old_fields {
        if new_fields.get(key).map_or(false, |v| !v.is_null()) {
            continue;
        }
        let field = root_schema.and_then(|s| s.field_ref(key));
        let Some(kind) = ctx.slot_kind(old_value, field.and_then(SchemaRef::get), roots.get(key))
        else {
            continue;
        };
        let id = ContainerID::new_root(key, kind.container_type());
        changes.extend(diff_container(ctx, old_value, &kind.empty_value(), &id, field)?);
    }

    Ok(changes)
}

/// Diffs `old` against `new` inside the container `id`, dispatching on the
/// container's kind.
pub fn diff_container(
    ctx: DiffContext<'_>,
    old: &Value,
    new: &Value,
    id: &ContainerID,
    schema: Option<&SchemaRef>,
) -> Result<Vec<Change>> {
    if deep_equal(old, new) {
        return Ok(Vec::new());
    }

    let kind = ContainerKind::from_container_id(id)
        .ok_or_else(|| MirrorError::UnknownContainerKind(id.to_string()))?;
    let described = schema.and_then(SchemaRef::get);
    let selector = described.and_then(SchemaType::id_selector);

    match kind {
        ContainerKind::Map => diff_map(ctx, old, new, id, schema),
        ContainerKind::Text => Ok(diff_text(old, new, id)),
        ContainerKind::List => match selector {
            Some(select) => diff_list_with_id_selector(ctx, old, new, id, schema, select),
            None => diff_list(ctx, old, new, id, schema),
        },
        ContainerKind::MovableList => match (selector, described) {
            (Some(select), _) => diff_movable_list(ctx, old, new, id, schema, select),
            // Undescribed movable lists have no item identity to move by.
            (None, None) => diff_list(ctx, old, new, id, schema),
            (None, Some(_)) => Err(MirrorError::MissingIdSelector(id.to_string())),
        },
    }
}

/// Text is replaced as a whole; the apply step only touches the differing
/// middle section.
pub fn diff_text(old: &Value, new: &Value, id: &ContainerID) -> Vec<Change> {
    if deep_equal(old, new) {
        return Vec::new();
    }
    vec![Change::insert(id, ChangeKey::Whole, new.clone())]
}

pub(crate) fn as_items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Extracts the id of every item, rejecting missing and duplicate ids.
pub(crate) fn item_ids(items: &[Value], select: &IdSelector, id: &ContainerID) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut ids = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_id = select(item).ok_or_else(|| MirrorError::MissingItemId {
            container: id.to_string(),
            index,
        })?;
        if !seen.insert(item_id.clone()) {
            return Err(MirrorError::DuplicateItemId {
                container: id.to_string(),
                id: item_id,
            });
        }
        ids.push(item_id);
    }
    Ok(ids)
}

/// Sorts delete changes by descending index.
pub(crate) fn sort_deletes_desc(deletes: &mut [Change]) {
    deletes.sort_by(|a, b| b.key.index().cmp(&a.key.index()));
}

/// Sorts insert changes by ascending index.
pub(crate) fn sort_inserts_asc(inserts: &mut [Change]) {
    inserts.sort_by_key(|c| c.key.index());
}
