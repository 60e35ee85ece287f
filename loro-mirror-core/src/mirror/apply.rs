//! Applying diff changes to a Loro document.

use loro::{
    Container, ContainerID, ContainerTrait, LoroDoc, LoroList, LoroMap, LoroMovableList, LoroText,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::diff::{Change, ChangeKey, ChangeKind};
use crate::error::{MirrorError, Result};
use crate::handle::container_handle;
use crate::schema::SchemaRef;
use crate::utils::{infer_container_kind, json_to_loro, ContainerKind, InferOptions};

/// A container created while applying changes, with its schema.
pub type CreatedContainer = (ContainerID, Option<SchemaRef>);

macro_rules! insert_child {
    ($host:expr, $slot:expr, $kind:expr) => {
        match $kind {
            ContainerKind::Map => Container::Map($host.insert_container($slot, LoroMap::new())?),
            ContainerKind::List => Container::List($host.insert_container($slot, LoroList::new())?),
            ContainerKind::MovableList => {
                Container::MovableList($host.insert_container($slot, LoroMovableList::new())?)
            }
            ContainerKind::Text => Container::Text($host.insert_container($slot, LoroText::new())?),
        }
    };
}

/// Groups changes by target container, keeping first-seen order.
pub fn group_by_container(changes: &[Change]) -> Vec<(ContainerID, Vec<&Change>)> {
    let mut groups: Vec<(ContainerID, Vec<&Change>)> = Vec::new();
    let mut positions: HashMap<&ContainerID, usize> = HashMap::new();
    for change in changes {
        match positions.get(&change.container) {
            Some(&pos) => groups[pos].1.push(change),
            None => {
                positions.insert(&change.container, groups.len());
                groups.push((change.container.clone(), vec![change]));
            }
        }
    }
    groups
}

/// Puts deletions first, by descending index, keeping the order of the rest.
fn deletes_first(group: &mut Vec<&Change>) {
    let (mut deletes, rest): (Vec<&Change>, Vec<&Change>) =
        group.drain(..).partition(|c| c.is_delete());
    deletes.sort_by(|a, b| b.key.index().cmp(&a.key.index()));
    group.extend(deletes);
    group.extend(rest);
}

/// Applies `changes` to `doc` without committing.
///
/// Returns every container created on the way, including the nested ones
/// created while filling inserted values.
pub fn apply_changes(
    doc: &LoroDoc,
    changes: &[Change],
    infer: &InferOptions,
) -> Result<Vec<CreatedContainer>> {
    let mut created = Vec::new();
    for (container_id, mut group) in group_by_container(changes) {
        deletes_first(&mut group);
        let handle = container_handle(doc, &container_id)?;
        tracing::trace!(container = %container_id, changes = group.len(), "applying changes");
        for change in group {
            match &handle {
                Container::Map(map) => apply_map(map, change, infer, &mut created)?,
                Container::List(list) => apply_list(list, change, infer, &mut created)?,
                Container::MovableList(list) => {
                    apply_movable_list(list, change, infer, &mut created)?
                }
                Container::Text(text) => apply_text(text, change)?,
                _ => return Err(MirrorError::UnknownContainerKind(container_id.to_string())),
            }
        }
    }
    Ok(created)
}

fn invalid(change: &Change, reason: &str) -> MirrorError {
    MirrorError::InvalidChange {
        container: change.container.to_string(),
        reason: reason.to_string(),
    }
}

fn scalar(change: &Change) -> Result<loro::LoroValue> {
    json_to_loro(&change.value).ok_or_else(|| invalid(change, "nested value without a container kind"))
}

fn child_kind(change: &Change) -> Result<ContainerKind> {
    change
        .child_container_type
        .ok_or_else(|| invalid(change, "container insert without a container kind"))
}

/// Checks an insertion position (`exists == false`) or an existing item.
fn check_index(change: &Change, index: usize, len: usize, exists: bool) -> Result<()> {
    if index > len || (exists && index == len) {
        return Err(MirrorError::InvalidListIndex {
            container: change.container.to_string(),
            index,
            len,
        });
    }
    Ok(())
}

fn apply_map(
    map: &LoroMap,
    change: &Change,
    infer: &InferOptions,
    created: &mut Vec<CreatedContainer>,
) -> Result<()> {
    let ChangeKey::Key(key) = &change.key else {
        return Err(invalid(change, "map changes need a key"));
    };
    match change.kind {
        ChangeKind::Delete => map.delete(key)?,
        ChangeKind::Insert => map.insert(key, scalar(change)?)?,
        ChangeKind::InsertContainer => {
            let child = insert_child!(map, key, child_kind(change)?);
            fill(&child, &change.value, change.child_schema.as_ref(), infer, created)?;
        }
        ChangeKind::Move { .. } => return Err(invalid(change, "maps cannot move entries")),
    }
    Ok(())
}

fn apply_list(
    list: &LoroList,
    change: &Change,
    infer: &InferOptions,
    created: &mut Vec<CreatedContainer>,
) -> Result<()> {
    let index = change
        .key
        .index()
        .ok_or_else(|| invalid(change, "list changes need an index"))?;
    match change.kind {
        ChangeKind::Delete => {
            check_index(change, index, list.len(), true)?;
            list.delete(index, 1)?;
        }
        ChangeKind::Insert => {
            check_index(change, index, list.len(), false)?;
            list.insert(index, scalar(change)?)?;
        }
        ChangeKind::InsertContainer => {
            check_index(change, index, list.len(), false)?;
            let child = insert_child!(list, index, child_kind(change)?);
            fill(&child, &change.value, change.child_schema.as_ref(), infer, created)?;
        }
        ChangeKind::Move { .. } => return Err(invalid(change, "plain lists cannot move items")),
    }
    Ok(())
}

fn apply_movable_list(
    list: &LoroMovableList,
    change: &Change,
    infer: &InferOptions,
    created: &mut Vec<CreatedContainer>,
) -> Result<()> {
    let index = change
        .key
        .index()
        .ok_or_else(|| invalid(change, "list changes need an index"))?;
    match change.kind {
        ChangeKind::Delete => {
            check_index(change, index, list.len(), true)?;
            list.delete(index, 1)?;
        }
        ChangeKind::Insert => {
            check_index(change, index, list.len(), false)?;
            list.insert(index, scalar(change)?)?;
        }
        ChangeKind::InsertContainer => {
            check_index(change, index, list.len(), false)?;
            let child = insert_child!(list, index, child_kind(change)?);
            fill(&child, &change.value, change.child_schema.as_ref(), infer, created)?;
        }
        ChangeKind::Move {
            from_index,
            to_index,
        } => {
            check_index(change, from_index, list.len(), true)?;
            check_index(change, to_index, list.len(), true)?;
            list.mov(from_index, to_index)?;
        }
    }
    Ok(())
}

fn apply_text(text: &LoroText, change: &Change) -> Result<()> {
    match (&change.kind, &change.value) {
        (ChangeKind::Insert, Value::String(next)) => splice_text(text, next),
        (ChangeKind::Delete, _) => splice_text(text, ""),
        _ => Err(invalid(change, "text changes replace the whole string")),
    }
}

/// Rewrites `text` to `next`, touching only the part between the common
/// prefix and suffix. Positions are in unicode scalar values.
fn splice_text(text: &LoroText, next: &str) -> Result<()> {
    let current = text.to_string();
    let old: Vec<char> = current.chars().collect();
    let new: Vec<char> = next.chars().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = old.len() - prefix - suffix;
    if removed > 0 {
        text.delete(prefix, removed)?;
    }
    let inserted: String = new[prefix..new.len() - suffix].iter().collect();
    if !inserted.is_empty() {
        text.insert(prefix, &inserted)?;
    }
    Ok(())
}

/// Fills a freshly created container with `value`, creating nested
/// containers as the schema (or inference) asks for.
fn fill(
    container: &Container,
    value: &Value,
    schema: Option<&SchemaRef>,
    infer: &InferOptions,
    created: &mut Vec<CreatedContainer>,
) -> Result<()> {
    created.push((container.id(), schema.cloned()));
    let schema_type = schema.and_then(SchemaRef::get);

    match (container, value) {
        (Container::Map(map), Value::Object(fields)) => {
            for (key, field_value) in fields {
                let field = schema_type.and_then(|s| s.field_ref(key));
                let field_schema = field.and_then(SchemaRef::get);
                if field_schema.map_or(false, |f| f.is_ignore()) {
                    continue;
                }
                match infer_container_kind(field_value, field_schema, infer) {
                    Some(kind) => {
                        let child = insert_child!(map, key, kind);
                        fill(&child, field_value, field, infer, created)?;
                    }
                    None => map.insert(key, to_scalar(field_value, &container.id())?)?,
                }
            }
        }
        (Container::List(list), Value::Array(items)) => {
            let item = schema_type.and_then(|s| s.item_ref());
            for (index, item_value) in items.iter().enumerate() {
                match infer_container_kind(item_value, item.and_then(SchemaRef::get), infer) {
                    Some(kind) => {
                        let child = insert_child!(list, index, kind);
                        fill(&child, item_value, item, infer, created)?;
                    }
                    None => list.insert(index, to_scalar(item_value, &container.id())?)?,
                }
            }
        }
        (Container::MovableList(list), Value::Array(items)) => {
            let item = schema_type.and_then(|s| s.item_ref());
            for (index, item_value) in items.iter().enumerate() {
                match infer_container_kind(item_value, item.and_then(SchemaRef::get), infer) {
                    Some(kind) => {
                        let child = insert_child!(list, index, kind);
                        fill(&child, item_value, item, infer, created)?;
                    }
                    None => list.insert(index, to_scalar(item_value, &container.id())?)?,
                }
            }
        }
        (Container::Text(text), Value::String(s)) => {
            if !s.is_empty() {
                text.insert(0, s)?;
            }
        }
        (_, Value::Null) => {}
        (other, value) => {
            return Err(MirrorError::InvalidChange {
                container: other.id().to_string(),
                reason: format!(
                    "cannot fill a container with {}",
                    crate::utils::value_type_name(value)
                ),
            })
        }
    }
    Ok(())
}

fn to_scalar(value: &Value, container: &ContainerID) -> Result<loro::LoroValue> {
    json_to_loro(value).ok_or_else(|| MirrorError::InvalidChange {
        container: container.to_string(),
        reason: "nested value without a container kind".to_string(),
    })
}
