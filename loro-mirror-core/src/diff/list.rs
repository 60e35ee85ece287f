//! List diffing, positional and by item identity.

use loro::ContainerID;
use serde_json::Value;
use std::collections::HashSet;

use super::{
    as_items, diff_container, item_ids, sort_deletes_desc, sort_inserts_asc, Change, ChangeKey,
    DiffContext,
};
use crate::error::Result;
use crate::handle::{child_container_id, ChildSlot};
use crate::schema::{IdSelector, SchemaRef};
use crate::utils::{deep_equal, ContainerKind};

/// Outcome of comparing one old item with its new counterpart.
pub(super) enum ItemDiff {
    Unchanged,
    /// Both sides are the same kind of container; the child is diffed in place.
    Nested(Vec<Change>),
    /// The item has to be deleted and inserted again.
    Replace,
}

/// Compares the item at `old_index` of the list `id` with its new value.
pub(super) fn diff_item(
    ctx: DiffContext<'_>,
    id: &ContainerID,
    old_index: usize,
    old: &Value,
    new: &Value,
    item_schema: Option<&SchemaRef>,
) -> Result<ItemDiff> {
    if deep_equal(old, new) {
        return Ok(ItemDiff::Unchanged);
    }

    let schema = item_schema.and_then(SchemaRef::get);
    let live = child_container_id(ctx.doc, id, &ChildSlot::Index(old_index))?;
    let Some(kind) = ctx.slot_kind(new, schema, live.as_ref()) else {
        return Ok(ItemDiff::Replace);
    };

    let child = live.filter(|child| {
        ContainerKind::from_container_id(child) == Some(kind) && kind.holds(old)
    });
    match child {
        Some(child) => Ok(ItemDiff::Nested(diff_container(
            ctx,
            old,
            new,
            &child,
            item_schema,
        )?)),
        None => Ok(ItemDiff::Replace),
    }
}

pub(super) fn insert_item(
    ctx: DiffContext<'_>,
    id: &ContainerID,
    index: usize,
    value: &Value,
    item_schema: Option<&SchemaRef>,
) -> Change {
    let kind = ctx.kind_of(value, item_schema.and_then(SchemaRef::get));
    Change::insert_value(id, ChangeKey::Index(index), value.clone(), kind, item_schema)
}

/// Diffs a list without item identity, position by position.
pub fn diff_list(
    ctx: DiffContext<'_>,
    old: &Value,
    new: &Value,
    id: &ContainerID,
    schema: Option<&SchemaRef>,
) -> Result<Vec<Change>> {
    let old_items = as_items(old);
    let new_items = as_items(new);
    let item_schema = schema.and_then(SchemaRef::get).and_then(|s| s.item_ref());

    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    let mut nested = Vec::new();

    let common = old_items.len().min(new_items.len());
    for i in 0..common {
        match diff_item(ctx, id, i, &old_items[i], &new_items[i], item_schema)? {
            ItemDiff::Unchanged => {}
            ItemDiff::Nested(changes) => nested.extend(changes),
            ItemDiff::Replace => {
                deletes.push(Change::delete(id, ChangeKey::Index(i)));
                inserts.push(insert_item(ctx, id, i, &new_items[i], item_schema));
            }
        }
    }
    for i in common..old_items.len() {
        deletes.push(Change::delete(id, ChangeKey::Index(i)));
    }
    for (i, item) in new_items.iter().enumerate().skip(common) {
        inserts.push(insert_item(ctx, id, i, item, item_schema));
    }

    sort_deletes_desc(&mut deletes);
    sort_inserts_asc(&mut inserts);
    deletes.extend(inserts);
    deletes.extend(nested);
    Ok(deletes)
}

/// Diffs a list whose items carry a stable id.
///
/// Items are matched by id while walking both sides in order. Items that
/// moved are deleted and inserted again; a plain `LoroList` has no move.
pub fn diff_list_with_id_selector(
    ctx: DiffContext<'_>,
    old: &Value,
    new: &Value,
    id: &ContainerID,
    schema: Option<&SchemaRef>,
    select: &IdSelector,
) -> Result<Vec<Change>> {
    let old_items = as_items(old);
    let new_items = as_items(new);
    let old_ids = item_ids(old_items, select, id)?;
    let new_ids = item_ids(new_items, select, id)?;
    let item_schema = schema.and_then(SchemaRef::get).and_then(|s| s.item_ref());

    let mut remaining: HashSet<&str> = old_ids.iter().map(String::as_str).collect();
    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    let mut nested = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < old_items.len() && j < new_items.len() {
        if old_ids[i] == new_ids[j] {
            remaining.remove(old_ids[i].as_str());
            match diff_item(ctx, id, i, &old_items[i], &new_items[j], item_schema)? {
                ItemDiff::Unchanged => {}
                ItemDiff::Nested(changes) => nested.extend(changes),
                ItemDiff::Replace => {
                    deletes.push(Change::delete(id, ChangeKey::Index(i)));
                    inserts.push(insert_item(ctx, id, j, &new_items[j], item_schema));
                }
            }
            i += 1;
            j += 1;
        } else if !remaining.contains(new_ids[j].as_str()) {
            inserts.push(insert_item(ctx, id, j, &new_items[j], item_schema));
            j += 1;
        } else {
            remaining.remove(old_ids[i].as_str());
            deletes.push(Change::delete(id, ChangeKey::Index(i)));
            i += 1;
        }
    }
    for index in i..old_items.len() {
        deletes.push(Change::delete(id, ChangeKey::Index(index)));
    }
    for (index, item) in new_items.iter().enumerate().skip(j) {
        inserts.push(insert_item(ctx, id, index, item, item_schema));
    }

    sort_deletes_desc(&mut deletes);
    sort_inserts_asc(&mut inserts);
    deletes.extend(inserts);
    deletes.extend(nested);
    Ok(deletes)
}
