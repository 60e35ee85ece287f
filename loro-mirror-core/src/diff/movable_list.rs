//! Movable list diffing with a minimal number of moves.

use loro::ContainerID;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::list::{diff_item, insert_item, ItemDiff};
use super::{as_items, item_ids, sort_deletes_desc, sort_inserts_asc, Change, ChangeKey, DiffContext};
use crate::error::Result;
use crate::lis::longest_increasing_subsequence;
use crate::schema::{IdSelector, SchemaRef};

/// An item present on both sides of a movable list diff.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonListItemInfo<'a> {
    pub id: &'a str,
    pub old_index: usize,
    pub new_index: usize,
    pub old_item: &'a Value,
    pub new_item: &'a Value,
}

/// Diffs a movable list by item identity.
///
/// Changes come in three phases: deletions at old indices (descending), moves
/// on the list that remains, then insertions at final indices (ascending).
/// Items that keep their identity keep their container: they are moved
/// rather than recreated, and only the items outside a longest increasing
/// subsequence of the kept order are moved.
pub fn diff_movable_list(
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

    let new_index_of: HashMap<&str, usize> = new_ids
        .iter()
        .enumerate()
        .map(|(j, item_id)| (item_id.as_str(), j))
        .collect();

    let mut deletes = Vec::new();
    let mut inserts = Vec::new();
    let mut nested = Vec::new();
    let mut common = Vec::new();
    let mut reinserted = HashSet::new();

    for (i, item_id) in old_ids.iter().enumerate() {
        let Some(&j) = new_index_of.get(item_id.as_str()) else {
            deletes.push(Change::delete(id, ChangeKey::Index(i)));
            continue;
        };
        match diff_item(ctx, id, i, &old_items[i], &new_items[j], item_schema)? {
            ItemDiff::Replace => {
                deletes.push(Change::delete(id, ChangeKey::Index(i)));
                reinserted.insert(j);
                continue;
            }
            ItemDiff::Nested(changes) => nested.extend(changes),
            ItemDiff::Unchanged => {}
        }
        common.push(CommonListItemInfo {
            id: item_id,
            old_index: i,
            new_index: j,
            old_item: &old_items[i],
            new_item: &new_items[j],
        });
    }

    let moves = plan_moves(id, &common);

    let old_id_set: HashSet<&str> = old_ids.iter().map(String::as_str).collect();
    for (j, item) in new_items.iter().enumerate() {
        if !old_id_set.contains(new_ids[j].as_str()) || reinserted.contains(&j) {
            inserts.push(insert_item(ctx, id, j, item, item_schema));
        }
    }

    sort_deletes_desc(&mut deletes);
    sort_inserts_asc(&mut inserts);

    tracing::trace!(
        container = %id,
        deletes = deletes.len(),
        moves = moves.len(),
        inserts = inserts.len(),
        "movable list diff"
    );

    deletes.extend(moves);
    deletes.extend(inserts);
    deletes.extend(nested);
    Ok(deletes)
}

/// Computes the moves that reorder the kept items (in old order) into their
/// new order.
///
/// Items on a longest increasing subsequence of old positions stay put. Every
/// other item is moved, in target order, right behind its target predecessor.
fn plan_moves(id: &ContainerID, common: &[CommonListItemInfo<'_>]) -> Vec<Change> {
    // `common` is in old order, so its positions are the post-delete indices.
    let mut current: Vec<&str> = common.iter().map(|c| c.id).collect();

    let mut target: Vec<(usize, &CommonListItemInfo<'_>)> = common.iter().enumerate().collect();
    target.sort_by_key(|(_, c)| c.new_index);

    let ranks: Vec<usize> = target.iter().map(|(rank, _)| *rank).collect();
    let anchors: HashSet<usize> = longest_increasing_subsequence(&ranks).into_iter().collect();

    let mut moves = Vec::with_capacity(target.len() - anchors.len());
    for (k, (_, info)) in target.iter().enumerate() {
        if anchors.contains(&k) {
            continue;
        }
        let Some(from) = current.iter().position(|c| *c == info.id) else {
            continue;
        };
        current.remove(from);
        let to = match k {
            0 => 0,
            _ => current
                .iter()
                .position(|c| *c == target[k - 1].1.id)
                .map_or(0, |p| p + 1),
        };
        current.insert(to, info.id);
        if from != to {
            moves.push(Change::move_item(id, from, to, info.new_item.clone()));
        }
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use crate::schema::{by_key, loro_map, loro_movable_list, string};
    use crate::utils::InferOptions;
    use loro::{ContainerTrait, LoroDoc};
    use proptest::prelude::*;
    use serde_json::json;

    fn items_schema() -> SchemaRef {
        loro_movable_list(loro_map([("id", string())]), by_key("id")).into()
    }

    fn items(ids: &[&str]) -> Value {
        Value::Array(ids.iter().map(|id| json!({ "id": id })).collect())
    }

    fn run(old: &Value, new: &Value) -> Vec<Change> {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let list = doc.get_movable_list("items");
        let schema = items_schema();
        diff_movable_list(
            DiffContext::new(&doc, &infer),
            old,
            new,
            &list.id(),
            Some(&schema),
            schema.get().unwrap().id_selector().unwrap(),
        )
        .unwrap()
    }

    fn replay(old: &Value, changes: &[Change]) -> Vec<Value> {
        let mut out = old.as_array().unwrap().clone();
        for change in changes {
            match change.kind {
                ChangeKind::Delete => {
                    out.remove(change.key.index().unwrap());
                }
                ChangeKind::Move { from_index, to_index } => {
                    let item = out.remove(from_index);
                    out.insert(to_index, item);
                }
                ChangeKind::Insert | ChangeKind::InsertContainer => {
                    out.insert(change.key.index().unwrap(), change.value.clone())
                }
            }
        }
        out
    }

    #[test]
    fn test_single_move() {
        let old = items(&["a", "b", "c"]);
        let new = items(&["c", "a", "b"]);
        let changes = run(&old, &new);

        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].kind,
            ChangeKind::Move {
                from_index: 2,
                to_index: 0
            }
        );
        assert_eq!(replay(&old, &changes), *new.as_array().unwrap());
    }

    #[test]
    fn test_reverse_needs_n_minus_one_moves() {
        let ids: Vec<String> = (0..10).map(|i| format!("id-{i}")).collect();
        let forward: Vec<&str> = ids.iter().map(String::as_str).collect();
        let backward: Vec<&str> = forward.iter().rev().copied().collect();
        let old = items(&forward);
        let new = items(&backward);

        let changes = run(&old, &new);
        assert_eq!(changes.iter().filter(|c| c.is_move()).count(), 9);
        assert!(changes.iter().all(Change::is_move));
        assert_eq!(replay(&old, &changes), *new.as_array().unwrap());
    }

    #[test]
    fn test_mixed_delete_move_insert() {
        let old = items(&["a", "b", "c", "d"]);
        let new = items(&["d", "x", "b", "a"]);
        let changes = run(&old, &new);

        let phases: Vec<u8> = changes
            .iter()
            .map(|c| match c.kind {
                ChangeKind::Delete => 0,
                ChangeKind::Move { .. } => 1,
                _ => 2,
            })
            .collect();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(replay(&old, &changes), *new.as_array().unwrap());
    }

    #[test]
    fn test_changed_item_without_container_is_replaced() {
        let old = json!([{"id": "a", "n": 1}]);
        let new = json!([{"id": "a", "n": 2}]);
        let changes = run(&old, &new);
        // Nothing exists in the document yet, so there is no child to update.
        assert_eq!(changes.len(), 2);
        assert!(changes[0].is_delete());
        assert_eq!(changes[1].kind, ChangeKind::InsertContainer);
    }

    #[test]
    fn test_common_items_keep_both_indices() {
        let old = items(&["a", "b"]);
        let new = items(&["b", "a"]);
        let old_items = old.as_array().unwrap();
        let new_items = new.as_array().unwrap();
        let common = vec![
            CommonListItemInfo {
                id: "a",
                old_index: 0,
                new_index: 1,
                old_item: &old_items[0],
                new_item: &new_items[1],
            },
            CommonListItemInfo {
                id: "b",
                old_index: 1,
                new_index: 0,
                old_item: &old_items[1],
                new_item: &new_items[0],
            },
        ];
        let id = ContainerID::new_root("items", loro::ContainerType::MovableList);
        let moves = plan_moves(&id, &common);
        assert_eq!(moves.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_permutation_moves_are_minimal(perm in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()) {
            let old_ids: Vec<String> = (0..12).map(|i| format!("k{i}")).collect();
            let new_ids: Vec<String> = perm.iter().map(|i| format!("k{i}")).collect();
            let old = items(&old_ids.iter().map(String::as_str).collect::<Vec<_>>());
            let new = items(&new_ids.iter().map(String::as_str).collect::<Vec<_>>());

            let changes = run(&old, &new);
            let lis = longest_increasing_subsequence(&perm).len();
            prop_assert!(changes.iter().all(Change::is_move));
            prop_assert_eq!(changes.len(), perm.len() - lis);
            prop_assert_eq!(replay(&old, &changes), new.as_array().unwrap().clone());
        }
    }
}
