//! Map diffing.

use loro::ContainerID;
use serde_json::{Map, Value};

use super::{diff_container, Change, ChangeKey, DiffContext};
use crate::error::Result;
use crate::handle::{child_container_id, ChildSlot};
use crate::schema::SchemaRef;
use crate::utils::{deep_equal, ContainerKind};

/// Diffs two map values.
///
/// Removed keys are deleted. Added keys, and keys whose container kind
/// changed, are (re)inserted whole. Keys holding the same kind of container
/// on both sides recurse into the existing child container. Keys the schema
/// does not describe take their kind from the child already in the map.
pub fn diff_map(
    ctx: DiffContext<'_>,
    old: &Value,
    new: &Value,
    id: &ContainerID,
    schema: Option<&SchemaRef>,
) -> Result<Vec<Change>> {
    let empty = Map::new();
    let old_fields = old.as_object().unwrap_or(&empty);
    let new_fields = new.as_object().unwrap_or(&empty);
    let map_schema = schema.and_then(SchemaRef::get);

    let mut changes = Vec::new();

    for key in old_fields.keys() {
        if new_fields.contains_key(key) {
            continue;
        }
        if map_schema.and_then(|s| s.field(key)).map_or(false, |f| f.is_ignore()) {
            continue;
        }
        changes.push(Change::delete(id, ChangeKey::Key(key.clone())));
    }

    for (key, new_value) in new_fields {
        let field = map_schema.and_then(|s| s.field_ref(key));
        let field_schema = field.and_then(SchemaRef::get);
        if field_schema.map_or(false, |f| f.is_ignore()) {
            continue;
        }

        let old_value = old_fields.get(key);
        if old_value.map_or(false, |old| deep_equal(old, new_value)) {
            continue;
        }

        let live = match old_value {
            Some(_) => child_container_id(ctx.doc, id, &ChildSlot::Key(key.clone()))?,
            None => None,
        };
        let new_kind = ctx.slot_kind(new_value, field_schema, live.as_ref());

        if let (Some(kind), Some(old_value), Some(child)) = (new_kind, old_value, &live) {
            if ContainerKind::from_container_id(child) == Some(kind) && kind.holds(old_value) {
                changes.extend(diff_container(ctx, old_value, new_value, child, field)?);
                continue;
            }
        }

        changes.push(Change::insert_value(
            id,
            ChangeKey::Key(key.clone()),
            new_value.clone(),
            new_kind,
            field,
        ));
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use crate::schema::{ignore, loro_list, loro_map, string};
    use crate::utils::InferOptions;
    use loro::{ContainerTrait, LoroDoc, LoroList, LoroMap, LoroText};
    use serde_json::json;

    #[test]
    fn test_added_removed_and_changed_keys() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("m");
        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({"a": 1, "b": 2}),
            &json!({"b": 3, "c": "x"}),
            &map.id(),
            None,
        )
        .unwrap();

        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].kind, ChangeKind::Delete);
        assert_eq!(changes[0].key, ChangeKey::Key("a".into()));
        assert_eq!(changes[1].key, ChangeKey::Key("b".into()));
        assert_eq!(changes[1].value, json!(3));
        assert_eq!(changes[2].key, ChangeKey::Key("c".into()));
        assert_eq!(changes[2].kind, ChangeKind::Insert);
    }

    #[test]
    fn test_new_nested_value_becomes_container() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("m");
        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({}),
            &json!({"tags": ["a"], "meta": {"k": 1}}),
            &map.id(),
            None,
        )
        .unwrap();

        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::InsertContainer));
        let kinds: Vec<_> = changes.iter().map(|c| c.child_container_type).collect();
        assert!(kinds.contains(&Some(ContainerKind::Map)));
        assert!(kinds.contains(&Some(ContainerKind::List)));
    }

    #[test]
    fn test_recurses_into_existing_child() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("m");
        let tags = map.insert_container("tags", LoroList::new()).unwrap();
        tags.insert(0, "a").unwrap();
        doc.commit();

        let schema: SchemaRef = loro_map([("tags", loro_list(string()))]).into();
        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({"tags": ["a"]}),
            &json!({"tags": ["a", "b"]}),
            &map.id(),
            Some(&schema),
        )
        .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].container, tags.id());
        assert_eq!(changes[0].key, ChangeKey::Index(1));
        assert_eq!(changes[0].value, json!("b"));
    }

    #[test]
    fn test_container_kind_change_replaces() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("m");
        map.insert_container("value", LoroMap::new()).unwrap();
        doc.commit();

        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({"value": {"a": 1}}),
            &json!({"value": [1]}),
            &map.id(),
            None,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::InsertContainer);
        assert_eq!(changes[0].child_container_type, Some(ContainerKind::List));
        assert_eq!(changes[0].container, map.id());
    }

    #[test]
    fn test_undeclared_text_child_is_edited_in_place() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("profile");
        let bio = map.insert_container("bio", LoroText::new()).unwrap();
        bio.insert(0, "hello").unwrap();
        doc.commit();

        let schema: SchemaRef = loro_map([("name", string())]).into();
        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({"name": "x", "bio": "hello"}),
            &json!({"name": "x", "bio": "hello world"}),
            &map.id(),
            Some(&schema),
        )
        .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].container, bio.id());
        assert_eq!(changes[0].key, ChangeKey::Whole);
        assert_eq!(changes[0].value, json!("hello world"));
    }

    #[test]
    fn test_ignored_fields_skipped() {
        let doc = LoroDoc::new();
        let infer = InferOptions::default();
        let map = doc.get_map("m");
        let schema: SchemaRef = loro_map([("draft", ignore()), ("name", string())]).into();
        let changes = diff_map(
            DiffContext::new(&doc, &infer),
            &json!({"draft": 1}),
            &json!({"name": "x", "draft": {"big": true}}),
            &map.id(),
            Some(&schema),
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, ChangeKey::Key("name".into()));
    }
}
