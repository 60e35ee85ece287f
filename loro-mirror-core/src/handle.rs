//! Resolving container ids to live container handles.

use loro::{Container, ContainerID, ContainerTrait, ContainerType, LoroDoc, LoroValue, ValueOrContainer};

use crate::error::{MirrorError, Result};

/// Position of a child inside its parent container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildSlot {
    Key(String),
    Index(usize),
}

/// Returns a handle to the container with the given id.
///
/// Root containers always resolve, even before anything was written to them.
pub fn container_handle(doc: &LoroDoc, id: &ContainerID) -> Result<Container> {
    if let ContainerID::Root {
        name,
        container_type,
    } = id
    {
        let name = name.to_string();
        return match container_type {
            ContainerType::Map => Ok(Container::Map(doc.get_map(name.as_str()))),
            ContainerType::List => Ok(Container::List(doc.get_list(name.as_str()))),
            ContainerType::MovableList => {
                Ok(Container::MovableList(doc.get_movable_list(name.as_str())))
            }
            ContainerType::Text => Ok(Container::Text(doc.get_text(name.as_str()))),
            _ => Err(MirrorError::UnknownContainerKind(id.to_string())),
        };
    }

    doc.get_container(id.clone())
        .ok_or_else(|| MirrorError::ContainerNotFound(id.to_string()))
}

/// Reads the child stored at `slot` of a container.
pub fn child_at(container: &Container, slot: &ChildSlot) -> Option<ValueOrContainer> {
    match (container, slot) {
        (Container::Map(map), ChildSlot::Key(key)) => map.get(key),
        (Container::List(list), ChildSlot::Index(i)) => list.get(*i),
        (Container::MovableList(list), ChildSlot::Index(i)) => list.get(*i),
        _ => None,
    }
}

/// Returns the id of the child container at `slot`, if that slot holds one.
pub fn child_container_id(
    doc: &LoroDoc,
    parent: &ContainerID,
    slot: &ChildSlot,
) -> Result<Option<ContainerID>> {
    let handle = container_handle(doc, parent)?;
    Ok(match child_at(&handle, slot) {
        Some(ValueOrContainer::Container(child)) => Some(child.id()),
        _ => None,
    })
}

/// Lists the child containers referenced by the shallow value of a container.
pub fn shallow_children(container: &Container) -> Vec<(ChildSlot, ContainerID)> {
    let shallow = match container {
        Container::Map(map) => map.get_value(),
        Container::List(list) => list.get_value(),
        Container::MovableList(list) => list.get_value(),
        _ => return Vec::new(),
    };

    match shallow {
        LoroValue::Map(entries) => entries
            .iter()
            .filter_map(|(key, value)| match value {
                LoroValue::Container(id) => Some((ChildSlot::Key(key.to_string()), id.clone())),
                _ => None,
            })
            .collect(),
        LoroValue::List(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, value)| match value {
                LoroValue::Container(id) => Some((ChildSlot::Index(i), id.clone())),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::{LoroMap, LoroValue};

    #[test]
    fn test_root_handle_resolves_before_writes() {
        let doc = LoroDoc::new();
        let id = ContainerID::new_root("todos", ContainerType::List);
        let handle = container_handle(&doc, &id).unwrap();
        assert!(matches!(handle, Container::List(_)));
        assert_eq!(handle.id(), id);
    }

    #[test]
    fn test_child_container_lookup() {
        let doc = LoroDoc::new();
        let list = doc.get_list("todos");
        let child = list.insert_container(0, LoroMap::new()).unwrap();
        list.insert(1, "plain").unwrap();
        doc.commit();

        let parent = list.id();
        assert_eq!(
            child_container_id(&doc, &parent, &ChildSlot::Index(0)).unwrap(),
            Some(child.id())
        );
        assert_eq!(
            child_container_id(&doc, &parent, &ChildSlot::Index(1)).unwrap(),
            None
        );
        assert_eq!(
            child_container_id(&doc, &parent, &ChildSlot::Key("x".into())).unwrap(),
            None
        );

        let children = shallow_children(&container_handle(&doc, &parent).unwrap());
        assert_eq!(children, vec![(ChildSlot::Index(0), child.id())]);
    }

    #[test]
    fn test_map_children() {
        let doc = LoroDoc::new();
        let root = doc.get_map("root");
        root.insert("name", LoroValue::from("x")).unwrap();
        let nested = root.insert_container("nested", LoroMap::new()).unwrap();
        doc.commit();

        let handle = container_handle(&doc, &root.id()).unwrap();
        assert_eq!(
            shallow_children(&handle),
            vec![(ChildSlot::Key("nested".into()), nested.id())]
        );
    }
}
