//! Owned snapshots of document events.
//!
//! Loro hands subscribers borrowed [`DiffEvent`]s from inside `commit` and
//! `import`. The mirror copies the parts it needs into an [`ObservedEvent`]
//! and processes it later, outside the callback.

use loro::event::{Diff, DiffEvent, ListDiffItem};
use loro::{ContainerID, ContainerTrait, ValueOrContainer};

use crate::handle::ChildSlot;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    pub origin: String,
    pub triggered_by: String,
    pub containers: Vec<ObservedContainer>,
}

/// A container touched by an event, with the child containers it gained.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedContainer {
    pub target: ContainerID,
    pub children: Vec<(ChildSlot, ContainerID)>,
}

impl ObservedEvent {
    pub fn from_diff_event(event: &DiffEvent<'_>) -> Self {
        let containers = event
            .events
            .iter()
            .map(|container| ObservedContainer {
                target: container.target.clone(),
                children: inserted_children(&container.diff),
            })
            .collect();

        Self {
            origin: event.origin.to_string(),
            triggered_by: format!("{:?}", event.triggered_by),
            containers,
        }
    }

    pub fn is_echo_of(&self, origin: &str) -> bool {
        self.origin == origin
    }
}

fn inserted_children(diff: &Diff<'_>) -> Vec<(ChildSlot, ContainerID)> {
    let mut children = Vec::new();
    match diff {
        Diff::List(items) => {
            let mut index = 0;
            for item in items {
                match item {
                    ListDiffItem::Retain { retain } => index += retain,
                    ListDiffItem::Delete { .. } => {}
                    ListDiffItem::Insert { insert, .. } => {
                        for value in insert {
                            if let ValueOrContainer::Container(child) = value {
                                children.push((ChildSlot::Index(index), child.id()));
                            }
                            index += 1;
                        }
                    }
                }
            }
        }
        Diff::Map(delta) => {
            for (key, value) in &delta.updated {
                if let Some(ValueOrContainer::Container(child)) = value {
                    children.push((ChildSlot::Key(key.to_string()), child.id()));
                }
            }
        }
        _ => {}
    }
    children
}
