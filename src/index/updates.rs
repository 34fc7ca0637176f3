//! Derives node property updates from a committed command stream.
//!
//! Index maintenance consumes the same sorted command stream whether it
//! comes from a live commit or from recovery replay, so the updates derived
//! here are identical on both paths. Entities created and deleted within
//! one transaction never reach the stream and therefore never produce an
//! update.

use rustc_hash::FxHashMap;

use crate::error::{KernelError, Result};
use crate::record::{Command, DynamicLabelRecord, LabelStorage, NodeRecord, PropertyOwner};
use crate::types::{DynamicId, LabelId, NodeId, PropKeyId, PropertyValue};

/// One derived node property update, carrying the node's label set so index
/// maintenance can route it to the affected (label, key) indexes.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    /// A property appeared.
    Add {
        /// The node.
        node: NodeId,
        /// The property key.
        key: PropKeyId,
        /// The new value.
        value: PropertyValue,
        /// The node's labels, sorted.
        labels: Vec<LabelId>,
    },
    /// A property value changed.
    Change {
        /// The node.
        node: NodeId,
        /// The property key.
        key: PropKeyId,
        /// The committed value before the transaction.
        value_before: PropertyValue,
        /// The value after the transaction.
        value_after: PropertyValue,
        /// The node's labels, sorted.
        labels: Vec<LabelId>,
    },
    /// A property disappeared.
    Remove {
        /// The node.
        node: NodeId,
        /// The property key.
        key: PropKeyId,
        /// The value that was removed.
        value: PropertyValue,
        /// The node's labels, sorted.
        labels: Vec<LabelId>,
    },
}

impl PropertyUpdate {
    /// The node this update concerns.
    pub fn node(&self) -> NodeId {
        match self {
            PropertyUpdate::Add { node, .. }
            | PropertyUpdate::Change { node, .. }
            | PropertyUpdate::Remove { node, .. } => *node,
        }
    }

    /// The property key this update concerns.
    pub fn key(&self) -> PropKeyId {
        match self {
            PropertyUpdate::Add { key, .. }
            | PropertyUpdate::Change { key, .. }
            | PropertyUpdate::Remove { key, .. } => *key,
        }
    }

    /// The labels carried by this update.
    pub fn labels(&self) -> &[LabelId] {
        match self {
            PropertyUpdate::Add { labels, .. }
            | PropertyUpdate::Change { labels, .. }
            | PropertyUpdate::Remove { labels, .. } => labels,
        }
    }
}

fn missing_value() -> KernelError {
    KernelError::Corruption("in-use property record without value")
}

/// Derives node property updates from a sorted command stream.
///
/// `committed_labels` resolves a node's label set from committed storage
/// for nodes the stream itself does not carry a usable image of.
pub fn extract(
    commands: &[Command],
    committed_labels: impl Fn(NodeId) -> Vec<LabelId>,
) -> Result<Vec<PropertyUpdate>> {
    let mut node_commands: FxHashMap<NodeId, (&NodeRecord, &NodeRecord)> = FxHashMap::default();
    let mut dynamic_records: FxHashMap<DynamicId, &DynamicLabelRecord> = FxHashMap::default();
    for command in commands {
        match command {
            Command::Node { before, after } => {
                node_commands.insert(after.id, (before, after));
            }
            Command::DynamicLabel(record) => {
                dynamic_records.insert(record.id, record);
            }
            _ => {}
        }
    }

    let labels_of = |node: NodeId| -> Vec<LabelId> {
        let mut labels = match node_commands.get(&node) {
            Some((before, after)) => {
                // A deleted node's after image carries no labels; updates for
                // its property removals use the before image instead.
                let record: &NodeRecord = if after.in_use { after } else { before };
                match &record.labels {
                    LabelStorage::Inline(inline) => inline.to_vec(),
                    LabelStorage::Dynamic(id) => dynamic_records
                        .get(id)
                        .map(|r| r.labels.clone())
                        .unwrap_or_else(|| committed_labels(node)),
                }
            }
            None => committed_labels(node),
        };
        labels.sort_unstable();
        labels
    };

    let mut updates = Vec::new();
    for command in commands {
        let Command::Property { before, after } = command else {
            continue;
        };
        let PropertyOwner::Node(node) = after.owner else {
            continue;
        };
        match (before.in_use, after.in_use) {
            (false, true) => {
                let value = after.value.clone().ok_or_else(missing_value)?;
                updates.push(PropertyUpdate::Add {
                    node,
                    key: after.key,
                    value,
                    labels: labels_of(node),
                });
            }
            (true, true) => {
                let value_before = before.value.clone().ok_or_else(missing_value)?;
                let value_after = after.value.clone().ok_or_else(missing_value)?;
                if value_before != value_after {
                    updates.push(PropertyUpdate::Change {
                        node,
                        key: after.key,
                        value_before,
                        value_after,
                        labels: labels_of(node),
                    });
                }
            }
            (true, false) => {
                let value = before.value.clone().ok_or_else(missing_value)?;
                updates.push(PropertyUpdate::Remove {
                    node,
                    key: after.key,
                    value,
                    labels: labels_of(node),
                });
            }
            (false, false) => {}
        }
    }
    Ok(updates)
}
