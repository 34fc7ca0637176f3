//! Inline versus dynamic node label storage.
//!
//! A node keeps up to [`NODE_LABEL_INLINE_CAPACITY`] label ids inline in its
//! own record. One label beyond that spills the whole set into a single
//! dynamic overflow record that also names the owning node. Dropping back
//! under the threshold re-inlines the set and marks the overflow record
//! not-in-use. Within one transaction the original overflow record id is
//! reused for as long as the net label set still needs a dynamic record, so
//! partial add/remove sequences do not churn through allocations.

use crate::error::{KernelError, Result};
use crate::types::{DynamicId, LabelId, NodeId};

use super::records::{DynamicLabelRecord, LabelStorage, NodeRecord};

/// Maximum number of label ids stored inline in a node record.
pub const NODE_LABEL_INLINE_CAPACITY: usize = 7;

/// Mutable view over one node's label set, tracking the dynamic record
/// identity across add/remove sequences inside a single transaction.
#[derive(Debug)]
pub struct NodeLabelsField {
    node_id: NodeId,
    labels: Vec<LabelId>,
    /// Dynamic record backing the set now or earlier in the transaction.
    /// Kept around after a re-inline so a later re-spill reuses its id.
    dynamic: Option<DynamicLabelRecord>,
}

impl NodeLabelsField {
    /// Parses the label field of `node`. `load_dynamic` resolves a spilled
    /// field to its overflow record.
    pub fn parse(
        node: &NodeRecord,
        load_dynamic: impl FnOnce(DynamicId) -> Result<DynamicLabelRecord>,
    ) -> Result<Self> {
        match &node.labels {
            LabelStorage::Inline(inline) => {
                let mut labels = inline.to_vec();
                labels.sort_unstable();
                Ok(Self {
                    node_id: node.id,
                    labels,
                    dynamic: None,
                })
            }
            LabelStorage::Dynamic(id) => {
                let record = load_dynamic(*id)?;
                if record.owner != node.id {
                    return Err(KernelError::Corruption(
                        "dynamic label record owned by a different node",
                    ));
                }
                let mut labels = record.labels.clone();
                labels.sort_unstable();
                Ok(Self {
                    node_id: node.id,
                    labels,
                    dynamic: Some(record),
                })
            }
        }
    }

    /// The current label set, sorted.
    pub fn get(&self) -> &[LabelId] {
        &self.labels
    }

    /// Whether the set currently occupies a dynamic record.
    pub fn is_dynamic(&self) -> bool {
        self.labels.len() > NODE_LABEL_INLINE_CAPACITY
    }

    /// Adds `label`. Returns `false` when it was already present. `alloc`
    /// is only consulted when a fresh dynamic record is genuinely needed.
    pub fn add(
        &mut self,
        label: LabelId,
        alloc: &mut dyn FnMut() -> DynamicId,
    ) -> bool {
        match self.labels.binary_search(&label) {
            Ok(_) => false,
            Err(pos) => {
                self.labels.insert(pos, label);
                if self.is_dynamic() {
                    self.ensure_dynamic(alloc);
                }
                true
            }
        }
    }

    /// Removes `label`. Returns `false` when it was not present.
    pub fn remove(&mut self, label: LabelId) -> bool {
        match self.labels.binary_search(&label) {
            Ok(pos) => {
                self.labels.remove(pos);
                if !self.is_dynamic() {
                    // Shrinking under the threshold releases the dynamic
                    // record; its identity stays parked for a re-spill.
                    if let Some(record) = self.dynamic.as_mut() {
                        record.in_use = false;
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    fn ensure_dynamic(&mut self, alloc: &mut dyn FnMut() -> DynamicId) {
        match self.dynamic.as_mut() {
            Some(record) => {
                // Re-spill onto the record this node already owns, whether
                // still in use or drained earlier in the transaction.
                record.in_use = true;
            }
            None => {
                self.dynamic = Some(DynamicLabelRecord {
                    id: alloc(),
                    in_use: true,
                    created: true,
                    owner: self.node_id,
                    labels: Vec::new(),
                });
            }
        }
    }

    /// Writes the net result back onto `node` and returns the dynamic
    /// record image to be committed, if any: in-use with the full label set
    /// when spilled, not-in-use when the set re-inlined out of it.
    pub fn apply_to(mut self, node: &mut NodeRecord) -> Option<DynamicLabelRecord> {
        let spilled = self.is_dynamic();
        match self.dynamic.as_mut() {
            Some(record) if spilled => {
                record.in_use = true;
                record.labels = self.labels.clone();
                node.labels = LabelStorage::Dynamic(record.id);
            }
            Some(record) => {
                node.labels = LabelStorage::Inline(self.labels.iter().copied().collect());
                record.in_use = false;
                record.labels.clear();
            }
            None => {
                node.labels = LabelStorage::Inline(self.labels.iter().copied().collect());
            }
        }
        self.dynamic
    }
}
