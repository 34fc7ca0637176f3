//! The record value types.
//!
//! Every record carries `in_use` (logically present in storage) and
//! `created` (allocated by the current transaction). A not-in-use →
//! in-use transition is a create, in-use → not-in-use a delete, in-use →
//! in-use an update. Records created in the current transaction are never
//! diffed against storage on rollback; they simply vanish with the
//! transaction state.

use smallvec::SmallVec;

use crate::index::SchemaRule;
use crate::types::{
    DynamicId, LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId, RuleId,
};

use super::labels::NODE_LABEL_INLINE_CAPACITY;

/// Inline or spilled label storage referenced from a node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelStorage {
    /// Up to [`NODE_LABEL_INLINE_CAPACITY`] label ids stored in the node
    /// record itself.
    Inline(SmallVec<[LabelId; NODE_LABEL_INLINE_CAPACITY]>),
    /// Labels spilled into a dynamic overflow record.
    Dynamic(DynamicId),
}

impl Default for LabelStorage {
    fn default() -> Self {
        LabelStorage::Inline(SmallVec::new())
    }
}

/// A node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// The node id.
    pub id: NodeId,
    /// Whether the record is logically present.
    pub in_use: bool,
    /// Whether this record was allocated by the current transaction.
    pub created: bool,
    /// Label storage, inline or spilled.
    pub labels: LabelStorage,
}

impl NodeRecord {
    /// A not-in-use record for `id`, used as the before image of creates.
    pub fn unused(id: NodeId) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            labels: LabelStorage::default(),
        }
    }
}

/// A relationship record. Deleted relationships keep their endpoints and
/// type so degree bookkeeping and tx-state undo still know where they were
/// attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// The relationship id.
    pub id: RelId,
    /// Whether the record is logically present.
    pub in_use: bool,
    /// Whether this record was allocated by the current transaction.
    pub created: bool,
    /// Start node.
    pub start_node: NodeId,
    /// End node.
    pub end_node: NodeId,
    /// Relationship type token.
    pub rel_type: RelTypeId,
}

impl RelationshipRecord {
    /// A not-in-use record for `id`.
    pub fn unused(id: RelId) -> Self {
        Self {
            id,
            in_use: false,
            created: false,
            start_node: NodeId::NONE,
            end_node: NodeId::NONE,
            rel_type: RelTypeId::NONE,
        }
    }
}

/// Who a property record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyOwner {
    /// Property on a node.
    Node(NodeId),
    /// Property on a relationship.
    Relationship(RelId),
    /// Property on the graph itself.
    Graph,
}

impl PropertyOwner {
    /// Numeric component used when ordering commands for this owner.
    pub fn sort_id(&self) -> u64 {
        match self {
            PropertyOwner::Node(id) => id.0,
            PropertyOwner::Relationship(id) => id.0,
            PropertyOwner::Graph => u64::MAX,
        }
    }
}

/// One (owner, key) property slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    /// Owning entity.
    pub owner: PropertyOwner,
    /// Property key token.
    pub key: PropKeyId,
    /// Whether the slot holds a value.
    pub in_use: bool,
    /// Whether the slot was first written by the current transaction.
    pub created: bool,
    /// The value, present iff `in_use`.
    pub value: Option<PropertyValue>,
}

impl PropertyRecord {
    /// An empty slot for `(owner, key)`.
    pub fn unused(owner: PropertyOwner, key: PropKeyId) -> Self {
        Self {
            owner,
            key,
            in_use: false,
            created: false,
            value: None,
        }
    }
}

/// A dynamic overflow record holding a node's full label set once it no
/// longer fits inline. Stores the owning node so consistency checks can walk
/// back from the record to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicLabelRecord {
    /// The dynamic record id.
    pub id: DynamicId,
    /// Whether the record is logically present. Re-inlining marks the record
    /// not-in-use instead of forgetting it.
    pub in_use: bool,
    /// Whether this record was allocated by the current transaction.
    pub created: bool,
    /// The owning node.
    pub owner: NodeId,
    /// The complete label set when in use.
    pub labels: Vec<LabelId>,
}

/// A schema rule record (index or constraint definition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRuleRecord {
    /// The rule id.
    pub id: RuleId,
    /// Whether the rule is logically present.
    pub in_use: bool,
    /// Whether this record was allocated by the current transaction.
    pub created: bool,
    /// The rule payload.
    pub rule: SchemaRule,
}

/// A label token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTokenRecord {
    /// Token id.
    pub id: LabelId,
    /// Token name.
    pub name: String,
}

/// A property key token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropKeyTokenRecord {
    /// Token id.
    pub id: PropKeyId,
    /// Token name.
    pub name: String,
}

/// A relationship type token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelTypeTokenRecord {
    /// Token id.
    pub id: RelTypeId,
    /// Token name.
    pub name: String,
}
