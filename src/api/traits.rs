//! The statement capability traits.
//!
//! Each trait is one narrow capability; a statement implements them all and
//! callers take only the capability they need. Every operation asserts the
//! owning statement is open before doing anything else, and read operations
//! return merged (committed + this transaction's overlay) results.
//!
//! Sentinel policy: lookups by name that find nothing return the id type's
//! `NONE` sentinel, and entity reads against `NONE` ids are empty results,
//! not errors. Asking for the *name* of a nonexistent token id is the
//! exception: that errors, with `*_name_or_placeholder` as the recovering
//! variant.

use crate::error::Result;
use crate::index::{ConstraintDescriptor, IndexDescriptor, InternalIndexState};
use crate::types::{LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId};

/// Token lookups.
pub trait TokenRead {
    /// Label id for `name`, `LabelId::NONE` when absent.
    fn label_get_for_name(&self, name: &str) -> Result<LabelId>;
    /// Label name for `id`. Errors with [`crate::KernelError::LabelNotFound`]
    /// for an unknown id.
    fn label_get_name(&self, id: LabelId) -> Result<String>;
    /// Label name for `id`, or a `"[<id>]"` placeholder when unknown.
    fn label_get_name_or_placeholder(&self, id: LabelId) -> String;
    /// Property key id for `name`, `PropKeyId::NONE` when absent.
    fn property_key_get_for_name(&self, name: &str) -> Result<PropKeyId>;
    /// Property key name for `id`.
    fn property_key_get_name(&self, id: PropKeyId) -> Result<String>;
    /// Relationship type id for `name`, `RelTypeId::NONE` when absent.
    fn relationship_type_get_for_name(&self, name: &str) -> Result<RelTypeId>;
    /// Relationship type name for `id`.
    fn relationship_type_get_name(&self, id: RelTypeId) -> Result<String>;
}

/// Token creation. Names are validated before any id is allocated.
pub trait TokenWrite {
    /// Resolves or creates a label token.
    fn label_get_or_create_for_name(&self, name: &str) -> Result<LabelId>;
    /// Resolves or creates a property key token.
    fn property_key_get_or_create_for_name(&self, name: &str) -> Result<PropKeyId>;
    /// Resolves or creates a relationship type token.
    fn relationship_type_get_or_create_for_name(&self, name: &str) -> Result<RelTypeId>;
}

/// Entity reads, merged over this transaction's overlay.
pub trait EntityRead {
    /// Whether `node` exists from this transaction's point of view.
    fn node_exists(&self, node: NodeId) -> Result<bool>;
    /// The merged label set of `node`, sorted.
    fn node_get_labels(&self, node: NodeId) -> Result<Vec<LabelId>>;
    /// Whether `node` carries `label`.
    fn node_has_label(&self, node: NodeId, label: LabelId) -> Result<bool>;
    /// The merged value of one node property.
    fn node_get_property(&self, node: NodeId, key: PropKeyId) -> Result<Option<PropertyValue>>;
    /// All merged properties of `node`, sorted by key.
    fn node_get_all_properties(&self, node: NodeId) -> Result<Vec<(PropKeyId, PropertyValue)>>;
    /// The merged value of one relationship property.
    fn relationship_get_property(
        &self,
        rel: RelId,
        key: PropKeyId,
    ) -> Result<Option<PropertyValue>>;
    /// The merged value of one graph property.
    fn graph_get_property(&self, key: PropKeyId) -> Result<Option<PropertyValue>>;
    /// Merged ids of nodes carrying `label`, sorted.
    fn nodes_get_for_label(&self, label: LabelId) -> Result<Vec<NodeId>>;
    /// Merged ids of relationships attached to `node`.
    fn node_get_relationships(&self, node: NodeId) -> Result<Vec<RelId>>;
    /// Unique-index point lookup. A hit returns holding a shared lock on the
    /// index entry; a miss returns `NodeId::NONE` holding an exclusive lock
    /// instead, so concurrent get-or-create callers serialize on the miss.
    fn node_get_from_unique_index_seek(
        &self,
        index: &IndexDescriptor,
        value: &PropertyValue,
    ) -> Result<NodeId>;
}

/// Entity writes. The first call flips the transaction to the data kind;
/// a transaction that has performed schema updates rejects these.
pub trait EntityWrite {
    /// Creates a node, returning its id.
    fn node_create(&self) -> Result<NodeId>;
    /// Deletes `node`. Relationship detachment is the caller's job; commit
    /// rejects a deleted node that still has relationships.
    fn node_delete(&self, node: NodeId) -> Result<()>;
    /// Creates a relationship.
    fn relationship_create(
        &self,
        rel_type: RelTypeId,
        start_node: NodeId,
        end_node: NodeId,
    ) -> Result<RelId>;
    /// Deletes a relationship.
    fn relationship_delete(&self, rel: RelId) -> Result<()>;
    /// Adds `label` to `node`; `false` when already present.
    fn node_add_label(&self, node: NodeId, label: LabelId) -> Result<bool>;
    /// Removes `label` from `node`; `false` when not present.
    fn node_remove_label(&self, node: NodeId, label: LabelId) -> Result<bool>;
    /// Sets a node property, returning the value it replaced.
    fn node_set_property(
        &self,
        node: NodeId,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>>;
    /// Removes a node property, returning the removed value.
    fn node_remove_property(&self, node: NodeId, key: PropKeyId)
        -> Result<Option<PropertyValue>>;
    /// Sets a relationship property, returning the value it replaced.
    fn relationship_set_property(
        &self,
        rel: RelId,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>>;
    /// Removes a relationship property, returning the removed value.
    fn relationship_remove_property(
        &self,
        rel: RelId,
        key: PropKeyId,
    ) -> Result<Option<PropertyValue>>;
    /// Sets a graph property, returning the value it replaced.
    fn graph_set_property(
        &self,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>>;
    /// Removes a graph property, returning the removed value.
    fn graph_remove_property(&self, key: PropKeyId) -> Result<Option<PropertyValue>>;
}

/// Schema reads, merged over this transaction's overlay.
pub trait SchemaRead {
    /// The index on `(label, key)`, if any.
    fn index_get_for_label_and_property_key(
        &self,
        label: LabelId,
        key: PropKeyId,
    ) -> Result<Option<IndexDescriptor>>;
    /// All indexes, sorted by (label, key).
    fn indexes_get_all(&self) -> Result<Vec<IndexDescriptor>>;
    /// Lifecycle state of `index` as the provider reports it.
    fn index_get_state(&self, index: &IndexDescriptor) -> Result<InternalIndexState>;
    /// All uniqueness constraints, sorted by (label, key).
    fn constraints_get_all(&self) -> Result<Vec<ConstraintDescriptor>>;
    /// Whether `constraint` exists.
    fn constraint_exists(&self, constraint: &ConstraintDescriptor) -> Result<bool>;
}

/// Schema writes. The first call flips the transaction to the schema kind;
/// a transaction that has performed data updates rejects these.
pub trait SchemaWrite {
    /// Creates a plain index on `(label, key)`.
    fn index_create(&self, label: LabelId, key: PropKeyId) -> Result<IndexDescriptor>;
    /// Drops an index.
    fn index_drop(&self, index: IndexDescriptor) -> Result<()>;
    /// Creates a uniqueness constraint with its backing index.
    fn uniqueness_constraint_create(
        &self,
        label: LabelId,
        key: PropKeyId,
    ) -> Result<ConstraintDescriptor>;
    /// Drops a uniqueness constraint together with its backing index.
    fn constraint_drop(&self, constraint: ConstraintDescriptor) -> Result<()>;
}
