//! Capability-trait implementations for [`KernelStatement`].
//!
//! Every operation asserts the statement open, then works against the
//! owning transaction: reads merge the overlay over committed storage,
//! writes first flip the transaction to the data or schema kind and take
//! the locks the operation needs. Lookups by `NONE` sentinels are empty
//! results; genuine missing entities are errors.

use crate::error::{KernelError, Result};
use crate::index::{ConstraintDescriptor, IndexDescriptor, InternalIndexState, SchemaRule};
use crate::kernel::{KernelStatement, TransactionInner};
use crate::locking::{index_entry_resource_id, ResourceType};
use crate::record::PropertyOwner;
use crate::types::{LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId};

use super::traits::{EntityRead, EntityWrite, SchemaRead, SchemaWrite, TokenRead, TokenWrite};

fn validate_token_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(KernelError::IllegalTokenName(name.to_owned()));
    }
    Ok(())
}

fn node_visible(inner: &TransactionInner, node: NodeId) -> bool {
    if node.is_none() || inner.tx_state.node_is_deleted_in_tx(node) {
        return false;
    }
    inner.tx_state.node_is_added_in_tx(node) || inner.store.load_node(node).is_some()
}

fn relationship_visible(inner: &TransactionInner, rel: RelId) -> bool {
    if rel.is_none() || inner.tx_state.relationship_is_deleted_in_tx(rel) {
        return false;
    }
    inner.tx_state.relationship_is_added_in_tx(rel)
        || inner.store.load_relationship(rel).is_some()
}

fn merged_node_labels(inner: &TransactionInner, node: NodeId) -> Vec<LabelId> {
    let committed = if inner.tx_state.node_is_added_in_tx(node) {
        Vec::new()
    } else {
        inner.store.node_labels(node)
    };
    let mut labels = inner.tx_state.augment_labels(node, committed);
    labels.sort_unstable();
    labels
}

fn merged_property(
    inner: &TransactionInner,
    owner: PropertyOwner,
    key: PropKeyId,
) -> Option<PropertyValue> {
    let diff = match owner {
        PropertyOwner::Node(node) => inner.tx_state.node_property_diff(node),
        PropertyOwner::Relationship(rel) => inner.tx_state.rel_property_diff(rel),
        PropertyOwner::Graph => Some(inner.tx_state.graph_property_diff()),
    };
    if let Some(overlay) = diff.and_then(|d| d.overlay(key)) {
        return overlay.cloned();
    }
    let created_here = match owner {
        PropertyOwner::Node(node) => inner.tx_state.node_is_added_in_tx(node),
        PropertyOwner::Relationship(rel) => inner.tx_state.relationship_is_added_in_tx(rel),
        PropertyOwner::Graph => false,
    };
    if created_here {
        None
    } else {
        inner.store.load_property(owner, key)
    }
}

fn committed_property(
    inner: &TransactionInner,
    owner: PropertyOwner,
    key: PropKeyId,
) -> Option<PropertyValue> {
    let created_here = match owner {
        PropertyOwner::Node(node) => inner.tx_state.node_is_added_in_tx(node),
        PropertyOwner::Relationship(rel) => inner.tx_state.relationship_is_added_in_tx(rel),
        PropertyOwner::Graph => false,
    };
    if created_here {
        None
    } else {
        inner.store.load_property(owner, key)
    }
}

fn merged_indexes(inner: &TransactionInner) -> Vec<IndexDescriptor> {
    let committed = inner.store.schema_rules().into_iter().filter_map(|rule| {
        if !rule.rule.is_index() {
            return None;
        }
        let (label, property_key) = rule.rule.schema();
        Some(IndexDescriptor {
            label,
            property_key,
            unique: matches!(rule.rule, SchemaRule::ConstraintIndex { .. }),
        })
    });
    let plain = inner.tx_state.index_changes();
    let mut merged: Vec<IndexDescriptor> = plain
        .apply(committed.filter(|d| !d.unique || !is_backing_removed(inner, d)))
        .collect();
    merged.extend(
        inner
            .tx_state
            .constraint_indexes_created_in_tx()
            .into_iter(),
    );
    merged.sort_by_key(|d| (d.label, d.property_key, d.unique));
    merged.dedup();
    merged
}

fn is_backing_removed(inner: &TransactionInner, descriptor: &IndexDescriptor) -> bool {
    inner
        .tx_state
        .constraint_changes()
        .is_removed(&ConstraintDescriptor {
            label: descriptor.label,
            property_key: descriptor.property_key,
        })
}

fn merged_constraints(inner: &TransactionInner) -> Vec<ConstraintDescriptor> {
    let committed = inner.store.schema_rules().into_iter().filter_map(|rule| {
        match rule.rule {
            SchemaRule::UniquenessConstraint {
                label,
                property_key,
                ..
            } => Some(ConstraintDescriptor {
                label,
                property_key,
            }),
            _ => None,
        }
    });
    let mut merged: Vec<_> = inner.tx_state.constraint_changes().apply(committed).collect();
    merged.sort_by_key(|c| (c.label, c.property_key));
    merged.dedup();
    merged
}

fn committed_index_rule_id(
    inner: &TransactionInner,
    descriptor: &IndexDescriptor,
) -> Option<crate::types::RuleId> {
    inner
        .store
        .schema_rules()
        .into_iter()
        .find(|rule| {
            rule.rule.is_index()
                && rule.rule.schema() == (descriptor.label, descriptor.property_key)
                && matches!(rule.rule, SchemaRule::ConstraintIndex { .. }) == descriptor.unique
        })
        .map(|rule| rule.id)
}

/// Whether `node`, merged with this transaction's writes, currently holds
/// `value` under the indexed (label, key) pair.
fn index_entry_matches(
    inner: &TransactionInner,
    index: &IndexDescriptor,
    node: NodeId,
    value: &PropertyValue,
) -> bool {
    node_visible(inner, node)
        && merged_node_labels(inner, node).contains(&index.label)
        && merged_property(inner, PropertyOwner::Node(node), index.property_key).as_ref()
            == Some(value)
}

/// Index point lookup merged with this transaction's own writes: a
/// committed hit whose value or label was changed away in-tx reads as a
/// miss, and a node given the sought value in-tx reads as a hit.
fn unique_seek(
    inner: &TransactionInner,
    index: &IndexDescriptor,
    value: &PropertyValue,
) -> Result<NodeId> {
    let Some(rule) = committed_index_rule_id(inner, index) else {
        return Err(KernelError::Invalid(format!(
            "no unique index on (label {}, key {})",
            index.label, index.property_key
        )));
    };
    let provider = inner.providers.provider();
    if provider.initial_state(rule) != InternalIndexState::Online {
        return Err(KernelError::InvalidState("unique index is not online"));
    }
    let hit = provider.reader(rule)?.seek(value);
    if hit.is_some() && index_entry_matches(inner, index, hit, value) {
        return Ok(hit);
    }
    // The committed entry is gone as far as this transaction is concerned;
    // a node touched in-tx may carry the value instead.
    for node in inner.tx_state.touched_nodes() {
        if index_entry_matches(inner, index, node, value) {
            return Ok(node);
        }
    }
    Ok(NodeId::NONE)
}

impl TokenRead for KernelStatement {
    fn label_get_for_name(&self, name: &str) -> Result<LabelId> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_label_token(name) {
            return Ok(id);
        }
        Ok(inner.store.label_by_name(name).unwrap_or(LabelId::NONE))
    }

    fn label_get_name(&self, id: LabelId) -> Result<String> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(name) = inner.tx_state.created_label_token_name(id) {
            return Ok(name.to_owned());
        }
        inner
            .store
            .label_name(id)
            .ok_or(KernelError::LabelNotFound(id))
    }

    fn label_get_name_or_placeholder(&self, id: LabelId) -> String {
        match self.label_get_name(id) {
            Ok(name) => name,
            Err(_) => format!("[{id}]"),
        }
    }

    fn property_key_get_for_name(&self, name: &str) -> Result<PropKeyId> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_prop_key_token(name) {
            return Ok(id);
        }
        Ok(inner.store.prop_key_by_name(name).unwrap_or(PropKeyId::NONE))
    }

    fn property_key_get_name(&self, id: PropKeyId) -> Result<String> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(name) = inner.tx_state.created_prop_key_token_name(id) {
            return Ok(name.to_owned());
        }
        inner
            .store
            .prop_key_name(id)
            .ok_or(KernelError::PropertyKeyNotFound(id))
    }

    fn relationship_type_get_for_name(&self, name: &str) -> Result<RelTypeId> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_rel_type_token(name) {
            return Ok(id);
        }
        Ok(inner.store.rel_type_by_name(name).unwrap_or(RelTypeId::NONE))
    }

    fn relationship_type_get_name(&self, id: RelTypeId) -> Result<String> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if let Some(name) = inner.tx_state.created_rel_type_token_name(id) {
            return Ok(name.to_owned());
        }
        inner
            .store
            .rel_type_name(id)
            .ok_or(KernelError::RelationshipTypeNotFound(id))
    }
}

impl TokenWrite for KernelStatement {
    fn label_get_or_create_for_name(&self, name: &str) -> Result<LabelId> {
        self.assert_open()?;
        validate_token_name(name)?;
        let mut inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_label_token(name) {
            return Ok(id);
        }
        if let Some(id) = inner.store.label_by_name(name) {
            return Ok(id);
        }
        let id = inner.store.allocate_label_id();
        inner.tx_state.label_do_create_for_name(name, id);
        Ok(id)
    }

    fn property_key_get_or_create_for_name(&self, name: &str) -> Result<PropKeyId> {
        self.assert_open()?;
        validate_token_name(name)?;
        let mut inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_prop_key_token(name) {
            return Ok(id);
        }
        if let Some(id) = inner.store.prop_key_by_name(name) {
            return Ok(id);
        }
        let id = inner.store.allocate_prop_key_id();
        inner.tx_state.prop_key_do_create_for_name(name, id);
        Ok(id)
    }

    fn relationship_type_get_or_create_for_name(&self, name: &str) -> Result<RelTypeId> {
        self.assert_open()?;
        validate_token_name(name)?;
        let mut inner = self.tx.lock();
        if let Some(id) = inner.tx_state.created_rel_type_token(name) {
            return Ok(id);
        }
        if let Some(id) = inner.store.rel_type_by_name(name) {
            return Ok(id);
        }
        let id = inner.store.allocate_rel_type_id();
        inner.tx_state.rel_type_do_create_for_name(name, id);
        Ok(id)
    }
}

impl EntityRead for KernelStatement {
    fn node_exists(&self, node: NodeId) -> Result<bool> {
        self.assert_open()?;
        let inner = self.tx.lock();
        Ok(node_visible(&inner, node))
    }

    fn node_get_labels(&self, node: NodeId) -> Result<Vec<LabelId>> {
        self.assert_open()?;
        if node.is_none() {
            return Ok(Vec::new());
        }
        let inner = self.tx.lock();
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        Ok(merged_node_labels(&inner, node))
    }

    fn node_has_label(&self, node: NodeId, label: LabelId) -> Result<bool> {
        Ok(self.node_get_labels(node)?.contains(&label))
    }

    fn node_get_property(&self, node: NodeId, key: PropKeyId) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        if node.is_none() || key.is_none() {
            return Ok(None);
        }
        let inner = self.tx.lock();
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        Ok(merged_property(&inner, PropertyOwner::Node(node), key))
    }

    fn node_get_all_properties(&self, node: NodeId) -> Result<Vec<(PropKeyId, PropertyValue)>> {
        self.assert_open()?;
        if node.is_none() {
            return Ok(Vec::new());
        }
        let inner = self.tx.lock();
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        let committed = if inner.tx_state.node_is_added_in_tx(node) {
            Vec::new()
        } else {
            inner.store.properties(PropertyOwner::Node(node))
        };
        let mut merged: Vec<_> = inner
            .tx_state
            .augment_node_properties(node, committed.into_iter())
            .collect();
        merged.sort_by_key(|(key, _)| *key);
        Ok(merged)
    }

    fn relationship_get_property(
        &self,
        rel: RelId,
        key: PropKeyId,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        if rel.is_none() || key.is_none() {
            return Ok(None);
        }
        let inner = self.tx.lock();
        if !relationship_visible(&inner, rel) {
            return Err(KernelError::NotFound {
                kind: "relationship",
                id: rel.0,
            });
        }
        Ok(merged_property(&inner, PropertyOwner::Relationship(rel), key))
    }

    fn graph_get_property(&self, key: PropKeyId) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        if key.is_none() {
            return Ok(None);
        }
        let inner = self.tx.lock();
        Ok(merged_property(&inner, PropertyOwner::Graph, key))
    }

    fn nodes_get_for_label(&self, label: LabelId) -> Result<Vec<NodeId>> {
        self.assert_open()?;
        if label.is_none() {
            return Ok(Vec::new());
        }
        let inner = self.tx.lock();
        let committed = inner.store.nodes_with_label(label).into_iter();
        let mut nodes: Vec<NodeId> = match inner.tx_state.nodes_with_label_changed(label) {
            Some(diff) => diff.apply(committed).collect(),
            None => committed.collect(),
        };
        nodes.retain(|node| !inner.tx_state.node_is_deleted_in_tx(*node));
        nodes.sort_unstable();
        Ok(nodes)
    }

    fn node_get_relationships(&self, node: NodeId) -> Result<Vec<RelId>> {
        self.assert_open()?;
        if node.is_none() {
            return Ok(Vec::new());
        }
        let inner = self.tx.lock();
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        let committed = inner.store.relationships_of(node);
        let mut rels: Vec<_> = inner
            .tx_state
            .augment_relationships(node, committed.into_iter())
            .collect();
        rels.sort_unstable();
        Ok(rels)
    }

    fn node_get_from_unique_index_seek(
        &self,
        index: &IndexDescriptor,
        value: &PropertyValue,
    ) -> Result<NodeId> {
        self.assert_open()?;
        let inner = self.tx.lock();
        let resource = index_entry_resource_id(index.label, index.property_key, value);

        inner
            .locks
            .acquire_shared(ResourceType::IndexEntry, resource)?;
        let hit = unique_seek(&inner, index, value)?;
        if hit.is_some() {
            // Found: hold the shared lock for the rest of the transaction.
            return Ok(hit);
        }

        // Miss: trade the shared lock for an exclusive one so concurrent
        // get-or-create callers serialize here, then look again in case a
        // competitor won the race.
        inner
            .locks
            .release_shared(ResourceType::IndexEntry, resource);
        inner
            .locks
            .acquire_exclusive(ResourceType::IndexEntry, resource)?;
        let hit = unique_seek(&inner, index, value)?;
        if hit.is_some() {
            inner
                .locks
                .acquire_shared(ResourceType::IndexEntry, resource)?;
            inner
                .locks
                .release_exclusive(ResourceType::IndexEntry, resource);
            return Ok(hit);
        }
        // Still missing: return the sentinel holding the exclusive lock, so
        // the caller may create the entry without racing.
        Ok(NodeId::NONE)
    }
}

impl EntityWrite for KernelStatement {
    fn node_create(&self) -> Result<NodeId> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        let id = inner.store.allocate_node_id();
        inner.locks.acquire_exclusive(ResourceType::Node, id.0)?;
        inner.tx_state.node_do_create(id);
        Ok(id)
    }

    fn node_delete(&self, node: NodeId) -> Result<()> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        inner.locks.acquire_exclusive(ResourceType::Node, node.0)?;
        inner.tx_state.node_do_delete(node);
        Ok(())
    }

    fn relationship_create(
        &self,
        rel_type: RelTypeId,
        start_node: NodeId,
        end_node: NodeId,
    ) -> Result<RelId> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        for node in [start_node, end_node] {
            if !node_visible(&inner, node) {
                return Err(KernelError::NotFound {
                    kind: "node",
                    id: node.0,
                });
            }
        }
        // Endpoint locks in id order, so two creates over the same pair
        // cannot deadlock.
        let (first, second) = if start_node.0 <= end_node.0 {
            (start_node, end_node)
        } else {
            (end_node, start_node)
        };
        inner.locks.acquire_exclusive(ResourceType::Node, first.0)?;
        if second != first {
            inner.locks.acquire_exclusive(ResourceType::Node, second.0)?;
        }
        let id = inner.store.allocate_relationship_id();
        inner
            .locks
            .acquire_exclusive(ResourceType::Relationship, id.0)?;
        inner
            .tx_state
            .relationship_do_create(id, rel_type, start_node, end_node);
        Ok(id)
    }

    fn relationship_delete(&self, rel: RelId) -> Result<()> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        let data = inner.tx_state.created_relationship(rel).or_else(|| {
            if inner.tx_state.relationship_is_deleted_in_tx(rel) {
                None
            } else {
                inner
                    .store
                    .load_relationship(rel)
                    .map(|record| crate::state::RelationshipData {
                        rel_type: record.rel_type,
                        start_node: record.start_node,
                        end_node: record.end_node,
                    })
            }
        });
        let Some(data) = data else {
            return Err(KernelError::NotFound {
                kind: "relationship",
                id: rel.0,
            });
        };
        inner
            .locks
            .acquire_exclusive(ResourceType::Relationship, rel.0)?;
        inner
            .tx_state
            .relationship_do_delete(rel, data.rel_type, data.start_node, data.end_node);
        Ok(())
    }

    fn node_add_label(&self, node: NodeId, label: LabelId) -> Result<bool> {
        self.assert_open()?;
        if label.is_none() {
            return Ok(false);
        }
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        inner.locks.acquire_exclusive(ResourceType::Node, node.0)?;
        if merged_node_labels(&inner, node).contains(&label) {
            return Ok(false);
        }
        inner.tx_state.node_do_add_label(label, node);
        Ok(true)
    }

    fn node_remove_label(&self, node: NodeId, label: LabelId) -> Result<bool> {
        self.assert_open()?;
        if label.is_none() {
            return Ok(false);
        }
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        inner.locks.acquire_exclusive(ResourceType::Node, node.0)?;
        if !merged_node_labels(&inner, node).contains(&label) {
            return Ok(false);
        }
        inner.tx_state.node_do_remove_label(label, node);
        Ok(true)
    }

    fn node_set_property(
        &self,
        node: NodeId,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        inner.locks.acquire_exclusive(ResourceType::Node, node.0)?;
        let owner = PropertyOwner::Node(node);
        let previous = merged_property(&inner, owner, key);
        let committed = committed_property(&inner, owner, key);
        inner
            .tx_state
            .node_do_replace_property(node, key, committed, value);
        Ok(previous)
    }

    fn node_remove_property(
        &self,
        node: NodeId,
        key: PropKeyId,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !node_visible(&inner, node) {
            return Err(KernelError::NotFound {
                kind: "node",
                id: node.0,
            });
        }
        inner.locks.acquire_exclusive(ResourceType::Node, node.0)?;
        let owner = PropertyOwner::Node(node);
        let previous = merged_property(&inner, owner, key);
        let committed = committed_property(&inner, owner, key);
        inner.tx_state.node_do_remove_property(node, key, committed);
        Ok(previous)
    }

    fn relationship_set_property(
        &self,
        rel: RelId,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !relationship_visible(&inner, rel) {
            return Err(KernelError::NotFound {
                kind: "relationship",
                id: rel.0,
            });
        }
        inner
            .locks
            .acquire_exclusive(ResourceType::Relationship, rel.0)?;
        let owner = PropertyOwner::Relationship(rel);
        let previous = merged_property(&inner, owner, key);
        let committed = committed_property(&inner, owner, key);
        inner
            .tx_state
            .relationship_do_replace_property(rel, key, committed, value);
        Ok(previous)
    }

    fn relationship_remove_property(
        &self,
        rel: RelId,
        key: PropKeyId,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        if !relationship_visible(&inner, rel) {
            return Err(KernelError::NotFound {
                kind: "relationship",
                id: rel.0,
            });
        }
        inner
            .locks
            .acquire_exclusive(ResourceType::Relationship, rel.0)?;
        let owner = PropertyOwner::Relationship(rel);
        let previous = merged_property(&inner, owner, key);
        let committed = committed_property(&inner, owner, key);
        inner
            .tx_state
            .relationship_do_remove_property(rel, key, committed);
        Ok(previous)
    }

    fn graph_set_property(
        &self,
        key: PropKeyId,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        let previous = merged_property(&inner, PropertyOwner::Graph, key);
        let committed = committed_property(&inner, PropertyOwner::Graph, key);
        inner.tx_state.graph_do_replace_property(key, committed, value);
        Ok(previous)
    }

    fn graph_remove_property(&self, key: PropKeyId) -> Result<Option<PropertyValue>> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_data()?;
        let previous = merged_property(&inner, PropertyOwner::Graph, key);
        let committed = committed_property(&inner, PropertyOwner::Graph, key);
        inner.tx_state.graph_do_remove_property(key, committed);
        Ok(previous)
    }
}

impl SchemaRead for KernelStatement {
    fn index_get_for_label_and_property_key(
        &self,
        label: LabelId,
        key: PropKeyId,
    ) -> Result<Option<IndexDescriptor>> {
        self.assert_open()?;
        let inner = self.tx.lock();
        Ok(merged_indexes(&inner)
            .into_iter()
            .find(|d| d.label == label && d.property_key == key))
    }

    fn indexes_get_all(&self) -> Result<Vec<IndexDescriptor>> {
        self.assert_open()?;
        let inner = self.tx.lock();
        Ok(merged_indexes(&inner))
    }

    fn index_get_state(&self, index: &IndexDescriptor) -> Result<InternalIndexState> {
        self.assert_open()?;
        let inner = self.tx.lock();
        if inner.tx_state.index_changes().is_added(index)
            || inner
                .tx_state
                .constraint_indexes_created_in_tx()
                .contains(index)
        {
            return Ok(InternalIndexState::Populating);
        }
        match committed_index_rule_id(&inner, index) {
            Some(rule) => Ok(inner.providers.provider().initial_state(rule)),
            None => Ok(InternalIndexState::NonExistent),
        }
    }

    fn constraints_get_all(&self) -> Result<Vec<ConstraintDescriptor>> {
        self.assert_open()?;
        let inner = self.tx.lock();
        Ok(merged_constraints(&inner))
    }

    fn constraint_exists(&self, constraint: &ConstraintDescriptor) -> Result<bool> {
        Ok(self.constraints_get_all()?.contains(constraint))
    }
}

impl SchemaWrite for KernelStatement {
    fn index_create(&self, label: LabelId, key: PropKeyId) -> Result<IndexDescriptor> {
        self.assert_open()?;
        if label.is_none() || key.is_none() {
            return Err(KernelError::Invalid(
                "index schema requires a resolved label and property key".into(),
            ));
        }
        let mut inner = self.tx.lock();
        inner.upgrade_to_schema()?;
        inner.locks.acquire_exclusive(ResourceType::Schema, 0)?;
        let descriptor = IndexDescriptor {
            label,
            property_key: key,
            unique: false,
        };
        if merged_indexes(&inner)
            .iter()
            .any(|d| d.label == label && d.property_key == key)
        {
            return Err(KernelError::AlreadyExists(format!(
                "index on (label {label}, key {key})"
            )));
        }
        inner.tx_state.index_do_add(descriptor.clone());
        Ok(descriptor)
    }

    fn index_drop(&self, index: IndexDescriptor) -> Result<()> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_schema()?;
        inner.locks.acquire_exclusive(ResourceType::Schema, 0)?;
        if !merged_indexes(&inner).contains(&index) {
            return Err(KernelError::Invalid(format!(
                "no index on (label {}, key {})",
                index.label, index.property_key
            )));
        }
        if index.unique {
            return Err(KernelError::Invalid(
                "constraint-backing indexes are dropped with their constraint".into(),
            ));
        }
        inner.tx_state.index_do_drop(index);
        Ok(())
    }

    fn uniqueness_constraint_create(
        &self,
        label: LabelId,
        key: PropKeyId,
    ) -> Result<ConstraintDescriptor> {
        self.assert_open()?;
        if label.is_none() || key.is_none() {
            return Err(KernelError::Invalid(
                "constraint schema requires a resolved label and property key".into(),
            ));
        }
        let mut inner = self.tx.lock();
        inner.upgrade_to_schema()?;
        inner.locks.acquire_exclusive(ResourceType::Schema, 0)?;
        let constraint = ConstraintDescriptor {
            label,
            property_key: key,
        };
        if merged_constraints(&inner).contains(&constraint) {
            return Err(KernelError::AlreadyExists(format!(
                "uniqueness constraint on (label {label}, key {key})"
            )));
        }
        let backing = IndexDescriptor {
            label,
            property_key: key,
            unique: true,
        };
        // Re-creating a constraint dropped earlier in this transaction
        // restores it (and its backing index) instead of rebuilding.
        if !inner.tx_state.constraint_do_un_remove(&constraint, &backing) {
            inner.tx_state.constraint_do_add(constraint.clone(), backing);
        }
        Ok(constraint)
    }

    fn constraint_drop(&self, constraint: ConstraintDescriptor) -> Result<()> {
        self.assert_open()?;
        let mut inner = self.tx.lock();
        inner.upgrade_to_schema()?;
        inner.locks.acquire_exclusive(ResourceType::Schema, 0)?;
        if !merged_constraints(&inner).contains(&constraint) {
            return Err(KernelError::Invalid(format!(
                "no uniqueness constraint on (label {}, key {})",
                constraint.label, constraint.property_key
            )));
        }
        let backing = IndexDescriptor {
            label: constraint.label,
            property_key: constraint.property_key,
            unique: true,
        };
        inner.tx_state.constraint_do_drop(constraint, &backing);
        Ok(())
    }
}
