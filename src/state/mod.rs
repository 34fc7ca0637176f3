//! The transaction-state overlay.
//!
//! [`TxState`] records everything changed by the current transaction:
//! created/deleted entities, per-node label diffs, per-entity property
//! diffs, per-label node-id diffs and schema diffs. Read operations merge
//! it over committed storage through the `augment_*` methods; commit walks
//! it once through [`TxState::accept`] to produce record changes.
//!
//! `has_changes` is computed from diff-set emptiness, so there is no
//! separately maintained flag to keep ordered with the mutations.

mod diffs;

pub use diffs::DiffSet;

use rustc_hash::FxHashMap;

use crate::index::{ConstraintDescriptor, IndexDescriptor};
use crate::types::{LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId};

/// Type, start and end of a relationship touched by this transaction.
/// Deleted relationships keep this so endpoint bookkeeping can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipData {
    /// Relationship type.
    pub rel_type: RelTypeId,
    /// Start node.
    pub start_node: NodeId,
    /// End node.
    pub end_node: NodeId,
}

/// Property diff for one entity: added, changed (with the pre-transaction
/// value) and removed (with the pre-transaction value).
#[derive(Debug, Clone, Default)]
pub struct PropertyDiff {
    added: FxHashMap<PropKeyId, PropertyValue>,
    changed: FxHashMap<PropKeyId, (PropertyValue, PropertyValue)>,
    removed: FxHashMap<PropKeyId, PropertyValue>,
}

impl PropertyDiff {
    /// Records `key := new`. `old` is the committed value, `None` when the
    /// key was absent before this transaction.
    pub fn replace(&mut self, key: PropKeyId, old: Option<PropertyValue>, new: PropertyValue) {
        if let Some(value) = self.added.get_mut(&key) {
            *value = new;
            return;
        }
        if let Some((_, current)) = self.changed.get_mut(&key) {
            *current = new;
            return;
        }
        if let Some(committed_old) = self.removed.remove(&key) {
            // Removed and re-set inside the transaction: net effect is a
            // change against the committed value.
            self.changed.insert(key, (committed_old, new));
            return;
        }
        match old {
            Some(old) => {
                self.changed.insert(key, (old, new));
            }
            None => {
                self.added.insert(key, new);
            }
        }
    }

    /// Records removal of `key`. `old` is the committed value; removing a
    /// key this transaction added simply retracts the addition.
    pub fn remove(&mut self, key: PropKeyId, old: Option<PropertyValue>) {
        if self.added.remove(&key).is_some() {
            return;
        }
        if let Some((committed_old, _)) = self.changed.remove(&key) {
            self.removed.insert(key, committed_old);
            return;
        }
        if let Some(old) = old {
            self.removed.insert(key, old);
        }
    }

    /// The overlay value for `key`: `Some(Some(v))` when set in this
    /// transaction, `Some(None)` when removed, `None` when untouched.
    pub fn overlay(&self, key: PropKeyId) -> Option<Option<&PropertyValue>> {
        if let Some(value) = self.added.get(&key) {
            return Some(Some(value));
        }
        if let Some((_, value)) = self.changed.get(&key) {
            return Some(Some(value));
        }
        if self.removed.contains_key(&key) {
            return Some(None);
        }
        None
    }

    /// Keys added in this transaction, sorted, with values.
    pub fn added_sorted(&self) -> Vec<(PropKeyId, PropertyValue)> {
        let mut out: Vec<_> = self
            .added
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }

    /// Keys changed in this transaction, sorted, with (old, new) values.
    pub fn changed_sorted(&self) -> Vec<(PropKeyId, PropertyValue, PropertyValue)> {
        let mut out: Vec<_> = self
            .changed
            .iter()
            .map(|(k, (old, new))| (*k, old.clone(), new.clone()))
            .collect();
        out.sort_by_key(|(k, _, _)| *k);
        out
    }

    /// Keys removed in this transaction, sorted, with the old values.
    pub fn removed_sorted(&self) -> Vec<(PropKeyId, PropertyValue)> {
        let mut out: Vec<_> = self
            .removed
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }

    /// True when the diff records nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Merges the diff over a committed `(key, value)` iterator: values
    /// changed or removed here shadow or drop committed entries, additions
    /// are appended. Untouched entries keep their order. The result is a
    /// fresh single-pass iterator.
    pub fn augment<'a>(
        &'a self,
        committed: impl Iterator<Item = (PropKeyId, PropertyValue)> + 'a,
    ) -> impl Iterator<Item = (PropKeyId, PropertyValue)> + 'a {
        committed
            .filter_map(move |(key, value)| match self.overlay(key) {
                None => Some((key, value)),
                Some(Some(overriding)) => Some((key, overriding.clone())),
                Some(None) => None,
            })
            .chain(
                self.added
                    .iter()
                    .map(|(k, v)| (*k, v.clone())),
            )
    }
}

/// Per-node overlay: label diff plus property diff.
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    /// Labels added/removed on this node.
    pub labels: DiffSet<LabelId>,
    /// Property changes on this node.
    pub properties: PropertyDiff,
}

/// Receives the content of a [`TxState`] in deterministic order at commit.
///
/// Creations are visited before modifications, modifications before
/// deletions, and within each category entities are visited in ascending id
/// order, so the same logical operations always produce the same downstream
/// record changes.
pub trait TxStateVisitor {
    /// A label token created by this transaction.
    fn visit_created_label_token(&mut self, name: &str, id: LabelId);
    /// A property key token created by this transaction.
    fn visit_created_prop_key_token(&mut self, name: &str, id: PropKeyId);
    /// A relationship type token created by this transaction.
    fn visit_created_rel_type_token(&mut self, name: &str, id: RelTypeId);
    /// A node created by this transaction.
    fn visit_created_node(&mut self, id: NodeId);
    /// A relationship created by this transaction.
    fn visit_created_relationship(&mut self, id: RelId, data: RelationshipData);
    /// Net label changes on a node (both lists sorted).
    fn visit_node_label_changes(&mut self, id: NodeId, added: &[LabelId], removed: &[LabelId]);
    /// Net property changes on a node.
    fn visit_node_property_changes(&mut self, id: NodeId, diff: &PropertyDiff);
    /// Net property changes on a relationship.
    fn visit_rel_property_changes(&mut self, id: RelId, diff: &PropertyDiff);
    /// Net property changes on the graph.
    fn visit_graph_property_changes(&mut self, diff: &PropertyDiff);
    /// A relationship deleted by this transaction (existed before it).
    fn visit_deleted_relationship(&mut self, id: RelId, data: RelationshipData);
    /// A node deleted by this transaction (existed before it).
    fn visit_deleted_node(&mut self, id: NodeId);
    /// An index added by this transaction.
    fn visit_added_index(&mut self, descriptor: &IndexDescriptor);
    /// An index removed by this transaction.
    fn visit_removed_index(&mut self, descriptor: &IndexDescriptor);
    /// A uniqueness constraint added by this transaction.
    fn visit_added_constraint(&mut self, constraint: &ConstraintDescriptor);
    /// A uniqueness constraint removed by this transaction.
    fn visit_removed_constraint(&mut self, constraint: &ConstraintDescriptor);
}

/// Everything the current transaction has changed, overlayed on committed
/// storage by every read.
#[derive(Debug, Default)]
pub struct TxState {
    nodes: DiffSet<NodeId>,
    relationships: DiffSet<RelId>,
    created_rels: FxHashMap<RelId, RelationshipData>,
    deleted_rels: FxHashMap<RelId, RelationshipData>,
    node_states: FxHashMap<NodeId, NodeState>,
    rel_states: FxHashMap<RelId, PropertyDiff>,
    graph_state: PropertyDiff,
    nodes_by_label: FxHashMap<LabelId, DiffSet<NodeId>>,
    indexes: DiffSet<IndexDescriptor>,
    constraint_indexes: DiffSet<IndexDescriptor>,
    constraints: DiffSet<ConstraintDescriptor>,
    created_label_tokens: Vec<(String, LabelId)>,
    created_prop_key_tokens: Vec<(String, PropKeyId)>,
    created_rel_type_tokens: Vec<(String, RelTypeId)>,
}

impl TxState {
    /// A fresh, empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the overlay records a net change. Operations that cancel
    /// each other out (add then remove the same label) leave the overlay
    /// reporting no changes; the flag is computed, never cached.
    pub fn has_changes(&self) -> bool {
        self.has_data_changes()
            || !self.indexes.is_empty()
            || !self.constraint_indexes.is_empty()
            || !self.constraints.is_empty()
            || !self.created_label_tokens.is_empty()
            || !self.created_prop_key_tokens.is_empty()
            || !self.created_rel_type_tokens.is_empty()
    }

    /// True when entity or property changes are recorded (as opposed to
    /// schema and token changes only).
    pub fn has_data_changes(&self) -> bool {
        !self.nodes.is_empty()
            || !self.relationships.is_empty()
            || self
                .node_states
                .values()
                .any(|s| !s.labels.is_empty() || !s.properties.is_empty())
            || self.rel_states.values().any(|d| !d.is_empty())
            || !self.graph_state.is_empty()
    }

    // --- node lifecycle -------------------------------------------------

    /// Records creation of `id`.
    pub fn node_do_create(&mut self, id: NodeId) {
        self.nodes.add(id);
    }

    /// Records deletion of `id`. Deleting a node created by this
    /// transaction erases every trace of it: no command will be generated
    /// and no update notification emitted.
    pub fn node_do_delete(&mut self, id: NodeId) {
        if self.nodes.is_added(&id) {
            self.nodes.retract_addition(&id);
            if let Some(state) = self.node_states.remove(&id) {
                for label in state.labels.added() {
                    if let Some(diff) = self.nodes_by_label.get_mut(label) {
                        diff.retract_addition(&id);
                    }
                }
            }
        } else {
            self.nodes.remove(id);
            if let Some(state) = self.node_states.remove(&id) {
                for label in state.labels.added() {
                    if let Some(diff) = self.nodes_by_label.get_mut(label) {
                        diff.retract_addition(&id);
                    }
                }
            }
        }
    }

    /// Whether `id` was created by this transaction (and not yet deleted).
    pub fn node_is_added_in_tx(&self, id: NodeId) -> bool {
        self.nodes.is_added(&id)
    }

    /// Whether `id` was deleted by this transaction. A node both created
    /// and deleted here reports `false`: it never existed.
    pub fn node_is_deleted_in_tx(&self, id: NodeId) -> bool {
        self.nodes.is_removed(&id)
    }

    // --- relationship lifecycle -----------------------------------------

    /// Records creation of relationship `id`.
    pub fn relationship_do_create(
        &mut self,
        id: RelId,
        rel_type: RelTypeId,
        start_node: NodeId,
        end_node: NodeId,
    ) {
        self.relationships.add(id);
        self.created_rels.insert(
            id,
            RelationshipData {
                rel_type,
                start_node,
                end_node,
            },
        );
    }

    /// Records deletion of relationship `id`. Deleting a relationship
    /// created by this transaction cancels it entirely.
    pub fn relationship_do_delete(
        &mut self,
        id: RelId,
        rel_type: RelTypeId,
        start_node: NodeId,
        end_node: NodeId,
    ) {
        if self.created_rels.remove(&id).is_some() {
            self.relationships.retract_addition(&id);
            self.rel_states.remove(&id);
        } else {
            self.relationships.remove(id);
            self.deleted_rels.insert(
                id,
                RelationshipData {
                    rel_type,
                    start_node,
                    end_node,
                },
            );
            self.rel_states.remove(&id);
        }
    }

    /// Whether relationship `id` was created by this transaction.
    pub fn relationship_is_added_in_tx(&self, id: RelId) -> bool {
        self.relationships.is_added(&id)
    }

    /// Whether relationship `id` was deleted by this transaction.
    pub fn relationship_is_deleted_in_tx(&self, id: RelId) -> bool {
        self.relationships.is_removed(&id)
    }

    /// Endpoint data of a relationship created in this transaction.
    pub fn created_relationship(&self, id: RelId) -> Option<RelationshipData> {
        self.created_rels.get(&id).copied()
    }

    // --- labels ---------------------------------------------------------

    /// Records adding `label` to `node`.
    pub fn node_do_add_label(&mut self, label: LabelId, node: NodeId) {
        self.node_states.entry(node).or_default().labels.add(label);
        self.nodes_by_label.entry(label).or_default().add(node);
    }

    /// Records removing `label` from `node`.
    pub fn node_do_remove_label(&mut self, label: LabelId, node: NodeId) {
        self.node_states
            .entry(node)
            .or_default()
            .labels
            .remove(label);
        self.nodes_by_label.entry(label).or_default().remove(node);
    }

    /// The label diff of `node`, if it has one.
    pub fn label_state(&self, node: NodeId) -> Option<&DiffSet<LabelId>> {
        self.node_states.get(&node).map(|s| &s.labels)
    }

    /// Merges this transaction's label changes over the committed label set
    /// of `node`.
    pub fn augment_labels(&self, node: NodeId, committed: Vec<LabelId>) -> Vec<LabelId> {
        match self.label_state(node) {
            Some(diff) => diff.apply(committed.into_iter()).collect(),
            None => committed,
        }
    }

    /// Node-id diff for `label` (an acceleration for label scans).
    pub fn nodes_with_label_changed(&self, label: LabelId) -> Option<&DiffSet<NodeId>> {
        self.nodes_by_label.get(&label)
    }

    /// Node additions and removals recorded by this transaction.
    pub fn added_and_removed_nodes(&self) -> &DiffSet<NodeId> {
        &self.nodes
    }

    /// Ids of nodes with label or property changes recorded, sorted.
    pub fn touched_nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<_> = self
            .node_states
            .iter()
            .filter(|(_, s)| !s.labels.is_empty() || !s.properties.is_empty())
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    // --- properties -----------------------------------------------------

    /// Records `node.key := new` (old committed value, if any, supplied by
    /// the caller).
    pub fn node_do_replace_property(
        &mut self,
        node: NodeId,
        key: PropKeyId,
        old: Option<PropertyValue>,
        new: PropertyValue,
    ) {
        self.node_states
            .entry(node)
            .or_default()
            .properties
            .replace(key, old, new);
    }

    /// Records removal of `node.key`.
    pub fn node_do_remove_property(
        &mut self,
        node: NodeId,
        key: PropKeyId,
        old: Option<PropertyValue>,
    ) {
        self.node_states
            .entry(node)
            .or_default()
            .properties
            .remove(key, old);
    }

    /// Records `rel.key := new`.
    pub fn relationship_do_replace_property(
        &mut self,
        rel: RelId,
        key: PropKeyId,
        old: Option<PropertyValue>,
        new: PropertyValue,
    ) {
        self.rel_states.entry(rel).or_default().replace(key, old, new);
    }

    /// Records removal of `rel.key`.
    pub fn relationship_do_remove_property(
        &mut self,
        rel: RelId,
        key: PropKeyId,
        old: Option<PropertyValue>,
    ) {
        self.rel_states.entry(rel).or_default().remove(key, old);
    }

    /// Records `graph.key := new`.
    pub fn graph_do_replace_property(
        &mut self,
        key: PropKeyId,
        old: Option<PropertyValue>,
        new: PropertyValue,
    ) {
        self.graph_state.replace(key, old, new);
    }

    /// Records removal of `graph.key`.
    pub fn graph_do_remove_property(&mut self, key: PropKeyId, old: Option<PropertyValue>) {
        self.graph_state.remove(key, old);
    }

    /// Property diff of `node`, if any.
    pub fn node_property_diff(&self, node: NodeId) -> Option<&PropertyDiff> {
        self.node_states.get(&node).map(|s| &s.properties)
    }

    /// Property diff of `rel`, if any.
    pub fn rel_property_diff(&self, rel: RelId) -> Option<&PropertyDiff> {
        self.rel_states.get(&rel)
    }

    /// Property diff of the graph.
    pub fn graph_property_diff(&self) -> &PropertyDiff {
        &self.graph_state
    }

    /// Merges this transaction's property changes for `node` over a
    /// committed `(key, value)` iterator. The result is single-pass and not
    /// restartable.
    pub fn augment_node_properties<'a>(
        &'a self,
        node: NodeId,
        committed: impl Iterator<Item = (PropKeyId, PropertyValue)> + 'a,
    ) -> Box<dyn Iterator<Item = (PropKeyId, PropertyValue)> + 'a> {
        match self.node_property_diff(node) {
            Some(diff) => Box::new(diff.augment(committed)),
            None => Box::new(committed),
        }
    }

    /// Merges created/deleted relationships over a committed iterator of
    /// relationship ids touching `node`.
    pub fn augment_relationships<'a>(
        &'a self,
        node: NodeId,
        committed: impl Iterator<Item = RelId> + 'a,
    ) -> impl Iterator<Item = RelId> + 'a {
        committed
            .filter(move |id| !self.relationships.is_removed(id))
            .chain(self.created_rels.iter().filter_map(move |(id, data)| {
                (data.start_node == node || data.end_node == node).then_some(*id)
            }))
    }

    // --- tokens ---------------------------------------------------------

    /// Records creation of a label token.
    pub fn label_do_create_for_name(&mut self, name: &str, id: LabelId) {
        self.created_label_tokens.push((name.to_owned(), id));
    }

    /// Records creation of a property key token.
    pub fn prop_key_do_create_for_name(&mut self, name: &str, id: PropKeyId) {
        self.created_prop_key_tokens.push((name.to_owned(), id));
    }

    /// Records creation of a relationship type token.
    pub fn rel_type_do_create_for_name(&mut self, name: &str, id: RelTypeId) {
        self.created_rel_type_tokens.push((name.to_owned(), id));
    }

    /// Label token created in this transaction by name, if any.
    pub fn created_label_token(&self, name: &str) -> Option<LabelId> {
        self.created_label_tokens
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Property key token created in this transaction by name, if any.
    pub fn created_prop_key_token(&self, name: &str) -> Option<PropKeyId> {
        self.created_prop_key_tokens
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Relationship type token created in this transaction by name, if any.
    pub fn created_rel_type_token(&self, name: &str) -> Option<RelTypeId> {
        self.created_rel_type_tokens
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Name of a label token created in this transaction, if any.
    pub fn created_label_token_name(&self, id: LabelId) -> Option<&str> {
        self.created_label_tokens
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
    }

    /// Name of a property key token created in this transaction, if any.
    pub fn created_prop_key_token_name(&self, id: PropKeyId) -> Option<&str> {
        self.created_prop_key_tokens
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
    }

    /// Name of a relationship type token created in this transaction, if
    /// any.
    pub fn created_rel_type_token_name(&self, id: RelTypeId) -> Option<&str> {
        self.created_rel_type_tokens
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
    }

    // --- schema ---------------------------------------------------------

    /// Records creation of an index. Re-adding an index dropped earlier in
    /// this transaction cancels the drop.
    pub fn index_do_add(&mut self, descriptor: IndexDescriptor) {
        self.indexes.add(descriptor);
    }

    /// Records dropping an index.
    pub fn index_do_drop(&mut self, descriptor: IndexDescriptor) {
        self.indexes.remove(descriptor);
    }

    /// Reverts a pending index drop; used when multi-step DDL restores the
    /// index before commit.
    pub fn index_do_un_remove(&mut self, descriptor: &IndexDescriptor) -> bool {
        self.indexes.un_remove(descriptor)
    }

    /// Records creation of a uniqueness constraint together with its
    /// backing index.
    pub fn constraint_do_add(
        &mut self,
        constraint: ConstraintDescriptor,
        backing_index: IndexDescriptor,
    ) {
        self.constraints.add(constraint);
        self.constraint_indexes.add(backing_index);
    }

    /// Records dropping a uniqueness constraint. When its backing index was
    /// created by this same transaction, the index creation is retracted
    /// too; a committed backing index is marked removed alongside the
    /// constraint.
    pub fn constraint_do_drop(
        &mut self,
        constraint: ConstraintDescriptor,
        backing_index: &IndexDescriptor,
    ) {
        self.constraints.remove(constraint);
        if !self.constraint_indexes.retract_addition(backing_index) {
            self.constraint_indexes.remove(backing_index.clone());
        }
    }

    /// Reverts a pending constraint drop, restoring the backing index with
    /// it.
    pub fn constraint_do_un_remove(
        &mut self,
        constraint: &ConstraintDescriptor,
        backing_index: &IndexDescriptor,
    ) -> bool {
        self.constraint_indexes.un_remove(backing_index);
        self.constraints.un_remove(constraint)
    }

    /// Index diff recorded by this transaction.
    pub fn index_changes(&self) -> &DiffSet<IndexDescriptor> {
        &self.indexes
    }

    /// Constraint diff recorded by this transaction.
    pub fn constraint_changes(&self) -> &DiffSet<ConstraintDescriptor> {
        &self.constraints
    }

    /// Constraint-backing indexes created by this transaction; dropped on
    /// rollback so no orphaned backing index survives.
    pub fn constraint_indexes_created_in_tx(&self) -> Vec<IndexDescriptor> {
        let mut out: Vec<_> = self.constraint_indexes.added().cloned().collect();
        out.sort_by_key(|d| (d.label, d.property_key));
        out
    }

    // --- commit bridge --------------------------------------------------

    /// Walks the overlay in deterministic order. See [`TxStateVisitor`].
    pub fn accept(&self, visitor: &mut dyn TxStateVisitor) {
        for (name, id) in &self.created_prop_key_tokens {
            visitor.visit_created_prop_key_token(name, *id);
        }
        for (name, id) in &self.created_label_tokens {
            visitor.visit_created_label_token(name, *id);
        }
        for (name, id) in &self.created_rel_type_tokens {
            visitor.visit_created_rel_type_token(name, *id);
        }

        for node in self.nodes.added_sorted() {
            visitor.visit_created_node(node);
        }
        for rel in self.relationships.added_sorted() {
            let data = self.created_rels[&rel];
            visitor.visit_created_relationship(rel, data);
        }

        let mut touched: Vec<NodeId> = self.node_states.keys().copied().collect();
        touched.sort();
        for node in touched {
            let state = &self.node_states[&node];
            if !state.labels.is_empty() {
                visitor.visit_node_label_changes(
                    node,
                    &state.labels.added_sorted(),
                    &state.labels.removed_sorted(),
                );
            }
            if !state.properties.is_empty() {
                visitor.visit_node_property_changes(node, &state.properties);
            }
        }

        let mut touched_rels: Vec<RelId> = self.rel_states.keys().copied().collect();
        touched_rels.sort();
        for rel in touched_rels {
            let diff = &self.rel_states[&rel];
            if !diff.is_empty() {
                visitor.visit_rel_property_changes(rel, diff);
            }
        }
        if !self.graph_state.is_empty() {
            visitor.visit_graph_property_changes(&self.graph_state);
        }

        for rel in self.relationships.removed_sorted() {
            let data = self.deleted_rels[&rel];
            visitor.visit_deleted_relationship(rel, data);
        }
        for node in self.nodes.removed_sorted() {
            visitor.visit_deleted_node(node);
        }

        let mut added_indexes: Vec<&IndexDescriptor> = self
            .indexes
            .added()
            .chain(self.constraint_indexes.added())
            .collect();
        added_indexes.sort_by_key(|d| (d.label, d.property_key));
        for descriptor in added_indexes {
            visitor.visit_added_index(descriptor);
        }
        let mut removed_indexes: Vec<&IndexDescriptor> = self
            .indexes
            .removed()
            .chain(self.constraint_indexes.removed())
            .collect();
        removed_indexes.sort_by_key(|d| (d.label, d.property_key));
        for descriptor in removed_indexes {
            visitor.visit_removed_index(descriptor);
        }
        let mut added_constraints: Vec<&ConstraintDescriptor> =
            self.constraints.added().collect();
        added_constraints.sort_by_key(|c| (c.label, c.property_key));
        for constraint in added_constraints {
            visitor.visit_added_constraint(constraint);
        }
        let mut removed_constraints: Vec<&ConstraintDescriptor> =
            self.constraints.removed().collect();
        removed_constraints.sort_by_key(|c| (c.label, c.property_key));
        for constraint in removed_constraints {
            visitor.visit_removed_constraint(constraint);
        }
    }
}
