//! The pre-commit integrity gate.
//!
//! Runs after the overlay is final and before anything becomes durable.
//! Any violation aborts the commit; the transaction rolls back and storage
//! stays exactly as it was.

use crate::error::{KernelError, Result};
use crate::index::{IndexDescriptor, InternalIndexState, SchemaRule};

use super::transaction::TransactionInner;

pub(crate) fn validate(inner: &TransactionInner) -> Result<()> {
    check_failed_backing_indexes(inner)?;
    check_deleted_nodes_have_no_relationships(inner)?;
    check_constraints_known_at_start(inner)?;
    Ok(())
}

/// A uniqueness constraint must not go in over a backing index that failed
/// validation.
fn check_failed_backing_indexes(inner: &TransactionInner) -> Result<()> {
    let provider = inner.providers.provider();
    for constraint in inner.tx_state.constraint_changes().added() {
        let backing = IndexDescriptor {
            label: constraint.label,
            property_key: constraint.property_key,
            unique: true,
        };
        let committed_rule = inner.store.schema_rules().into_iter().find(|rule| {
            rule.rule.is_index()
                && rule.rule.schema() == (backing.label, backing.property_key)
                && matches!(rule.rule, SchemaRule::ConstraintIndex { .. })
        });
        if let Some(rule) = committed_rule {
            if provider.initial_state(rule.id) == InternalIndexState::Failed {
                return Err(KernelError::IntegrityViolation(format!(
                    "backing index for uniqueness constraint on (label {}, key {}) has failed validation",
                    backing.label, backing.property_key
                )));
            }
        }
    }
    Ok(())
}

/// Deleting a node with relationships still attached is forbidden; it must
/// fail, not cascade. Relationships deleted by this same transaction no
/// longer count, relationships it created do.
fn check_deleted_nodes_have_no_relationships(inner: &TransactionInner) -> Result<()> {
    for node in inner.tx_state.added_and_removed_nodes().removed_sorted() {
        let committed = inner.store.relationships_of(node);
        let mut remaining = inner
            .tx_state
            .augment_relationships(node, committed.into_iter());
        if let Some(rel) = remaining.next() {
            return Err(KernelError::IntegrityViolation(format!(
                "node {node} cannot be deleted because relationship {rel} is still attached"
            )));
        }
    }
    Ok(())
}

/// A transaction started before a constraint was introduced must not commit
/// writes that constraint governs; it was built against stale schema
/// knowledge.
fn check_constraints_known_at_start(inner: &TransactionInner) -> Result<()> {
    if inner.store.constraint_epoch() == inner.constraint_epoch_at_start {
        return Ok(());
    }
    let constraints: Vec<_> = inner
        .store
        .schema_rules()
        .into_iter()
        .filter_map(|rule| match rule.rule {
            SchemaRule::UniquenessConstraint {
                label,
                property_key,
                ..
            } => Some((label, property_key)),
            _ => None,
        })
        .collect();
    if constraints.is_empty() {
        return Ok(());
    }
    for node in inner.tx_state.touched_nodes() {
        let labels = inner
            .tx_state
            .augment_labels(node, inner.store.node_labels(node));
        for (label, key) in &constraints {
            if !labels.contains(label) {
                continue;
            }
            let wrote_value = inner
                .tx_state
                .node_property_diff(node)
                .and_then(|diff| diff.overlay(*key))
                .is_some_and(|v| v.is_some());
            let gained_label = inner
                .tx_state
                .label_state(node)
                .is_some_and(|diff| diff.is_added(label));
            let has_value = wrote_value
                || inner
                    .store
                    .load_property(crate::record::PropertyOwner::Node(node), *key)
                    .is_some();
            if wrote_value || (gained_label && has_value) {
                return Err(KernelError::IntegrityViolation(format!(
                    "uniqueness constraint on (label {label}, key {key}) was created after this transaction started"
                )));
            }
        }
    }
    Ok(())
}
