//! Label storage on node records: up to seven labels are stored inline;
//! the eighth spills every label into one dynamic record, and shrinking
//! back re-inlines them and retires the dynamic record.

use std::sync::Arc;

use tenebra::api::{EntityRead, EntityWrite, TokenWrite};
use tenebra::index::{NullIndexProvider, ProviderRegistry};
use tenebra::kernel::Kernel;
use tenebra::log::MemoryLog;
use tenebra::record::{LabelStorage, NODE_LABEL_INLINE_CAPACITY};
use tenebra::store::MemoryStore;
use tenebra::types::DynamicId;
use tenebra::{KernelConfig, LabelId, NodeId, Result};

fn kernel() -> Kernel {
    Kernel::new(
        MemoryStore::shared(),
        Arc::new(MemoryLog::new()),
        ProviderRegistry::new(Arc::new(NullIndexProvider)),
        KernelConfig::interactive(),
    )
}

fn node_with_labels(kernel: &Kernel, count: usize) -> Result<(NodeId, Vec<LabelId>)> {
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        let label = stmt.label_get_or_create_for_name(&format!("L{i}"))?;
        assert!(stmt.node_add_label(node, label)?);
        labels.push(label);
    }
    stmt.close();
    tx.commit()?;
    Ok((node, labels))
}

fn stored_labels(kernel: &Kernel, node: NodeId) -> LabelStorage {
    let record = kernel
        .store()
        .load_node(node)
        .unwrap_or_else(|| panic!("node {node} not in store"));
    record.labels
}

#[test]
fn seven_labels_stay_inline() -> Result<()> {
    let kernel = kernel();
    let (node, labels) = node_with_labels(&kernel, NODE_LABEL_INLINE_CAPACITY)?;
    match stored_labels(&kernel, node) {
        LabelStorage::Inline(inline) => {
            let mut stored: Vec<_> = inline.into_iter().collect();
            stored.sort_unstable();
            assert_eq!(stored, labels);
        }
        LabelStorage::Dynamic(id) => panic!("unexpected dynamic record {id}"),
    }
    Ok(())
}

#[test]
fn eighth_label_spills_all_labels_to_one_dynamic_record() -> Result<()> {
    let kernel = kernel();
    let (node, mut labels) = node_with_labels(&kernel, NODE_LABEL_INLINE_CAPACITY)?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let extra = stmt.label_get_or_create_for_name("Extra")?;
    stmt.node_add_label(node, extra)?;
    stmt.close();
    tx.commit()?;
    labels.push(extra);

    let LabelStorage::Dynamic(dynamic_id) = stored_labels(&kernel, node) else {
        panic!("expected dynamic label storage");
    };
    let record = kernel.store().load_dynamic(dynamic_id).unwrap();
    assert!(record.in_use);
    assert_eq!(record.owner, node);
    let mut stored = record.labels.clone();
    stored.sort_unstable();
    assert_eq!(stored, labels);

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let mut read = stmt.node_get_labels(node)?;
    read.sort_unstable();
    assert_eq!(read, labels);
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn shrinking_re_inlines_and_retires_the_dynamic_record() -> Result<()> {
    let kernel = kernel();
    let (node, labels) = node_with_labels(&kernel, NODE_LABEL_INLINE_CAPACITY + 1)?;
    let LabelStorage::Dynamic(dynamic_id) = stored_labels(&kernel, node) else {
        panic!("expected dynamic label storage");
    };

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(stmt.node_remove_label(node, labels[0])?);
    stmt.close();
    tx.commit()?;

    match stored_labels(&kernel, node) {
        LabelStorage::Inline(inline) => {
            assert_eq!(inline.len(), NODE_LABEL_INLINE_CAPACITY);
        }
        LabelStorage::Dynamic(id) => panic!("still dynamic in {id}"),
    }
    assert!(kernel.store().load_dynamic(dynamic_id).is_none());
    Ok(())
}

#[test]
fn remove_and_add_in_one_transaction_keeps_the_dynamic_record() -> Result<()> {
    let kernel = kernel();
    let (node, labels) = node_with_labels(&kernel, NODE_LABEL_INLINE_CAPACITY + 1)?;
    let LabelStorage::Dynamic(dynamic_id) = stored_labels(&kernel, node) else {
        panic!("expected dynamic label storage");
    };

    // Net label count stays above the inline capacity, so the existing
    // dynamic record is rewritten in place rather than reallocated.
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let replacement = stmt.label_get_or_create_for_name("Replacement")?;
    stmt.node_remove_label(node, labels[0])?;
    stmt.node_add_label(node, replacement)?;
    stmt.close();
    tx.commit()?;

    assert_eq!(
        stored_labels(&kernel, node),
        LabelStorage::Dynamic(dynamic_id)
    );
    let record = kernel.store().load_dynamic(dynamic_id).unwrap();
    assert_eq!(record.labels.len(), NODE_LABEL_INLINE_CAPACITY + 1);
    assert!(record.labels.contains(&replacement));
    assert!(!record.labels.contains(&labels[0]));
    Ok(())
}

#[test]
fn dynamic_id_allocation_is_not_burned_by_inline_updates() -> Result<()> {
    let kernel = kernel();
    let (node, _) = node_with_labels(&kernel, 3)?;
    let before = kernel.store().load_node(node).unwrap();
    assert!(matches!(before.labels, LabelStorage::Inline(_)));
    // No dynamic record exists anywhere yet.
    assert!(kernel.store().load_dynamic(DynamicId(0)).is_none());
    Ok(())
}
