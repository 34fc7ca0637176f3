//! End-to-end commit and rollback behaviour through the public statement
//! surface.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tenebra::api::{EntityRead, EntityWrite, TokenRead, TokenWrite};
use tenebra::index::{MemoryIndexProvider, ProviderRegistry};
use tenebra::kernel::Kernel;
use tenebra::log::MemoryLog;
use tenebra::store::MemoryStore;
use tenebra::{KernelConfig, KernelError, LabelId, NodeId, PropertyValue, Result};

fn kernel() -> (Kernel, Arc<MemoryLog>) {
    let log = Arc::new(MemoryLog::new());
    let kernel = Kernel::new(
        MemoryStore::shared(),
        log.clone(),
        ProviderRegistry::new(Arc::new(MemoryIndexProvider::new())),
        KernelConfig::interactive(),
    );
    (kernel, log)
}

#[test]
fn committed_writes_are_visible_to_later_transactions() -> Result<()> {
    let (kernel, log) = kernel();

    let tx = kernel.begin_tx();
    let (node, rel, person, name, knows) = {
        let stmt = tx.acquire_statement()?;
        let person = stmt.label_get_or_create_for_name("Person")?;
        let name = stmt.property_key_get_or_create_for_name("name")?;
        let knows = stmt.relationship_type_get_or_create_for_name("KNOWS")?;
        let node = stmt.node_create()?;
        let other = stmt.node_create()?;
        assert!(stmt.node_add_label(node, person)?);
        assert_eq!(
            stmt.node_set_property(node, name, PropertyValue::from("ada"))?,
            None
        );
        let rel = stmt.relationship_create(knows, node, other)?;
        stmt.relationship_set_property(rel, name, PropertyValue::from("since 2020"))?;
        stmt.close();
        (node, rel, person, name, knows)
    };
    tx.commit()?;
    assert!(!log.is_empty());

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(stmt.node_exists(node)?);
    assert_eq!(stmt.label_get_for_name("Person")?, person);
    assert_eq!(stmt.label_get_name(person)?, "Person");
    assert_eq!(stmt.relationship_type_get_name(knows)?, "KNOWS");
    assert_eq!(stmt.node_get_labels(node)?, vec![person]);
    assert_eq!(
        stmt.node_get_property(node, name)?,
        Some(PropertyValue::from("ada"))
    );
    assert_eq!(stmt.nodes_get_for_label(person)?, vec![node]);
    assert_eq!(stmt.node_get_relationships(node)?, vec![rel]);
    assert_eq!(
        stmt.relationship_get_property(rel, name)?,
        Some(PropertyValue::from("since 2020"))
    );
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn rollback_discards_the_overlay() -> Result<()> {
    let (kernel, _log) = kernel();

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let key = stmt.property_key_get_or_create_for_name("mood")?;
    let node = stmt.node_create()?;
    stmt.node_set_property(node, key, PropertyValue::from("calm"))?;
    stmt.close();
    tx.commit()?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_set_property(node, key, PropertyValue::from("stormy"))?;
    assert_eq!(
        stmt.node_get_property(node, key)?,
        Some(PropertyValue::from("stormy"))
    );
    stmt.close();
    tx.rollback()?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert_eq!(
        stmt.node_get_property(node, key)?,
        Some(PropertyValue::from("calm"))
    );
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn commit_with_no_changes_writes_nothing() -> Result<()> {
    let (kernel, log) = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert_eq!(stmt.label_get_for_name("Missing")?.0, u32::MAX);
    stmt.close();
    tx.commit()?;
    assert!(log.is_empty());
    Ok(())
}

#[test]
fn net_cancelled_operations_commit_as_no_changes() -> Result<()> {
    let (kernel, log) = kernel();

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    stmt.node_delete(node)?;
    stmt.close();
    tx.commit()?;

    assert!(log.is_empty());
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(!stmt.node_exists(node)?);
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn deleted_node_is_invisible_within_the_deleting_transaction() -> Result<()> {
    let (kernel, _log) = kernel();

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Doomed")?;
    let node = stmt.node_create()?;
    stmt.node_add_label(node, label)?;
    stmt.close();
    tx.commit()?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_delete(node)?;
    assert!(!stmt.node_exists(node)?);
    assert!(stmt.nodes_get_for_label(label)?.is_empty());
    let err = stmt.node_get_labels(node).unwrap_err();
    assert!(matches!(err, KernelError::NotFound { kind: "node", .. }));
    stmt.close();
    tx.commit()?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(!stmt.node_exists(node)?);
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn transaction_timeout_terminates_pending_work() -> Result<()> {
    use std::thread;
    use std::time::Duration;
    use tenebra::error::TerminationReason;

    let config = KernelConfig {
        transaction_timeout_ms: Some(10),
        ..KernelConfig::interactive()
    };
    let log = Arc::new(MemoryLog::new());
    let kernel = Kernel::new(
        MemoryStore::shared(),
        log.clone(),
        ProviderRegistry::new(Arc::new(MemoryIndexProvider::new())),
        config,
    );

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_create()?;
    stmt.close();

    thread::sleep(Duration::from_millis(20));

    // Past the deadline the transaction is flagged as timed out: no new
    // statements, and the pending changes never commit.
    assert!(matches!(
        tx.acquire_statement().unwrap_err(),
        KernelError::TransactionTerminated(TerminationReason::Timeout)
    ));
    assert_eq!(tx.termination_reason(), Some(TerminationReason::Timeout));
    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        KernelError::TransactionTerminated(TerminationReason::Timeout)
    ));
    assert!(!tx.is_open());
    assert!(log.is_empty());
    Ok(())
}

#[test]
fn terminated_transaction_refuses_further_work_and_reports_why() -> Result<()> {
    use tenebra::error::TerminationReason;

    let (kernel, log) = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    assert!(tx.active_lock_count() >= 1);
    assert!(!tx.is_closing());
    stmt.close();

    let handle = tx.termination_handle();
    assert!(handle.mark_for_termination(TerminationReason::Terminated));
    assert_eq!(tx.termination_reason(), Some(TerminationReason::Terminated));

    // No new statements, and the pending changes never commit.
    assert!(matches!(
        tx.acquire_statement().unwrap_err(),
        KernelError::TransactionTerminated(TerminationReason::Terminated)
    ));
    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        KernelError::TransactionTerminated(TerminationReason::Terminated)
    ));
    assert!(!tx.is_open());
    assert_eq!(tx.active_lock_count(), 0);
    assert!(log.is_empty());
    assert!(!handle.mark_for_termination(TerminationReason::Shutdown));

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(!stmt.node_exists(node)?);
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn commit_after_commit_is_rejected() -> Result<()> {
    let (kernel, _log) = kernel();
    let tx = kernel.begin_tx();
    tx.commit()?;
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, KernelError::InvalidState(_)));
    assert!(!tx.is_open());
    Ok(())
}

/// Runs a seeded stream of random label and property updates across many
/// transactions, some committed and some rolled back, and checks the final
/// committed state against a plain in-test model.
#[test]
fn randomized_workload_matches_a_model() -> Result<()> {
    type Model = BTreeMap<NodeId, (BTreeSet<LabelId>, Option<i64>)>;

    fn pick(rng: &mut ChaCha8Rng, model: &Model) -> NodeId {
        let nodes: Vec<NodeId> = model.keys().copied().collect();
        nodes[rng.gen_range(0..nodes.len())]
    }

    let (kernel, _log) = kernel();

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let labels: Vec<LabelId> = (0..4)
        .map(|i| stmt.label_get_or_create_for_name(&format!("L{i}")))
        .collect::<Result<_>>()?;
    let score = stmt.property_key_get_or_create_for_name("score")?;
    stmt.close();
    tx.commit()?;

    let mut rng = ChaCha8Rng::seed_from_u64(0x7E4E_B2A1);
    let mut model = Model::new();

    for _ in 0..40 {
        let tx = kernel.begin_tx();
        let stmt = tx.acquire_statement()?;
        let mut staged = model.clone();
        for _ in 0..8 {
            match rng.gen_range(0..5) {
                0 => {
                    let node = stmt.node_create()?;
                    staged.insert(node, (BTreeSet::new(), None));
                }
                1 if !staged.is_empty() => {
                    let node = pick(&mut rng, &staged);
                    let label = labels[rng.gen_range(0..labels.len())];
                    stmt.node_add_label(node, label)?;
                    staged.get_mut(&node).unwrap().0.insert(label);
                }
                2 if !staged.is_empty() => {
                    let node = pick(&mut rng, &staged);
                    let label = labels[rng.gen_range(0..labels.len())];
                    stmt.node_remove_label(node, label)?;
                    staged.get_mut(&node).unwrap().0.remove(&label);
                }
                3 if !staged.is_empty() => {
                    let node = pick(&mut rng, &staged);
                    let value = rng.gen_range(-1_000..1_000);
                    stmt.node_set_property(node, score, PropertyValue::Int(value))?;
                    staged.get_mut(&node).unwrap().1 = Some(value);
                }
                4 if !staged.is_empty() => {
                    let node = pick(&mut rng, &staged);
                    stmt.node_remove_property(node, score)?;
                    staged.get_mut(&node).unwrap().1 = None;
                }
                _ => {}
            }
        }
        stmt.close();
        if rng.gen_bool(0.75) {
            tx.commit()?;
            model = staged;
        } else {
            tx.rollback()?;
        }
    }

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    for (&node, (node_labels, value)) in &model {
        assert_eq!(
            stmt.node_get_labels(node)?,
            node_labels.iter().copied().collect::<Vec<_>>()
        );
        assert_eq!(
            stmt.node_get_property(node, score)?,
            value.map(PropertyValue::Int)
        );
    }
    for &label in &labels {
        let expected: Vec<NodeId> = model
            .iter()
            .filter(|(_, (ls, _))| ls.contains(&label))
            .map(|(&n, _)| n)
            .collect();
        let mut scanned = stmt.nodes_get_for_label(label)?;
        scanned.sort();
        assert_eq!(scanned, expected);
    }
    stmt.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn lookups_by_none_sentinel_are_empty_not_errors() -> Result<()> {
    let (kernel, _log) = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    assert!(stmt.node_get_labels(NodeId::NONE)?.is_empty());
    assert!(!stmt.node_exists(NodeId::NONE)?);
    let unknown = tenebra::LabelId(7777);
    assert!(stmt.label_get_name(unknown).is_err());
    assert_eq!(stmt.label_get_name_or_placeholder(unknown), "[7777]");
    stmt.close();
    tx.rollback()?;
    Ok(())
}
