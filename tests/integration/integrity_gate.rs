//! The pre-commit integrity gate: violations reject the commit before
//! anything becomes durable, and the transaction still ends closed with
//! its locks released.

use std::sync::Arc;

use tenebra::api::{EntityWrite, SchemaWrite, TokenWrite};
use tenebra::index::{MemoryIndexProvider, ProviderRegistry};
use tenebra::kernel::Kernel;
use tenebra::log::MemoryLog;
use tenebra::store::MemoryStore;
use tenebra::{KernelConfig, KernelError, NodeId, PropertyValue, RelId, Result};

struct Fixture {
    kernel: Kernel,
    log: Arc<MemoryLog>,
}

fn fixture() -> Fixture {
    let log = Arc::new(MemoryLog::new());
    let kernel = Kernel::new(
        MemoryStore::shared(),
        log.clone(),
        ProviderRegistry::new(Arc::new(MemoryIndexProvider::new())),
        KernelConfig::interactive(),
    );
    Fixture { kernel, log }
}

fn connected_pair(f: &Fixture) -> Result<(NodeId, NodeId, RelId)> {
    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let knows = stmt.relationship_type_get_or_create_for_name("KNOWS")?;
    let a = stmt.node_create()?;
    let b = stmt.node_create()?;
    let rel = stmt.relationship_create(knows, a, b)?;
    stmt.close();
    tx.commit()?;
    Ok((a, b, rel))
}

#[test]
fn deleting_a_node_with_relationships_rejects_the_commit() -> Result<()> {
    let f = fixture();
    let (a, _, rel) = connected_pair(&f)?;
    let log_before = f.log.len();

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_delete(a)?;
    stmt.close();
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, KernelError::IntegrityViolation(_)));
    assert!(err.is_transaction_fatal());

    // Nothing became durable and the transaction is finished.
    assert_eq!(f.log.len(), log_before);
    assert!(f.kernel.store().load_node(a).is_some());
    assert!(f.kernel.store().load_relationship(rel).is_some());
    assert!(!tx.is_open());
    Ok(())
}

#[test]
fn failed_commit_releases_its_locks() -> Result<()> {
    let f = fixture();
    let (a, _, _) = connected_pair(&f)?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_delete(a)?;
    stmt.close();
    assert!(tx.commit().is_err());

    // A follow-up transaction can lock the same node without waiting.
    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let key = stmt.property_key_get_or_create_for_name("touched")?;
    stmt.node_set_property(a, key, PropertyValue::Bool(true))?;
    stmt.close();
    tx.commit()?;
    Ok(())
}

#[test]
fn deleting_node_and_its_relationships_together_commits() -> Result<()> {
    let f = fixture();
    let (a, b, rel) = connected_pair(&f)?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.relationship_delete(rel)?;
    stmt.node_delete(a)?;
    stmt.close();
    tx.commit()?;

    assert!(f.kernel.store().load_node(a).is_none());
    assert!(f.kernel.store().load_node(b).is_some());
    assert!(f.kernel.store().load_relationship(rel).is_none());
    Ok(())
}

#[test]
fn duplicate_values_reject_a_new_uniqueness_constraint() -> Result<()> {
    let f = fixture();

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("User")?;
    let key = stmt.property_key_get_or_create_for_name("email")?;
    for _ in 0..2 {
        let node = stmt.node_create()?;
        stmt.node_add_label(node, label)?;
        stmt.node_set_property(node, key, PropertyValue::from("same@example.com"))?;
    }
    stmt.close();
    tx.commit()?;
    let log_before = f.log.len();

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.uniqueness_constraint_create(label, key)?;
    stmt.close();
    let err = tx.commit().unwrap_err();
    assert!(matches!(err, KernelError::IntegrityViolation(_)));

    // The rejected schema change left no trace.
    assert_eq!(f.log.len(), log_before);
    assert!(f.kernel.store().schema_rules().is_empty());
    Ok(())
}
