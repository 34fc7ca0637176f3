//! Recovery replays the command log into a fresh store and leaves every id
//! high-water mark past the replayed ids, so post-recovery allocations
//! never collide with recovered entities.

use std::fs;
use std::sync::{Arc, Once};

use tenebra::api::{EntityRead, EntityWrite, TokenWrite};
use tenebra::index::{NullIndexProvider, ProviderRegistry};
use tenebra::kernel::Kernel;
use tenebra::log::MemoryLog;
use tenebra::store::{recover, MemoryStore, StorageEngine};
use tenebra::{KernelConfig, NodeId, PropertyValue, Result};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tenebra=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn kernel_over(store: Arc<dyn StorageEngine>, log: Arc<MemoryLog>) -> Kernel {
    init_tracing();
    Kernel::new(
        store,
        log,
        ProviderRegistry::new(Arc::new(NullIndexProvider)),
        KernelConfig::interactive(),
    )
}

#[test]
fn replayed_store_matches_the_original_and_continues_its_id_sequence() -> Result<()> {
    let original = MemoryStore::shared();
    let log = Arc::new(MemoryLog::new());
    let kernel = kernel_over(original.clone(), log.clone());

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Doc")?;
    let key = stmt.property_key_get_or_create_for_name("title")?;
    let keep = stmt.node_create()?;
    let doomed = stmt.node_create()?;
    stmt.node_add_label(keep, label)?;
    stmt.node_set_property(keep, key, PropertyValue::from("kept"))?;
    stmt.close();
    tx.commit()?;

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_delete(doomed)?;
    stmt.close();
    tx.commit()?;

    let recovered = MemoryStore::shared();
    let applied = recover(recovered.as_ref(), &log.bytes())?;
    assert_eq!(applied, vec![1, 2]);

    assert_eq!(recovered.load_node(keep), original.load_node(keep));
    assert!(recovered.load_node(doomed).is_none());
    assert_eq!(recovered.node_labels(keep), vec![label]);
    assert_eq!(recovered.label_by_name("Doc"), Some(label));
    assert_eq!(
        recovered.load_property(tenebra::record::PropertyOwner::Node(keep), key),
        Some(PropertyValue::from("kept"))
    );

    // Both stores hand out the same next id, past everything replayed.
    assert_eq!(recovered.allocate_node_id(), original.allocate_node_id());
    Ok(())
}

#[test]
fn a_kernel_over_a_recovered_store_allocates_fresh_ids() -> Result<()> {
    let original = MemoryStore::shared();
    let log = Arc::new(MemoryLog::new());
    let kernel = kernel_over(original.clone(), log.clone());

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let mut created = Vec::new();
    for _ in 0..5 {
        created.push(stmt.node_create()?);
    }
    stmt.close();
    tx.commit()?;

    let recovered = MemoryStore::shared();
    recover(recovered.as_ref(), &log.bytes())?;

    let kernel = kernel_over(recovered.clone(), Arc::new(MemoryLog::new()));
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let fresh = stmt.node_create()?;
    assert!(created.iter().all(|&n| n != fresh));
    assert_eq!(fresh, NodeId(created.last().unwrap().0 + 1));
    for &node in &created {
        assert!(stmt.node_exists(node)?);
    }
    stmt.close();
    tx.commit()?;
    Ok(())
}

#[test]
fn a_log_persisted_to_disk_recovers_after_restart() -> Result<()> {
    let original = MemoryStore::shared();
    let log = Arc::new(MemoryLog::new());
    let kernel = kernel_over(original.clone(), log.clone());

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Archived")?;
    let key = stmt.property_key_get_or_create_for_name("path")?;
    let node = stmt.node_create()?;
    stmt.node_add_label(node, label)?;
    stmt.node_set_property(node, key, PropertyValue::from("/var/data/a"))?;
    stmt.close();
    tx.commit()?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("commands.log");
    fs::write(&path, log.bytes())?;

    // A restart sees only what made it to disk.
    let bytes = fs::read(&path)?;
    let recovered = MemoryStore::shared();
    let applied = recover(recovered.as_ref(), &bytes)?;
    assert_eq!(applied, vec![1]);
    assert_eq!(recovered.load_node(node), original.load_node(node));
    assert_eq!(recovered.node_labels(node), vec![label]);
    assert_eq!(
        recovered.load_property(tenebra::record::PropertyOwner::Node(node), key),
        Some(PropertyValue::from("/var/data/a"))
    );
    Ok(())
}

#[test]
fn a_torn_log_tail_drops_only_the_trailing_transaction() -> Result<()> {
    let original = MemoryStore::shared();
    let log = Arc::new(MemoryLog::new());
    let kernel = kernel_over(original, log.clone());

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let first = stmt.node_create()?;
    stmt.close();
    tx.commit()?;
    let intact_len = log.len();

    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let second = stmt.node_create()?;
    stmt.close();
    tx.commit()?;

    let mut bytes = log.bytes();
    bytes.truncate(intact_len + (bytes.len() - intact_len) / 2);

    let recovered = MemoryStore::shared();
    let applied = recover(recovered.as_ref(), &bytes)?;
    assert_eq!(applied, vec![1]);
    assert!(recovered.load_node(first).is_some());
    assert!(recovered.load_node(second).is_none());
    Ok(())
}
