//! Index maintenance at commit: population of new indexes from committed
//! data, and the add/change/remove updates fed to online indexes.

use std::sync::Arc;

use tenebra::api::{EntityWrite, SchemaRead, SchemaWrite, TokenWrite};
use tenebra::index::updates::{self, PropertyUpdate};
use tenebra::index::{
    IndexProvider, InternalIndexState, MemoryIndexProvider, ProviderRegistry,
};
use tenebra::kernel::Kernel;
use tenebra::log::{self, MemoryLog};
use tenebra::store::MemoryStore;
use tenebra::types::RuleId;
use tenebra::{KernelConfig, LabelId, NodeId, PropKeyId, PropertyValue, Result};

struct Fixture {
    kernel: Kernel,
    provider: Arc<MemoryIndexProvider>,
    log: Arc<MemoryLog>,
}

fn fixture() -> Fixture {
    let provider = Arc::new(MemoryIndexProvider::new());
    let log = Arc::new(MemoryLog::new());
    let kernel = Kernel::new(
        MemoryStore::shared(),
        log.clone(),
        ProviderRegistry::new(provider.clone()),
        KernelConfig::interactive(),
    );
    Fixture {
        kernel,
        provider,
        log,
    }
}

fn tokens(kernel: &Kernel) -> Result<(LabelId, PropKeyId)> {
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Person")?;
    let key = stmt.property_key_get_or_create_for_name("name")?;
    stmt.close();
    tx.commit()?;
    Ok((label, key))
}

fn labeled_node(kernel: &Kernel, label: LabelId, key: PropKeyId, value: &str) -> Result<NodeId> {
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    stmt.node_add_label(node, label)?;
    stmt.node_set_property(node, key, PropertyValue::from(value))?;
    stmt.close();
    tx.commit()?;
    Ok(node)
}

fn index_rule(kernel: &Kernel) -> RuleId {
    kernel
        .store()
        .schema_rules()
        .into_iter()
        .find(|rule| rule.rule.is_index())
        .map(|rule| rule.id)
        .unwrap()
}

#[test]
fn new_index_is_populated_from_committed_data() -> Result<()> {
    let f = fixture();
    let (label, key) = tokens(&f.kernel)?;
    let ada = labeled_node(&f.kernel, label, key, "ada")?;
    let bob = labeled_node(&f.kernel, label, key, "bob")?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let descriptor = stmt.index_create(label, key)?;
    assert_eq!(
        stmt.index_get_state(&descriptor)?,
        InternalIndexState::Populating
    );
    stmt.close();
    tx.commit()?;

    let rule = index_rule(&f.kernel);
    assert_eq!(f.provider.initial_state(rule), InternalIndexState::Online);
    let reader = f.provider.reader(rule)?;
    assert_eq!(reader.seek(&PropertyValue::from("ada")), ada);
    assert_eq!(reader.seek(&PropertyValue::from("bob")), bob);
    assert_eq!(reader.seek(&PropertyValue::from("eve")), NodeId::NONE);
    Ok(())
}

#[test]
fn online_index_tracks_add_change_and_remove() -> Result<()> {
    let f = fixture();
    let (label, key) = tokens(&f.kernel)?;
    let ada = labeled_node(&f.kernel, label, key, "ada")?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.index_create(label, key)?;
    stmt.close();
    tx.commit()?;
    let rule = index_rule(&f.kernel);

    // Add: a new labeled node with the property.
    let bob = labeled_node(&f.kernel, label, key, "bob")?;
    let reader = f.provider.reader(rule)?;
    assert_eq!(reader.seek(&PropertyValue::from("bob")), bob);

    // Change: the old entry moves to the new value.
    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_set_property(ada, key, PropertyValue::from("augusta"))?;
    stmt.close();
    tx.commit()?;
    let reader = f.provider.reader(rule)?;
    assert_eq!(reader.seek(&PropertyValue::from("ada")), NodeId::NONE);
    assert_eq!(reader.seek(&PropertyValue::from("augusta")), ada);

    // Remove: the entry disappears.
    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_remove_property(ada, key)?;
    stmt.close();
    tx.commit()?;
    let reader = f.provider.reader(rule)?;
    assert_eq!(reader.seek(&PropertyValue::from("augusta")), NodeId::NONE);
    Ok(())
}

#[test]
fn committed_commands_yield_the_expected_update_stream() -> Result<()> {
    let f = fixture();
    let (label, key) = tokens(&f.kernel)?;
    let node = labeled_node(&f.kernel, label, key, "first")?;
    let log_before = f.log.len();

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.node_set_property(node, key, PropertyValue::from("second"))?;
    stmt.close();
    tx.commit()?;

    let bytes = f.log.bytes();
    let entries = log::replay(&bytes[log_before..])?;
    assert_eq!(entries.len(), 1);
    let store = f.kernel.store().clone();
    let extracted = updates::extract(&entries[0].commands, |n| store.node_labels(n))?;
    assert_eq!(
        extracted,
        vec![PropertyUpdate::Change {
            node,
            key,
            value_before: PropertyValue::from("first"),
            value_after: PropertyValue::from("second"),
            labels: vec![label],
        }]
    );
    Ok(())
}

#[test]
fn node_created_and_deleted_in_one_transaction_emits_no_updates() -> Result<()> {
    let f = fixture();
    let (label, key) = tokens(&f.kernel)?;
    let log_before = f.log.len();

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    stmt.node_add_label(node, label)?;
    stmt.node_set_property(node, key, PropertyValue::from("ghost"))?;
    stmt.node_delete(node)?;
    stmt.close();
    tx.commit()?;

    assert_eq!(f.log.len(), log_before, "nothing net to log");
    Ok(())
}

#[test]
fn updates_skip_indexes_on_other_labels() -> Result<()> {
    let f = fixture();
    let (label, key) = tokens(&f.kernel)?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let other = stmt.label_get_or_create_for_name("Animal")?;
    stmt.close();
    tx.commit()?;

    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.index_create(label, key)?;
    stmt.close();
    tx.commit()?;
    let rule = index_rule(&f.kernel);

    // A node without the indexed label never reaches the index.
    let tx = f.kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let node = stmt.node_create()?;
    stmt.node_add_label(node, other)?;
    stmt.node_set_property(node, key, PropertyValue::from("rex"))?;
    stmt.close();
    tx.commit()?;

    let reader = f.provider.reader(rule)?;
    assert_eq!(reader.seek(&PropertyValue::from("rex")), NodeId::NONE);
    Ok(())
}
