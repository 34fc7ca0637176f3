//! A transaction performs either data updates or schema updates, never
//! both; the first write fixes the kind.

use std::sync::Arc;

use tenebra::api::{EntityWrite, SchemaWrite, TokenWrite};
use tenebra::index::{MemoryIndexProvider, ProviderRegistry};
use tenebra::kernel::{Kernel, TransactionType};
use tenebra::log::MemoryLog;
use tenebra::store::MemoryStore;
use tenebra::{KernelConfig, KernelError, Result};

fn kernel() -> Kernel {
    Kernel::new(
        MemoryStore::shared(),
        Arc::new(MemoryLog::new()),
        ProviderRegistry::new(Arc::new(MemoryIndexProvider::new())),
        KernelConfig::interactive(),
    )
}

#[test]
fn schema_write_after_data_write_is_rejected() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Person")?;
    let key = stmt.property_key_get_or_create_for_name("name")?;
    stmt.node_create()?;
    assert_eq!(tx.transaction_type(), TransactionType::Data);

    let err = stmt.index_create(label, key).unwrap_err();
    assert!(matches!(
        err,
        KernelError::InvalidTransactionType {
            attempted: "schema",
            performed: "data",
        }
    ));
    // The rejection does not poison the transaction.
    stmt.node_create()?;
    stmt.close();
    tx.commit()?;
    Ok(())
}

#[test]
fn data_write_after_schema_write_is_rejected() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Person")?;
    let key = stmt.property_key_get_or_create_for_name("name")?;
    stmt.index_create(label, key)?;
    assert_eq!(tx.transaction_type(), TransactionType::Schema);

    let err = stmt.node_create().unwrap_err();
    assert!(matches!(
        err,
        KernelError::InvalidTransactionType {
            attempted: "data",
            performed: "schema",
        }
    ));
    assert_eq!(
        err.to_string(),
        "cannot perform data updates in a transaction that has performed schema updates"
    );
    stmt.close();
    tx.commit()?;
    Ok(())
}

#[test]
fn token_creation_does_not_fix_the_kind() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let label = stmt.label_get_or_create_for_name("Thing")?;
    let key = stmt.property_key_get_or_create_for_name("value")?;
    assert_eq!(tx.transaction_type(), TransactionType::Any);
    // A token-only transaction can still go either way.
    stmt.index_create(label, key)?;
    assert_eq!(tx.transaction_type(), TransactionType::Schema);
    stmt.close();
    tx.commit()?;
    Ok(())
}
