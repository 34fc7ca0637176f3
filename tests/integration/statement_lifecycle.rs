//! Statement reference counting and resource cleanup.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tenebra::api::TokenRead;
use tenebra::index::{NullIndexProvider, ProviderRegistry};
use tenebra::kernel::{CloseableResource, Kernel};
use tenebra::log::MemoryLog;
use tenebra::store::MemoryStore;
use tenebra::{KernelConfig, KernelError, Result};

fn kernel() -> Kernel {
    Kernel::new(
        MemoryStore::shared(),
        Arc::new(MemoryLog::new()),
        ProviderRegistry::new(Arc::new(NullIndexProvider)),
        KernelConfig::interactive(),
    )
}

struct CountingResource {
    closed: Arc<AtomicU32>,
}

impl CloseableResource for CountingResource {
    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn repeated_acquires_return_the_same_statement() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let first = tx.acquire_statement()?;
    let second = tx.acquire_statement()?;
    assert!(Arc::ptr_eq(&first, &second));
    first.close();
    second.close();
    tx.rollback()?;
    Ok(())
}

#[test]
fn statement_stays_usable_until_the_last_reference_closes() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    tx.acquire_statement()?;
    tx.acquire_statement()?;

    stmt.close();
    stmt.close();
    assert!(stmt.is_open());
    assert_eq!(stmt.label_get_for_name("Anything")?.0, u32::MAX);

    stmt.close();
    assert!(!stmt.is_open());
    let err = stmt.label_get_for_name("Anything").unwrap_err();
    assert!(matches!(err, KernelError::InvalidState(_)));
    tx.rollback()?;
    Ok(())
}

#[test]
fn extra_close_calls_are_tolerated() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    stmt.close();
    stmt.close();
    stmt.close();
    assert!(!stmt.is_open());
    tx.rollback()?;
    Ok(())
}

#[test]
fn registered_resources_close_exactly_once() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    tx.acquire_statement()?;

    let closed = Arc::new(AtomicU32::new(0));
    stmt.register_closeable_resource(Box::new(CountingResource {
        closed: closed.clone(),
    }))?;

    stmt.close();
    assert_eq!(closed.load(Ordering::SeqCst), 0, "one reference remains");
    stmt.close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    stmt.close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    tx.rollback()?;
    Ok(())
}

#[test]
fn closing_the_transaction_force_closes_the_statement() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    let stmt = tx.acquire_statement()?;
    let closed = Arc::new(AtomicU32::new(0));
    stmt.register_closeable_resource(Box::new(CountingResource {
        closed: closed.clone(),
    }))?;

    tx.commit()?;
    assert!(!stmt.is_open());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(stmt.label_get_for_name("Anything").is_err());
    Ok(())
}

#[test]
fn no_statement_on_a_closed_transaction() -> Result<()> {
    let kernel = kernel();
    let tx = kernel.begin_tx();
    tx.rollback()?;
    let err = tx.acquire_statement().unwrap_err();
    assert!(matches!(err, KernelError::InvalidState(_)));
    Ok(())
}
