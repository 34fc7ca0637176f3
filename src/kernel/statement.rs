//! The per-transaction statement handle.
//!
//! Exactly one statement object exists per transaction at a time; nested
//! acquisitions bump a reference count instead of constructing a new one.
//! The statement closes when the count reaches zero, at which point every
//! registered resource is closed too. `close` after closed is tolerated;
//! any operation after closed is not.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KernelError, Result};

use super::transaction::{Lifecycle, TransactionInner};

/// A resource tied to a statement's lifetime (index readers, open
/// iterators). `close` must be idempotent: normal exhaustion may have closed
/// the resource before teardown gets to it.
pub trait CloseableResource: Send {
    /// Releases the resource.
    fn close(&mut self);
}

/// Reference-counted handle onto one transaction's capability set.
pub struct KernelStatement {
    pub(crate) tx: Arc<Mutex<TransactionInner>>,
    refcount: AtomicU32,
    resources: Mutex<Vec<Box<dyn CloseableResource>>>,
}

impl std::fmt::Debug for KernelStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelStatement")
            .field("refcount", &self.refcount)
            .finish_non_exhaustive()
    }
}

impl KernelStatement {
    pub(crate) fn new(tx: Arc<Mutex<TransactionInner>>) -> Self {
        Self {
            tx,
            refcount: AtomicU32::new(0),
            resources: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn acquire_ref(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether the statement still has outstanding references.
    pub fn is_open(&self) -> bool {
        self.refcount.load(Ordering::SeqCst) > 0
    }

    /// Releases one reference. The last release closes the statement and
    /// its registered resources; further calls are no-ops.
    pub fn close(&self) {
        let previous = self
            .refcount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current > 0).then(|| current - 1)
            });
        if previous == Ok(1) {
            self.close_resources();
        }
    }

    /// Closes regardless of outstanding references. Used when the owning
    /// transaction is closing and must not leave a dangling statement.
    pub fn force_close(&self) {
        let outstanding = self.refcount.swap(0, Ordering::SeqCst);
        if outstanding > 0 {
            if outstanding > 1 {
                tracing::warn!(
                    outstanding,
                    "statement force-closed with outstanding references"
                );
            }
            self.close_resources();
        }
    }

    /// Registers a resource to be closed at statement teardown.
    pub fn register_closeable_resource(&self, resource: Box<dyn CloseableResource>) -> Result<()> {
        self.assert_open()?;
        self.resources.lock().push(resource);
        Ok(())
    }

    /// Fails unless the statement is open, its transaction active and not
    /// terminated. Every operation calls this first.
    pub(crate) fn assert_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(KernelError::InvalidState("statement used after close"));
        }
        let inner = self.tx.lock();
        if inner.lifecycle != Lifecycle::Active {
            return Err(KernelError::InvalidState(
                "statement belongs to a transaction that is no longer open",
            ));
        }
        inner.termination.check()
    }

    fn close_resources(&self) {
        let mut resources = std::mem::take(&mut *self.resources.lock());
        for resource in &mut resources {
            resource.close();
        }
    }
}
