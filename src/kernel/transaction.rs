//! The kernel transaction state machine and its factory.
//!
//! Lifecycle: `Active` → `Closing` (commit or rollback in progress) →
//! `Closed`, terminal. Whatever commit or rollback does, the transaction
//! always ends fully closed with its statement force-closed, its overlay
//! discarded and every lock released; that cleanup runs on the error paths
//! too.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::api::SchemaStateCache;
use crate::config::KernelConfig;
use crate::error::{KernelError, Result, TerminationReason};
use crate::index::{IndexDescriptor, IndexProxy, ProviderRegistry, SchemaRule, updates};
use crate::index::InternalIndexState;
use crate::locking::{LockClient, LockManager, TerminationFlag};
use crate::log::CommandSink;
use crate::record::{Command, PropertyOwner};
use crate::state::TxState;
use crate::store::StorageEngine;

use super::integrity;
use super::record_state::TransactionRecordState;
use super::statement::KernelStatement;

/// The kind of updates a transaction has performed. `Any` can still become
/// either; `Data` and `Schema` are mutually exclusive for the transaction's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionType {
    /// No updates performed yet.
    #[default]
    Any,
    /// Entity and property updates.
    Data,
    /// Index, constraint and token-free schema updates.
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Closing,
    Closed,
}

pub(crate) struct TransactionInner {
    pub(crate) tx_id: u64,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) tx_type: TransactionType,
    pub(crate) tx_state: TxState,
    pub(crate) store: Arc<dyn StorageEngine>,
    pub(crate) sink: Arc<dyn CommandSink>,
    pub(crate) locks: LockClient,
    pub(crate) providers: ProviderRegistry,
    pub(crate) schema_state: Arc<SchemaStateCache>,
    pub(crate) config: KernelConfig,
    pub(crate) termination: TerminationFlag,
    pub(crate) constraint_epoch_at_start: u64,
    pub(crate) start_time: Instant,
}

impl TransactionInner {
    pub(crate) fn upgrade_to_data(&mut self) -> Result<()> {
        match self.tx_type {
            TransactionType::Any => {
                self.tx_type = TransactionType::Data;
                Ok(())
            }
            TransactionType::Data => Ok(()),
            TransactionType::Schema => Err(KernelError::InvalidTransactionType {
                attempted: "data",
                performed: "schema",
            }),
        }
    }

    pub(crate) fn upgrade_to_schema(&mut self) -> Result<()> {
        match self.tx_type {
            TransactionType::Any => {
                self.tx_type = TransactionType::Schema;
                Ok(())
            }
            TransactionType::Schema => Ok(()),
            TransactionType::Data => Err(KernelError::InvalidTransactionType {
                attempted: "schema",
                performed: "data",
            }),
        }
    }

    /// Flips the termination flag to `Timeout` once the configured deadline
    /// has passed. Callers follow up with `termination.check()`.
    pub(crate) fn check_deadline(&self) {
        if let Some(timeout_ms) = self.config.transaction_timeout_ms {
            if self.start_time.elapsed() >= Duration::from_millis(timeout_ms) {
                self.termination.terminate(TerminationReason::Timeout);
            }
        }
    }
}

/// One unit of work against the kernel.
///
/// Obtained from [`Kernel::begin_tx`], used through statements acquired with
/// [`KernelTransaction::acquire_statement`], and finished with exactly one
/// of [`KernelTransaction::commit`] or [`KernelTransaction::rollback`].
pub struct KernelTransaction {
    inner: Arc<Mutex<TransactionInner>>,
    statement: Mutex<Option<Arc<KernelStatement>>>,
    termination: TerminationFlag,
}

impl KernelTransaction {
    /// The transaction id, as it will appear in the log.
    pub fn id(&self) -> u64 {
        self.inner.lock().tx_id
    }

    /// Whether the transaction is still active.
    pub fn is_open(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Active
    }

    /// Whether a commit or rollback is currently in progress.
    pub fn is_closing(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Closing
    }

    /// The kind of updates performed so far.
    pub fn transaction_type(&self) -> TransactionType {
        self.inner.lock().tx_type
    }

    /// Why the transaction was marked for termination, if it was.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination.reason()
    }

    /// The number of lock holds the transaction currently has.
    pub fn active_lock_count(&self) -> usize {
        self.inner.lock().locks.active_lock_count()
    }

    /// The current statement, lazily constructed on first call; every call
    /// adds one reference that [`KernelStatement::close`] releases.
    pub fn acquire_statement(&self) -> Result<Arc<KernelStatement>> {
        {
            let inner = self.inner.lock();
            if inner.lifecycle != Lifecycle::Active {
                return Err(KernelError::InvalidState(
                    "statement acquired on a transaction that is not open",
                ));
            }
            inner.check_deadline();
            inner.termination.check()?;
        }
        let mut current = self.statement.lock();
        let statement = current
            .get_or_insert_with(|| Arc::new(KernelStatement::new(self.inner.clone())))
            .clone();
        statement.acquire_ref();
        Ok(statement)
    }

    /// Marks the transaction for termination. A blocked lock wait observes
    /// this and aborts. Returns `false` on an already-closed transaction.
    pub fn mark_for_termination(&self, reason: TerminationReason) -> bool {
        let inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Closed {
            return false;
        }
        inner.termination.terminate(reason);
        true
    }

    /// A handle other threads can use to terminate this transaction.
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            inner: Arc::downgrade(&self.inner),
            termination: self.termination.clone(),
        }
    }

    /// Commits the transaction. On any failure the transaction rolls back
    /// and still ends closed with all locks released.
    pub fn commit(&self) -> Result<()> {
        self.close_transaction(true)
    }

    /// Rolls the transaction back, discarding the overlay.
    pub fn rollback(&self) -> Result<()> {
        self.close_transaction(false)
    }

    fn close_transaction(&self, commit: bool) -> Result<()> {
        self.begin_close()?;
        let result = if commit {
            self.do_commit()
        } else {
            self.do_rollback()
        };

        // Guaranteed finalization: whatever happened above, the transaction
        // ends closed, with no overlay and no locks.
        let mut inner = self.inner.lock();
        inner.locks.release_all();
        inner.tx_state = TxState::new();
        inner.lifecycle = Lifecycle::Closed;
        if let Err(err) = &result {
            tracing::warn!(tx_id = inner.tx_id, error = %err, "transaction failed");
        }
        result
    }

    fn begin_close(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match inner.lifecycle {
                Lifecycle::Closed => {
                    return Err(KernelError::InvalidState("transaction already closed"))
                }
                Lifecycle::Closing => {
                    return Err(KernelError::InvalidState("transaction is already closing"))
                }
                Lifecycle::Active => inner.lifecycle = Lifecycle::Closing,
            }
        }
        if let Some(statement) = self.statement.lock().take() {
            statement.force_close();
        }
        Ok(())
    }

    fn do_commit(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.check_deadline();
        if let Some(reason) = inner.termination.reason() {
            return Err(KernelError::TransactionTerminated(reason));
        }
        if !inner.tx_state.has_changes() {
            tracing::debug!(tx_id = inner.tx_id, "commit with no changes");
            return Ok(());
        }

        integrity::validate(&inner)?;

        let mut record_state =
            TransactionRecordState::new(inner.store.clone(), inner.config.max_tx_commands);
        inner.tx_state.accept(&mut record_state);
        let commands = record_state.extract_commands()?;
        if commands.is_empty() {
            return Ok(());
        }

        // New indexes populate before anything becomes durable: a
        // constraint-backing index failing verification rejects the commit
        // as a whole. Schema transactions carry no data changes, so the
        // committed store the population reads is exactly what the index
        // will cover.
        self.populate_created_indexes(&inner, &commands)?;

        inner.sink.append(inner.tx_id, &commands)?;
        inner.store.apply(&commands)?;
        self.apply_index_updates(&inner, &commands)?;

        let schema_changed = commands
            .iter()
            .any(|c| matches!(c, Command::SchemaRule { .. }));
        if schema_changed {
            inner.schema_state.clear();
        }
        tracing::info!(
            tx_id = inner.tx_id,
            commands = commands.len(),
            "transaction committed"
        );
        Ok(())
    }

    fn do_rollback(&self) -> Result<()> {
        let inner = self.inner.lock();
        // The overlay is simply dropped: nothing here touches storage or
        // the schema-state cache.
        tracing::debug!(
            tx_id = inner.tx_id,
            had_changes = inner.tx_state.has_changes(),
            "transaction rolled back"
        );
        Ok(())
    }

    fn populate_created_indexes(
        &self,
        inner: &TransactionInner,
        commands: &[Command],
    ) -> Result<()> {
        let provider = inner.providers.provider().clone();
        for command in commands {
            let Command::SchemaRule { after, .. } = command else {
                continue;
            };
            if !after.in_use || !after.rule.is_index() {
                continue;
            }
            let (label, property_key) = after.rule.schema();
            let unique = matches!(after.rule, SchemaRule::ConstraintIndex { .. });
            let descriptor = IndexDescriptor {
                label,
                property_key,
                unique,
            };
            let mut proxy = IndexProxy::new(after.id, descriptor, provider.clone());
            let store = &inner.store;
            let entries = store.nodes_with_label(label).into_iter().filter_map(|n| {
                store
                    .load_property(PropertyOwner::Node(n), property_key)
                    .map(|v| (n, v))
            });
            match proxy.populate(entries, inner.config.index_population_batch_size) {
                Ok(()) => {}
                Err(err) if unique => {
                    return Err(KernelError::IntegrityViolation(format!(
                        "backing index for uniqueness constraint failed validation: {err}"
                    )));
                }
                Err(err) => {
                    // A plain index left failed does not reject the commit.
                    tracing::warn!(rule = after.id.0, error = %err, "index left in failed state");
                }
            }
        }
        Ok(())
    }

    fn apply_index_updates(&self, inner: &TransactionInner, commands: &[Command]) -> Result<()> {
        let store = inner.store.clone();
        let updates = updates::extract(commands, |node| store.node_labels(node))?;
        if updates.is_empty() {
            return Ok(());
        }
        let provider = inner.providers.provider();
        for rule in inner.store.schema_rules() {
            if !rule.rule.is_index() {
                continue;
            }
            if provider.initial_state(rule.id) != InternalIndexState::Online {
                continue;
            }
            let (label, property_key) = rule.rule.schema();
            let mut writer = provider.writer(rule.id)?;
            for update in &updates {
                if update.key() == property_key && update.labels().contains(&label) {
                    writer.apply(update)?;
                }
            }
        }
        Ok(())
    }
}

/// Cross-thread termination handle for one transaction.
#[derive(Clone)]
pub struct TerminationHandle {
    inner: std::sync::Weak<Mutex<TransactionInner>>,
    termination: TerminationFlag,
}

impl TerminationHandle {
    /// Marks the transaction for termination; `false` when it has already
    /// closed (or been dropped).
    pub fn mark_for_termination(&self, reason: TerminationReason) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        if inner.lock().lifecycle == Lifecycle::Closed {
            return false;
        }
        self.termination.terminate(reason);
        true
    }
}

/// The transaction factory: owns the collaborators every transaction
/// shares.
pub struct Kernel {
    store: Arc<dyn StorageEngine>,
    sink: Arc<dyn CommandSink>,
    locks: LockManager,
    providers: ProviderRegistry,
    schema_state: Arc<SchemaStateCache>,
    config: KernelConfig,
    next_tx_id: AtomicU64,
}

impl Kernel {
    /// A kernel over the given collaborators.
    pub fn new(
        store: Arc<dyn StorageEngine>,
        sink: Arc<dyn CommandSink>,
        providers: ProviderRegistry,
        config: KernelConfig,
    ) -> Self {
        Self {
            store,
            sink,
            locks: LockManager::new(),
            providers,
            schema_state: Arc::new(SchemaStateCache::new()),
            config,
            next_tx_id: AtomicU64::new(0),
        }
    }

    /// Begins a transaction.
    pub fn begin_tx(&self) -> KernelTransaction {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1;
        let termination = TerminationFlag::default();
        let locks = self.locks.client(
            Duration::from_millis(self.config.lock_timeout_ms),
            termination.clone(),
        );
        tracing::debug!(tx_id, "transaction started");
        let inner = TransactionInner {
            tx_id,
            lifecycle: Lifecycle::Active,
            tx_type: TransactionType::Any,
            tx_state: TxState::new(),
            store: self.store.clone(),
            sink: self.sink.clone(),
            locks,
            providers: self.providers.clone(),
            schema_state: self.schema_state.clone(),
            config: self.config.clone(),
            termination: termination.clone(),
            constraint_epoch_at_start: self.store.constraint_epoch(),
            start_time: Instant::now(),
        };
        KernelTransaction {
            inner: Arc::new(Mutex::new(inner)),
            statement: Mutex::new(None),
            termination,
        }
    }

    /// The shared storage engine.
    pub fn store(&self) -> &Arc<dyn StorageEngine> {
        &self.store
    }

    /// The shared lock manager, exposing the acquire/release call log.
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// The shared schema-state cache.
    pub fn schema_state(&self) -> &Arc<SchemaStateCache> {
        &self.schema_state
    }
}
