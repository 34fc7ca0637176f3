//! Shared/exclusive resource locking across transactions.
//!
//! One [`LockManager`] is shared by every transaction of a kernel. Each
//! transaction holds a [`LockClient`], which is reentrant per resource: a
//! client re-acquiring a lock it already holds bumps a count instead of
//! blocking. Blocking waits observe the client's [`TerminationFlag`] and the
//! configured lock timeout, so a stuck holder can never wedge a terminated
//! transaction.
//!
//! Every acquire and release is appended to a call log for test
//! observability.

use std::hash::Hasher;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use siphasher::sip::SipHasher13;

use crate::error::{KernelError, Result, TerminationReason};
use crate::types::{LabelId, PropKeyId, PropertyValue};

/// How long a blocked waiter sleeps between rechecks of timeout and
/// termination.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// The kinds of resources a lock can be taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A node record.
    Node,
    /// A relationship record.
    Relationship,
    /// The schema as a whole.
    Schema,
    /// A label token.
    Label,
    /// One (label, key, value) entry of a unique index.
    IndexEntry,
}

/// Lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Compatible with other shared holders.
    Shared,
    /// Excludes every other holder.
    Exclusive,
}

/// One entry of the lock-service call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockEvent {
    /// The client that made the call.
    pub client: u64,
    /// Acquire or release.
    pub acquired: bool,
    /// Lock strength of the call.
    pub mode: LockMode,
    /// Resource kind.
    pub resource: ResourceType,
    /// Resource id.
    pub id: u64,
}

/// Asynchronous termination marker shared between a transaction handle and
/// its lock waits.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    reason: Arc<Mutex<Option<TerminationReason>>>,
}

impl TerminationFlag {
    /// Marks the flag, keeping the first reason if already set. Returns
    /// whether this call set it.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
            true
        } else {
            false
        }
    }

    /// The termination reason, if marked.
    pub fn reason(&self) -> Option<TerminationReason> {
        *self.reason.lock()
    }

    /// Errors with the termination reason if marked.
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(KernelError::TransactionTerminated(reason)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct LockEntry {
    shared: FxHashMap<u64, u32>,
    exclusive: Option<(u64, u32)>,
}

impl LockEntry {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    fn shared_grantable(&self, client: u64) -> bool {
        match self.exclusive {
            Some((holder, _)) => holder == client,
            None => true,
        }
    }

    fn exclusive_grantable(&self, client: u64) -> bool {
        let exclusive_ok = match self.exclusive {
            Some((holder, _)) => holder == client,
            None => true,
        };
        let shared_ok = self
            .shared
            .keys()
            .all(|holder| *holder == client);
        exclusive_ok && shared_ok
    }
}

#[derive(Default)]
struct ManagerState {
    locks: FxHashMap<(ResourceType, u64), LockEntry>,
    events: Vec<LockEvent>,
    next_client: u64,
}

/// The shared lock service.
#[derive(Clone, Default)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

#[derive(Default)]
struct ManagerInner {
    state: Mutex<ManagerState>,
    released: Condvar,
}

impl LockManager {
    /// A fresh manager with no locks held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a client for one transaction.
    pub fn client(&self, timeout: Duration, termination: TerminationFlag) -> LockClient {
        let id = {
            let mut state = self.inner.state.lock();
            state.next_client += 1;
            state.next_client
        };
        LockClient {
            manager: self.clone(),
            id,
            timeout,
            termination,
        }
    }

    /// Drains the call log, returning the events recorded so far.
    pub fn take_events(&self) -> Vec<LockEvent> {
        std::mem::take(&mut self.inner.state.lock().events)
    }

    fn acquire(
        &self,
        client: u64,
        mode: LockMode,
        resource: ResourceType,
        id: u64,
        timeout: Duration,
        termination: &TerminationFlag,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            termination.check()?;
            let entry = state.locks.entry((resource, id)).or_default();
            let grantable = match mode {
                LockMode::Shared => entry.shared_grantable(client),
                LockMode::Exclusive => entry.exclusive_grantable(client),
            };
            if grantable {
                match mode {
                    LockMode::Shared => {
                        *entry.shared.entry(client).or_insert(0) += 1;
                    }
                    LockMode::Exclusive => {
                        let count = entry.exclusive.map(|(_, n)| n).unwrap_or(0);
                        entry.exclusive = Some((client, count + 1));
                    }
                }
                state.events.push(LockEvent {
                    client,
                    acquired: true,
                    mode,
                    resource,
                    id,
                });
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(KernelError::LockTimeout(format!(
                    "{mode:?} lock on {resource:?}({id}) not acquired in time"
                )));
            }
            self.inner.released.wait_for(&mut state, WAIT_SLICE);
        }
    }

    fn release(&self, client: u64, mode: LockMode, resource: ResourceType, id: u64) -> bool {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.locks.get_mut(&(resource, id)) else {
            return false;
        };
        let released = match mode {
            LockMode::Shared => match entry.shared.get_mut(&client) {
                Some(count) => {
                    *count -= 1;
                    if *count == 0 {
                        entry.shared.remove(&client);
                    }
                    true
                }
                None => false,
            },
            LockMode::Exclusive => match entry.exclusive {
                Some((holder, count)) if holder == client => {
                    entry.exclusive = if count > 1 {
                        Some((holder, count - 1))
                    } else {
                        None
                    };
                    true
                }
                _ => false,
            },
        };
        if released {
            if entry.is_free() {
                state.locks.remove(&(resource, id));
            }
            state.events.push(LockEvent {
                client,
                acquired: false,
                mode,
                resource,
                id,
            });
            self.inner.released.notify_all();
        }
        released
    }

    fn held_count(&self, client: u64) -> usize {
        let state = self.inner.state.lock();
        state
            .locks
            .values()
            .map(|entry| {
                let shared = entry.shared.get(&client).copied().unwrap_or(0) as usize;
                let exclusive = match entry.exclusive {
                    Some((holder, count)) if holder == client => count as usize,
                    _ => 0,
                };
                shared + exclusive
            })
            .sum()
    }

    fn release_all(&self, client: u64) {
        let mut state = self.inner.state.lock();
        state.locks.retain(|_, entry| {
            entry.shared.remove(&client);
            if matches!(entry.exclusive, Some((holder, _)) if holder == client) {
                entry.exclusive = None;
            }
            !entry.is_free()
        });
        self.inner.released.notify_all();
    }
}

/// One transaction's handle on the lock service. Reentrant per resource;
/// dropped locks are released by the owning transaction, not by this type's
/// `Drop`.
pub struct LockClient {
    manager: LockManager,
    id: u64,
    timeout: Duration,
    termination: TerminationFlag,
}

impl LockClient {
    /// The client id, as it appears in the call log.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acquires a shared lock, blocking until granted, timed out, or the
    /// transaction is terminated.
    pub fn acquire_shared(&self, resource: ResourceType, id: u64) -> Result<()> {
        self.manager.acquire(
            self.id,
            LockMode::Shared,
            resource,
            id,
            self.timeout,
            &self.termination,
        )
    }

    /// Acquires an exclusive lock, blocking until granted, timed out, or the
    /// transaction is terminated.
    pub fn acquire_exclusive(&self, resource: ResourceType, id: u64) -> Result<()> {
        self.manager.acquire(
            self.id,
            LockMode::Exclusive,
            resource,
            id,
            self.timeout,
            &self.termination,
        )
    }

    /// Releases one shared hold. Releasing a lock that is not held is a
    /// no-op returning false.
    pub fn release_shared(&self, resource: ResourceType, id: u64) -> bool {
        self.manager.release(self.id, LockMode::Shared, resource, id)
    }

    /// Releases one exclusive hold. Releasing a lock that is not held is a
    /// no-op returning false.
    pub fn release_exclusive(&self, resource: ResourceType, id: u64) -> bool {
        self.manager
            .release(self.id, LockMode::Exclusive, resource, id)
    }

    /// The number of lock holds this client currently has, counting
    /// reentrant acquisitions individually.
    pub fn active_lock_count(&self) -> usize {
        self.manager.held_count(self.id)
    }

    /// Releases everything this client holds. Called when the owning
    /// transaction finishes, on both the commit and rollback paths.
    pub fn release_all(&self) {
        self.manager.release_all(self.id);
    }
}

/// The lockable resource id for one (label, key, value) unique-index entry.
pub fn index_entry_resource_id(label: LabelId, key: PropKeyId, value: &PropertyValue) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u32(label.0);
    hasher.write_u32(key.0);
    hasher.write(&value.to_index_bytes());
    hasher.finish()
}
