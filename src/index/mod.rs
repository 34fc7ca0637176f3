//! Schema rules, index descriptors and the index provider contract.
//!
//! Providers plug in through [`IndexProvider`] and must obey the
//! populate→flip→online state machine: an index may only report
//! [`InternalIndexState::Online`] after its data was durably flushed, and a
//! provider that does not persist state reports `NonExistent` after restart
//! so the index is repopulated from scratch.

mod memory;
pub mod updates;

pub use memory::{MemoryIndexProvider, NullIndexProvider};
pub use updates::PropertyUpdate;

use std::sync::Arc;

use crate::error::{KernelError, Result};
use crate::types::{LabelId, NodeId, PropKeyId, PropertyValue, RuleId};

/// A persisted schema rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRule {
    /// A plain index over (label, property key).
    Index {
        /// Indexed label.
        label: LabelId,
        /// Indexed property key.
        property_key: PropKeyId,
    },
    /// An index backing a uniqueness constraint. `owner` is the owning
    /// constraint rule, `None` until the constraint itself is committed.
    ConstraintIndex {
        /// Indexed label.
        label: LabelId,
        /// Indexed property key.
        property_key: PropKeyId,
        /// Owning constraint rule id.
        owner: Option<RuleId>,
    },
    /// A uniqueness constraint and the id of its backing index rule.
    UniquenessConstraint {
        /// Constrained label.
        label: LabelId,
        /// Constrained property key.
        property_key: PropKeyId,
        /// Backing index rule id.
        owned_index: RuleId,
    },
}

impl SchemaRule {
    /// The (label, property key) pair this rule governs.
    pub fn schema(&self) -> (LabelId, PropKeyId) {
        match *self {
            SchemaRule::Index {
                label,
                property_key,
            }
            | SchemaRule::ConstraintIndex {
                label,
                property_key,
                ..
            }
            | SchemaRule::UniquenessConstraint {
                label,
                property_key,
                ..
            } => (label, property_key),
        }
    }

    /// Whether this rule defines an index (plain or constraint-backing).
    pub fn is_index(&self) -> bool {
        !matches!(self, SchemaRule::UniquenessConstraint { .. })
    }
}

/// Identifies an index over (label, property key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDescriptor {
    /// Indexed label.
    pub label: LabelId,
    /// Indexed property key.
    pub property_key: PropKeyId,
    /// Whether the index backs a uniqueness constraint.
    pub unique: bool,
}

/// Identifies a uniqueness constraint over (label, property key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstraintDescriptor {
    /// Constrained label.
    pub label: LabelId,
    /// Constrained property key.
    pub property_key: PropKeyId,
}

/// Lifecycle state of one index as reported by its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InternalIndexState {
    /// Being populated; not yet queryable.
    Populating,
    /// Fully populated and durably flushed.
    Online,
    /// Population failed; the index must be dropped and recreated.
    Failed,
    /// The provider holds no state for this index (e.g. after restart of a
    /// non-persistent provider); full repopulation required.
    #[default]
    NonExistent,
}

/// Feeds index entries during initial population.
pub trait IndexPopulator: Send {
    /// Adds one entry.
    fn add(&mut self, node: NodeId, value: &PropertyValue) -> Result<()>;
    /// Verifies deferred constraints (uniqueness) over everything added.
    fn verify(&mut self) -> Result<()>;
    /// Finishes population. `populated_ok = false` marks the index failed.
    /// A successful close must durably flush before returning.
    fn close(&mut self, populated_ok: bool) -> Result<()>;
}

/// Applies committed updates to an online index.
pub trait IndexWriter: Send {
    /// Applies one update.
    fn apply(&mut self, update: &PropertyUpdate) -> Result<()>;
}

/// Point-lookup access to an online index.
pub trait IndexReader: Send {
    /// Unique point lookup; `NodeId::NONE` on a miss.
    fn seek(&self, value: &PropertyValue) -> NodeId;
}

/// The contract any index implementation must expose to the kernel.
pub trait IndexProvider: Send + Sync {
    /// The state of `rule` as this provider knows it.
    fn initial_state(&self, rule: RuleId) -> InternalIndexState;
    /// A populator for initial population of `rule`.
    fn populator(&self, rule: RuleId, descriptor: &IndexDescriptor) -> Result<Box<dyn IndexPopulator>>;
    /// A writer for an online index.
    fn writer(&self, rule: RuleId) -> Result<Box<dyn IndexWriter>>;
    /// A reader for an online index.
    fn reader(&self, rule: RuleId) -> Result<Box<dyn IndexReader>>;
}

/// Provider registry handed to the kernel at construction. "No indexing" is
/// the [`NullIndexProvider`] registered here, not a magic singleton.
#[derive(Clone)]
pub struct ProviderRegistry {
    provider: Arc<dyn IndexProvider>,
}

impl ProviderRegistry {
    /// A registry backed by `provider`.
    pub fn new(provider: Arc<dyn IndexProvider>) -> Self {
        Self { provider }
    }

    /// A registry that indexes nothing.
    pub fn null() -> Self {
        Self {
            provider: Arc::new(NullIndexProvider),
        }
    }

    /// The active provider.
    pub fn provider(&self) -> &Arc<dyn IndexProvider> {
        &self.provider
    }
}

/// Drives one index through populate → flip → online.
pub struct IndexProxy {
    rule: RuleId,
    descriptor: IndexDescriptor,
    provider: Arc<dyn IndexProvider>,
    state: InternalIndexState,
}

impl IndexProxy {
    /// A proxy for `rule`, starting from the provider's reported state.
    pub fn new(rule: RuleId, descriptor: IndexDescriptor, provider: Arc<dyn IndexProvider>) -> Self {
        let state = provider.initial_state(rule);
        Self {
            rule,
            descriptor,
            provider,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InternalIndexState {
        self.state
    }

    /// Populates the index from `entries` and flips it online. Any failure
    /// marks the index failed instead. `batch_size` sets the progress
    /// reporting cadence.
    pub fn populate(
        &mut self,
        entries: impl Iterator<Item = (NodeId, PropertyValue)>,
        batch_size: usize,
    ) -> Result<()> {
        self.state = InternalIndexState::Populating;
        let batch_size = batch_size.max(1);
        let mut populator = self.provider.populator(self.rule, &self.descriptor)?;
        let outcome = (|| {
            let mut added = 0usize;
            for (node, value) in entries {
                populator.add(node, &value)?;
                added += 1;
                if added % batch_size == 0 {
                    tracing::debug!(rule = self.rule.0, added, "index population progress");
                }
            }
            populator.verify()
        })();
        match outcome {
            Ok(()) => {
                // close(true) flushes durably; only then may the index
                // report online.
                populator.close(true)?;
                self.state = InternalIndexState::Online;
                tracing::info!(rule = self.rule.0, "index population completed");
                Ok(())
            }
            Err(err) => {
                populator.close(false)?;
                self.state = InternalIndexState::Failed;
                tracing::warn!(rule = self.rule.0, error = %err, "index population failed");
                Err(err)
            }
        }
    }

    /// A writer, only when online.
    pub fn writer(&self) -> Result<Box<dyn IndexWriter>> {
        if self.state != InternalIndexState::Online {
            return Err(KernelError::InvalidState(
                "index writer requested before the index is online",
            ));
        }
        self.provider.writer(self.rule)
    }
}
