//! In-memory index provider, plus the null provider.
//!
//! The memory provider keeps its entries in process memory only, so after a
//! "restart" (a fresh provider instance) every index reports `NonExistent`
//! and must be repopulated; it never claims `Online` for data it no longer
//! holds. Within one instance the populate→flush→online contract is
//! enforced with an explicit flushed flag.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{KernelError, Result};
use crate::types::{NodeId, PropertyValue, RuleId};

use super::updates::PropertyUpdate;
use super::{
    IndexDescriptor, IndexPopulator, IndexProvider, IndexReader, IndexWriter, InternalIndexState,
};

#[derive(Default)]
struct IndexData {
    entries: BTreeMap<Vec<u8>, Vec<NodeId>>,
    unique: bool,
    state: InternalIndexState,
    flushed: bool,
}

/// A process-local index provider for tests and embedded use.
#[derive(Default)]
pub struct MemoryIndexProvider {
    indexes: Mutex<FxHashMap<RuleId, Arc<Mutex<IndexData>>>>,
}

impl MemoryIndexProvider {
    /// A provider with no indexes.
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, rule: RuleId) -> Arc<Mutex<IndexData>> {
        self.indexes
            .lock()
            .entry(rule)
            .or_insert_with(|| Arc::new(Mutex::new(IndexData::default())))
            .clone()
    }
}

impl IndexProvider for MemoryIndexProvider {
    fn initial_state(&self, rule: RuleId) -> InternalIndexState {
        self.indexes
            .lock()
            .get(&rule)
            .map(|data| data.lock().state)
            .unwrap_or(InternalIndexState::NonExistent)
    }

    fn populator(
        &self,
        rule: RuleId,
        descriptor: &IndexDescriptor,
    ) -> Result<Box<dyn IndexPopulator>> {
        let data = self.index(rule);
        {
            let mut guard = data.lock();
            guard.entries.clear();
            guard.unique = descriptor.unique;
            guard.state = InternalIndexState::Populating;
            guard.flushed = false;
        }
        Ok(Box::new(MemoryPopulator { data }))
    }

    fn writer(&self, rule: RuleId) -> Result<Box<dyn IndexWriter>> {
        let data = self.index(rule);
        if data.lock().state != InternalIndexState::Online {
            return Err(KernelError::InvalidState("index is not online"));
        }
        Ok(Box::new(MemoryWriter { data }))
    }

    fn reader(&self, rule: RuleId) -> Result<Box<dyn IndexReader>> {
        let data = self.index(rule);
        if data.lock().state != InternalIndexState::Online {
            return Err(KernelError::InvalidState("index is not online"));
        }
        Ok(Box::new(MemoryReader { data }))
    }
}

struct MemoryPopulator {
    data: Arc<Mutex<IndexData>>,
}

impl IndexPopulator for MemoryPopulator {
    fn add(&mut self, node: NodeId, value: &PropertyValue) -> Result<()> {
        let mut guard = self.data.lock();
        guard
            .entries
            .entry(value.to_index_bytes())
            .or_default()
            .push(node);
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        let guard = self.data.lock();
        if guard.unique {
            for nodes in guard.entries.values() {
                if nodes.len() > 1 {
                    return Err(KernelError::IntegrityViolation(format!(
                        "duplicate value indexed for nodes {:?}",
                        nodes
                    )));
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, populated_ok: bool) -> Result<()> {
        let mut guard = self.data.lock();
        if populated_ok {
            // Memory-resident data has nothing to sync; the flag still
            // gates the online transition the way a durable provider's
            // flush would.
            guard.flushed = true;
            guard.state = InternalIndexState::Online;
        } else {
            guard.entries.clear();
            guard.state = InternalIndexState::Failed;
        }
        Ok(())
    }
}

struct MemoryWriter {
    data: Arc<Mutex<IndexData>>,
}

impl IndexWriter for MemoryWriter {
    fn apply(&mut self, update: &PropertyUpdate) -> Result<()> {
        let mut guard = self.data.lock();
        match update {
            PropertyUpdate::Add { node, value, .. } => {
                guard
                    .entries
                    .entry(value.to_index_bytes())
                    .or_default()
                    .push(*node);
            }
            PropertyUpdate::Change {
                node,
                value_before,
                value_after,
                ..
            } => {
                let before = value_before.to_index_bytes();
                if let Some(nodes) = guard.entries.get_mut(&before) {
                    nodes.retain(|n| n != node);
                    if nodes.is_empty() {
                        guard.entries.remove(&before);
                    }
                }
                guard
                    .entries
                    .entry(value_after.to_index_bytes())
                    .or_default()
                    .push(*node);
            }
            PropertyUpdate::Remove { node, value, .. } => {
                let bytes = value.to_index_bytes();
                if let Some(nodes) = guard.entries.get_mut(&bytes) {
                    nodes.retain(|n| n != node);
                    if nodes.is_empty() {
                        guard.entries.remove(&bytes);
                    }
                }
            }
        }
        Ok(())
    }
}

struct MemoryReader {
    data: Arc<Mutex<IndexData>>,
}

impl IndexReader for MemoryReader {
    fn seek(&self, value: &PropertyValue) -> NodeId {
        self.data
            .lock()
            .entries
            .get(&value.to_index_bytes())
            .and_then(|nodes| nodes.first().copied())
            .unwrap_or(NodeId::NONE)
    }
}

/// A provider that indexes nothing: every index is `NonExistent`, the
/// populator swallows entries and readers always miss.
pub struct NullIndexProvider;

impl IndexProvider for NullIndexProvider {
    fn initial_state(&self, _rule: RuleId) -> InternalIndexState {
        InternalIndexState::NonExistent
    }

    fn populator(
        &self,
        _rule: RuleId,
        _descriptor: &IndexDescriptor,
    ) -> Result<Box<dyn IndexPopulator>> {
        Ok(Box::new(NullPopulator))
    }

    fn writer(&self, _rule: RuleId) -> Result<Box<dyn IndexWriter>> {
        Ok(Box::new(NullWriter))
    }

    fn reader(&self, _rule: RuleId) -> Result<Box<dyn IndexReader>> {
        Ok(Box::new(NullReader))
    }
}

struct NullPopulator;

impl IndexPopulator for NullPopulator {
    fn add(&mut self, _node: NodeId, _value: &PropertyValue) -> Result<()> {
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _populated_ok: bool) -> Result<()> {
        Ok(())
    }
}

struct NullWriter;

impl IndexWriter for NullWriter {
    fn apply(&mut self, _update: &PropertyUpdate) -> Result<()> {
        Ok(())
    }
}

struct NullReader;

impl IndexReader for NullReader {
    fn seek(&self, _value: &PropertyValue) -> NodeId {
        NodeId::NONE
    }
}
