//! The committed record store.
//!
//! The store is shared by every transaction and is the only owner of durable
//! record content. Transactions read committed records through
//! [`StorageEngine`] and never mutate them directly; the sole write path is
//! [`StorageEngine::apply`], which consumes the ordered command stream of one
//! committed transaction. Id allocation also lives here so that ids handed to
//! concurrent transactions never collide, and so replayed commands can push
//! the high-water marks past everything already written.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::index::SchemaRule;
use crate::record::{
    Command, DynamicLabelRecord, NodeRecord, PropertyOwner, RelationshipRecord, SchemaRuleRecord,
};
use crate::types::{
    DynamicId, LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId, RuleId,
};

/// Read and apply surface of the committed store, shared across
/// transactions.
pub trait StorageEngine: Send + Sync {
    /// Allocates a fresh node id.
    fn allocate_node_id(&self) -> NodeId;
    /// Allocates a fresh relationship id.
    fn allocate_relationship_id(&self) -> RelId;
    /// Allocates a fresh dynamic label record id.
    fn allocate_dynamic_id(&self) -> DynamicId;
    /// Allocates a fresh schema rule id.
    fn allocate_rule_id(&self) -> RuleId;
    /// Allocates a fresh label token id.
    fn allocate_label_id(&self) -> LabelId;
    /// Allocates a fresh property key token id.
    fn allocate_prop_key_id(&self) -> PropKeyId;
    /// Allocates a fresh relationship type token id.
    fn allocate_rel_type_id(&self) -> RelTypeId;

    /// The committed node record, if present.
    fn load_node(&self, id: NodeId) -> Option<NodeRecord>;
    /// The committed relationship record, if present.
    fn load_relationship(&self, id: RelId) -> Option<RelationshipRecord>;
    /// The committed dynamic label record, if present.
    fn load_dynamic(&self, id: DynamicId) -> Option<DynamicLabelRecord>;
    /// The committed value of one property slot.
    fn load_property(&self, owner: PropertyOwner, key: PropKeyId) -> Option<PropertyValue>;
    /// All committed properties of one owner, sorted by key.
    fn properties(&self, owner: PropertyOwner) -> Vec<(PropKeyId, PropertyValue)>;
    /// Ids of committed relationships attached to `node`, sorted.
    fn relationships_of(&self, node: NodeId) -> Vec<RelId>;
    /// Ids of committed nodes carrying `label`, sorted.
    fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId>;
    /// The committed label set of `node`, sorted. Empty for absent nodes.
    fn node_labels(&self, node: NodeId) -> Vec<LabelId>;

    /// All committed schema rules.
    fn schema_rules(&self) -> Vec<SchemaRuleRecord>;
    /// The committed schema rule, if present.
    fn load_schema_rule(&self, id: RuleId) -> Option<SchemaRuleRecord>;
    /// Monotonic counter bumped whenever a commit changes constraints. A
    /// transaction snapshots this at start and revalidates at commit.
    fn constraint_epoch(&self) -> u64;

    /// Label token id by name.
    fn label_by_name(&self, name: &str) -> Option<LabelId>;
    /// Label token name by id.
    fn label_name(&self, id: LabelId) -> Option<String>;
    /// Property key token id by name.
    fn prop_key_by_name(&self, name: &str) -> Option<PropKeyId>;
    /// Property key token name by id.
    fn prop_key_name(&self, id: PropKeyId) -> Option<String>;
    /// Relationship type token id by name.
    fn rel_type_by_name(&self, name: &str) -> Option<RelTypeId>;
    /// Relationship type token name by id.
    fn rel_type_name(&self, id: RelTypeId) -> Option<String>;

    /// Applies one committed transaction's ordered command stream. The store
    /// bumps its id high-water marks past every id the stream touches, so
    /// the same path serves live commits and recovery replay.
    fn apply(&self, commands: &[Command]) -> Result<()>;
}

/// Replays a raw command log into `store`, transaction by transaction.
/// Returns the ids of the transactions applied. A torn log tail drops that
/// whole trailing transaction; the store's id high-water marks end up past
/// every applied id.
pub fn recover(store: &dyn StorageEngine, log_bytes: &[u8]) -> Result<Vec<u64>> {
    let entries = crate::log::replay(log_bytes)?;
    let mut applied = Vec::with_capacity(entries.len());
    for entry in entries {
        store.apply(&entry.commands)?;
        tracing::info!(tx_id = entry.tx_id, commands = entry.commands.len(), "recovered transaction");
        applied.push(entry.tx_id);
    }
    Ok(applied)
}

#[derive(Default)]
struct StoreState {
    nodes: FxHashMap<NodeId, NodeRecord>,
    relationships: FxHashMap<RelId, RelationshipRecord>,
    dynamics: FxHashMap<DynamicId, DynamicLabelRecord>,
    properties: FxHashMap<(PropertyOwner, PropKeyId), PropertyValue>,
    rules: FxHashMap<RuleId, SchemaRuleRecord>,

    labels_by_name: FxHashMap<String, LabelId>,
    labels_by_id: FxHashMap<LabelId, String>,
    prop_keys_by_name: FxHashMap<String, PropKeyId>,
    prop_keys_by_id: FxHashMap<PropKeyId, String>,
    rel_types_by_name: FxHashMap<String, RelTypeId>,
    rel_types_by_id: FxHashMap<RelTypeId, String>,

    next_node: u64,
    next_relationship: u64,
    next_dynamic: u64,
    next_rule: u64,
    next_label: u32,
    next_prop_key: u32,
    next_rel_type: u32,

    constraint_epoch: u64,
}

fn bump_u64(slot: &mut u64, used: u64) {
    if used != u64::MAX && used >= *slot {
        *slot = used + 1;
    }
}

fn bump_u32(slot: &mut u32, used: u32) {
    if used != u32::MAX && used >= *slot {
        *slot = used + 1;
    }
}

/// In-process [`StorageEngine`] backed by hash maps.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store behind the trait object the kernel expects.
    pub fn shared() -> Arc<dyn StorageEngine> {
        Arc::new(Self::new())
    }
}

impl StorageEngine for MemoryStore {
    fn allocate_node_id(&self) -> NodeId {
        let mut state = self.state.lock();
        let id = NodeId(state.next_node);
        state.next_node += 1;
        id
    }

    fn allocate_relationship_id(&self) -> RelId {
        let mut state = self.state.lock();
        let id = RelId(state.next_relationship);
        state.next_relationship += 1;
        id
    }

    fn allocate_dynamic_id(&self) -> DynamicId {
        let mut state = self.state.lock();
        let id = DynamicId(state.next_dynamic);
        state.next_dynamic += 1;
        id
    }

    fn allocate_rule_id(&self) -> RuleId {
        let mut state = self.state.lock();
        let id = RuleId(state.next_rule);
        state.next_rule += 1;
        id
    }

    fn allocate_label_id(&self) -> LabelId {
        let mut state = self.state.lock();
        let id = LabelId(state.next_label);
        state.next_label += 1;
        id
    }

    fn allocate_prop_key_id(&self) -> PropKeyId {
        let mut state = self.state.lock();
        let id = PropKeyId(state.next_prop_key);
        state.next_prop_key += 1;
        id
    }

    fn allocate_rel_type_id(&self) -> RelTypeId {
        let mut state = self.state.lock();
        let id = RelTypeId(state.next_rel_type);
        state.next_rel_type += 1;
        id
    }

    fn load_node(&self, id: NodeId) -> Option<NodeRecord> {
        self.state.lock().nodes.get(&id).cloned()
    }

    fn load_relationship(&self, id: RelId) -> Option<RelationshipRecord> {
        self.state.lock().relationships.get(&id).cloned()
    }

    fn load_dynamic(&self, id: DynamicId) -> Option<DynamicLabelRecord> {
        self.state.lock().dynamics.get(&id).cloned()
    }

    fn load_property(&self, owner: PropertyOwner, key: PropKeyId) -> Option<PropertyValue> {
        self.state.lock().properties.get(&(owner, key)).cloned()
    }

    fn properties(&self, owner: PropertyOwner) -> Vec<(PropKeyId, PropertyValue)> {
        let state = self.state.lock();
        let mut out: Vec<_> = state
            .properties
            .iter()
            .filter(|((o, _), _)| *o == owner)
            .map(|((_, key), value)| (*key, value.clone()))
            .collect();
        out.sort_by_key(|(key, _)| *key);
        out
    }

    fn relationships_of(&self, node: NodeId) -> Vec<RelId> {
        let state = self.state.lock();
        let mut out: Vec<_> = state
            .relationships
            .values()
            .filter(|rel| rel.start_node == node || rel.end_node == node)
            .map(|rel| rel.id)
            .collect();
        out.sort_unstable();
        out
    }

    fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId> {
        let state = self.state.lock();
        let mut out: Vec<_> = state
            .nodes
            .values()
            .filter(|node| match &node.labels {
                crate::record::LabelStorage::Inline(labels) => labels.contains(&label),
                crate::record::LabelStorage::Dynamic(id) => state
                    .dynamics
                    .get(id)
                    .is_some_and(|d| d.labels.contains(&label)),
            })
            .map(|node| node.id)
            .collect();
        out.sort_unstable();
        out
    }

    fn node_labels(&self, node: NodeId) -> Vec<LabelId> {
        let state = self.state.lock();
        let Some(record) = state.nodes.get(&node) else {
            return Vec::new();
        };
        let mut labels = match &record.labels {
            crate::record::LabelStorage::Inline(labels) => labels.to_vec(),
            crate::record::LabelStorage::Dynamic(id) => state
                .dynamics
                .get(id)
                .map(|d| d.labels.clone())
                .unwrap_or_default(),
        };
        labels.sort_unstable();
        labels
    }

    fn schema_rules(&self) -> Vec<SchemaRuleRecord> {
        let state = self.state.lock();
        let mut out: Vec<_> = state.rules.values().cloned().collect();
        out.sort_by_key(|rule| rule.id);
        out
    }

    fn load_schema_rule(&self, id: RuleId) -> Option<SchemaRuleRecord> {
        self.state.lock().rules.get(&id).cloned()
    }

    fn constraint_epoch(&self) -> u64 {
        self.state.lock().constraint_epoch
    }

    fn label_by_name(&self, name: &str) -> Option<LabelId> {
        self.state.lock().labels_by_name.get(name).copied()
    }

    fn label_name(&self, id: LabelId) -> Option<String> {
        self.state.lock().labels_by_id.get(&id).cloned()
    }

    fn prop_key_by_name(&self, name: &str) -> Option<PropKeyId> {
        self.state.lock().prop_keys_by_name.get(name).copied()
    }

    fn prop_key_name(&self, id: PropKeyId) -> Option<String> {
        self.state.lock().prop_keys_by_id.get(&id).cloned()
    }

    fn rel_type_by_name(&self, name: &str) -> Option<RelTypeId> {
        self.state.lock().rel_types_by_name.get(name).copied()
    }

    fn rel_type_name(&self, id: RelTypeId) -> Option<String> {
        self.state.lock().rel_types_by_id.get(&id).cloned()
    }

    fn apply(&self, commands: &[Command]) -> Result<()> {
        let mut state = self.state.lock();
        for command in commands {
            match command {
                Command::PropKeyToken(token) => {
                    bump_u32(&mut state.next_prop_key, token.id.0);
                    state.prop_keys_by_name.insert(token.name.clone(), token.id);
                    state.prop_keys_by_id.insert(token.id, token.name.clone());
                }
                Command::LabelToken(token) => {
                    bump_u32(&mut state.next_label, token.id.0);
                    state.labels_by_name.insert(token.name.clone(), token.id);
                    state.labels_by_id.insert(token.id, token.name.clone());
                }
                Command::RelTypeToken(token) => {
                    bump_u32(&mut state.next_rel_type, token.id.0);
                    state.rel_types_by_name.insert(token.name.clone(), token.id);
                    state.rel_types_by_id.insert(token.id, token.name.clone());
                }
                Command::Node { after, .. } => {
                    bump_u64(&mut state.next_node, after.id.0);
                    if after.in_use {
                        let mut record = after.clone();
                        record.created = false;
                        state.nodes.insert(record.id, record);
                    } else {
                        state.nodes.remove(&after.id);
                    }
                }
                Command::Relationship { after, .. } => {
                    bump_u64(&mut state.next_relationship, after.id.0);
                    if after.in_use {
                        let mut record = after.clone();
                        record.created = false;
                        state.relationships.insert(record.id, record);
                    } else {
                        state.relationships.remove(&after.id);
                    }
                }
                Command::Property { after, .. } => {
                    if let Some(value) = after.value.clone().filter(|_| after.in_use) {
                        state.properties.insert((after.owner, after.key), value);
                    } else {
                        state.properties.remove(&(after.owner, after.key));
                    }
                }
                Command::DynamicLabel(record) => {
                    bump_u64(&mut state.next_dynamic, record.id.0);
                    if record.in_use {
                        let mut record = record.clone();
                        record.created = false;
                        state.dynamics.insert(record.id, record);
                    } else {
                        state.dynamics.remove(&record.id);
                    }
                }
                Command::SchemaRule { after, .. } => {
                    bump_u64(&mut state.next_rule, after.id.0);
                    if !matches!(after.rule, SchemaRule::Index { .. }) {
                        state.constraint_epoch += 1;
                    }
                    if after.in_use {
                        let mut record = after.clone();
                        record.created = false;
                        state.rules.insert(record.id, record);
                    } else {
                        state.rules.remove(&after.id);
                    }
                }
            }
        }
        Ok(())
    }
}
