//! Translates the transaction overlay into record changes and commands.
//!
//! [`TransactionRecordState`] receives the overlay through the visitor,
//! builds before/after record pairs against committed storage, and emits the
//! final sorted command list. The same logical operations always produce the
//! same bytes, whichever entry point drove them.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{KernelError, Result};
use crate::index::{ConstraintDescriptor, IndexDescriptor, SchemaRule};
use crate::record::{
    Command, CommandSorter, DynamicLabelRecord, LabelStorage, LabelTokenRecord, NodeLabelsField,
    NodeRecord, PropKeyTokenRecord, PropertyOwner, PropertyRecord, RelTypeTokenRecord,
    RelationshipRecord, SchemaRuleRecord,
};
use crate::state::{PropertyDiff, RelationshipData, TxStateVisitor};
use crate::store::StorageEngine;
use crate::types::{DynamicId, LabelId, NodeId, PropKeyId, RelId, RelTypeId, RuleId};

pub(crate) struct TransactionRecordState {
    store: Arc<dyn StorageEngine>,
    max_commands: usize,
    node_commands: FxHashMap<NodeId, (NodeRecord, NodeRecord)>,
    rel_commands: FxHashMap<RelId, (RelationshipRecord, RelationshipRecord)>,
    property_commands: Vec<Command>,
    dynamic_commands: FxHashMap<DynamicId, DynamicLabelRecord>,
    token_commands: Vec<Command>,
    schema_commands: Vec<(SchemaRuleRecord, SchemaRuleRecord)>,
    allocated_index_rules: FxHashMap<IndexDescriptor, RuleId>,
    error: Option<KernelError>,
}

impl TransactionRecordState {
    pub(crate) fn new(store: Arc<dyn StorageEngine>, max_commands: usize) -> Self {
        Self {
            store,
            max_commands,
            node_commands: FxHashMap::default(),
            rel_commands: FxHashMap::default(),
            property_commands: Vec::new(),
            dynamic_commands: FxHashMap::default(),
            token_commands: Vec::new(),
            schema_commands: Vec::new(),
            allocated_index_rules: FxHashMap::default(),
            error: None,
        }
    }

    /// The final command list, sorted into its deterministic order.
    pub(crate) fn extract_commands(self) -> Result<Vec<Command>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut commands = self.token_commands;
        commands.extend(
            self.node_commands
                .into_values()
                .map(|(before, after)| Command::Node { before, after }),
        );
        commands.extend(
            self.rel_commands
                .into_values()
                .map(|(before, after)| Command::Relationship { before, after }),
        );
        commands.extend(self.property_commands);
        commands.extend(self.dynamic_commands.into_values().map(Command::DynamicLabel));
        commands.extend(
            self.schema_commands
                .into_iter()
                .map(|(before, after)| Command::SchemaRule { before, after }),
        );
        if commands.len() > self.max_commands {
            return Err(KernelError::Invalid(format!(
                "transaction produces {} commands, exceeding the configured maximum of {}",
                commands.len(),
                self.max_commands
            )));
        }
        CommandSorter::sort(&mut commands);
        Ok(commands)
    }

    fn fail(&mut self, err: KernelError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn ensure_node_images(&mut self, id: NodeId) -> bool {
        if self.node_commands.contains_key(&id) {
            return true;
        }
        match self.store.load_node(id) {
            Some(committed) => {
                self.node_commands.insert(id, (committed.clone(), committed));
                true
            }
            None => {
                self.fail(KernelError::NotFound {
                    kind: "node",
                    id: id.0,
                });
                false
            }
        }
    }

    fn push_property_commands(&mut self, owner: PropertyOwner, diff: &PropertyDiff) {
        for (key, value) in diff.added_sorted() {
            let mut after = PropertyRecord::unused(owner, key);
            after.in_use = true;
            after.created = true;
            after.value = Some(value);
            self.property_commands.push(Command::Property {
                before: PropertyRecord::unused(owner, key),
                after,
            });
        }
        for (key, old, new) in diff.changed_sorted() {
            let mut before = PropertyRecord::unused(owner, key);
            before.in_use = true;
            before.value = Some(old);
            let mut after = PropertyRecord::unused(owner, key);
            after.in_use = true;
            after.value = Some(new);
            self.property_commands
                .push(Command::Property { before, after });
        }
        for (key, old) in diff.removed_sorted() {
            let mut before = PropertyRecord::unused(owner, key);
            before.in_use = true;
            before.value = Some(old);
            self.property_commands.push(Command::Property {
                before,
                after: PropertyRecord::unused(owner, key),
            });
        }
    }

    /// Emits removal commands for every committed property of `owner`; used
    /// when the owning entity is deleted.
    fn remove_committed_properties(&mut self, owner: PropertyOwner) {
        for (key, value) in self.store.properties(owner) {
            let mut before = PropertyRecord::unused(owner, key);
            before.in_use = true;
            before.value = Some(value);
            self.property_commands.push(Command::Property {
                before,
                after: PropertyRecord::unused(owner, key),
            });
        }
    }

    fn committed_index_rule(&self, descriptor: &IndexDescriptor) -> Option<SchemaRuleRecord> {
        self.store.schema_rules().into_iter().find(|rule| {
            rule.rule.is_index()
                && rule.rule.schema() == (descriptor.label, descriptor.property_key)
                && matches!(rule.rule, SchemaRule::ConstraintIndex { .. }) == descriptor.unique
        })
    }

    fn committed_constraint_rule(
        &self,
        constraint: &ConstraintDescriptor,
    ) -> Option<SchemaRuleRecord> {
        self.store.schema_rules().into_iter().find(|rule| {
            matches!(rule.rule, SchemaRule::UniquenessConstraint { .. })
                && rule.rule.schema() == (constraint.label, constraint.property_key)
        })
    }

    fn push_schema_removal(&mut self, committed: SchemaRuleRecord) {
        let mut after = committed.clone();
        after.in_use = false;
        self.schema_commands.push((committed, after));
    }
}

fn unused_rule(id: RuleId, rule: SchemaRule) -> SchemaRuleRecord {
    SchemaRuleRecord {
        id,
        in_use: false,
        created: false,
        rule,
    }
}

impl TxStateVisitor for TransactionRecordState {
    fn visit_created_label_token(&mut self, name: &str, id: LabelId) {
        self.token_commands
            .push(Command::LabelToken(LabelTokenRecord {
                id,
                name: name.to_owned(),
            }));
    }

    fn visit_created_prop_key_token(&mut self, name: &str, id: PropKeyId) {
        self.token_commands
            .push(Command::PropKeyToken(PropKeyTokenRecord {
                id,
                name: name.to_owned(),
            }));
    }

    fn visit_created_rel_type_token(&mut self, name: &str, id: RelTypeId) {
        self.token_commands
            .push(Command::RelTypeToken(RelTypeTokenRecord {
                id,
                name: name.to_owned(),
            }));
    }

    fn visit_created_node(&mut self, id: NodeId) {
        let mut after = NodeRecord::unused(id);
        after.in_use = true;
        after.created = true;
        self.node_commands.insert(id, (NodeRecord::unused(id), after));
    }

    fn visit_created_relationship(&mut self, id: RelId, data: RelationshipData) {
        let after = RelationshipRecord {
            id,
            in_use: true,
            created: true,
            start_node: data.start_node,
            end_node: data.end_node,
            rel_type: data.rel_type,
        };
        self.rel_commands
            .insert(id, (RelationshipRecord::unused(id), after));
    }

    fn visit_node_label_changes(&mut self, id: NodeId, added: &[LabelId], removed: &[LabelId]) {
        if !self.ensure_node_images(id) {
            return;
        }
        let store = self.store.clone();
        let mut after = self.node_commands[&id].1.clone();
        let parsed = NodeLabelsField::parse(&after, |dynamic_id| {
            store
                .load_dynamic(dynamic_id)
                .ok_or(KernelError::Corruption("missing dynamic label record"))
        });
        let mut field = match parsed {
            Ok(field) => field,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let mut alloc = || store.allocate_dynamic_id();
        for label in added {
            field.add(*label, &mut alloc);
        }
        for label in removed {
            field.remove(*label);
        }
        let dynamic = field.apply_to(&mut after);
        if let Some(images) = self.node_commands.get_mut(&id) {
            images.1 = after;
        }
        if let Some(dynamic) = dynamic {
            self.dynamic_commands.insert(dynamic.id, dynamic);
        }
    }

    fn visit_node_property_changes(&mut self, id: NodeId, diff: &PropertyDiff) {
        self.push_property_commands(PropertyOwner::Node(id), diff);
    }

    fn visit_rel_property_changes(&mut self, id: RelId, diff: &PropertyDiff) {
        self.push_property_commands(PropertyOwner::Relationship(id), diff);
    }

    fn visit_graph_property_changes(&mut self, diff: &PropertyDiff) {
        self.push_property_commands(PropertyOwner::Graph, diff);
    }

    fn visit_deleted_relationship(&mut self, id: RelId, data: RelationshipData) {
        let before = self.store.load_relationship(id).unwrap_or(RelationshipRecord {
            id,
            in_use: true,
            created: false,
            start_node: data.start_node,
            end_node: data.end_node,
            rel_type: data.rel_type,
        });
        self.rel_commands
            .insert(id, (before, RelationshipRecord::unused(id)));
        self.remove_committed_properties(PropertyOwner::Relationship(id));
    }

    fn visit_deleted_node(&mut self, id: NodeId) {
        let Some(committed) = self.store.load_node(id) else {
            self.fail(KernelError::NotFound {
                kind: "node",
                id: id.0,
            });
            return;
        };
        if let LabelStorage::Dynamic(dynamic_id) = committed.labels {
            match self.store.load_dynamic(dynamic_id) {
                Some(mut dynamic) => {
                    dynamic.in_use = false;
                    self.dynamic_commands.insert(dynamic.id, dynamic);
                }
                None => {
                    self.fail(KernelError::Corruption("missing dynamic label record"));
                    return;
                }
            }
        }
        self.node_commands
            .insert(id, (committed, NodeRecord::unused(id)));
        self.remove_committed_properties(PropertyOwner::Node(id));
    }

    fn visit_added_index(&mut self, descriptor: &IndexDescriptor) {
        let id = self.store.allocate_rule_id();
        self.allocated_index_rules.insert(descriptor.clone(), id);
        let rule = if descriptor.unique {
            SchemaRule::ConstraintIndex {
                label: descriptor.label,
                property_key: descriptor.property_key,
                owner: None,
            }
        } else {
            SchemaRule::Index {
                label: descriptor.label,
                property_key: descriptor.property_key,
            }
        };
        let after = SchemaRuleRecord {
            id,
            in_use: true,
            created: true,
            rule: rule.clone(),
        };
        self.schema_commands.push((unused_rule(id, rule), after));
    }

    fn visit_removed_index(&mut self, descriptor: &IndexDescriptor) {
        match self.committed_index_rule(descriptor) {
            Some(committed) => self.push_schema_removal(committed),
            None => self.fail(KernelError::InvalidState(
                "dropped index does not exist in committed schema",
            )),
        }
    }

    fn visit_added_constraint(&mut self, constraint: &ConstraintDescriptor) {
        let backing = IndexDescriptor {
            label: constraint.label,
            property_key: constraint.property_key,
            unique: true,
        };
        let owned_index = self
            .allocated_index_rules
            .get(&backing)
            .copied()
            .or_else(|| self.committed_index_rule(&backing).map(|rule| rule.id));
        let Some(owned_index) = owned_index else {
            self.fail(KernelError::InvalidState(
                "uniqueness constraint without a backing index",
            ));
            return;
        };
        let id = self.store.allocate_rule_id();
        // Link the backing index created in this transaction back to its
        // owning constraint.
        for (_, after) in &mut self.schema_commands {
            if after.id == owned_index {
                if let SchemaRule::ConstraintIndex { owner, .. } = &mut after.rule {
                    *owner = Some(id);
                }
            }
        }
        let rule = SchemaRule::UniquenessConstraint {
            label: constraint.label,
            property_key: constraint.property_key,
            owned_index,
        };
        let after = SchemaRuleRecord {
            id,
            in_use: true,
            created: true,
            rule: rule.clone(),
        };
        self.schema_commands.push((unused_rule(id, rule), after));
    }

    fn visit_removed_constraint(&mut self, constraint: &ConstraintDescriptor) {
        match self.committed_constraint_rule(constraint) {
            Some(committed) => self.push_schema_removal(committed),
            None => self.fail(KernelError::InvalidState(
                "dropped constraint does not exist in committed schema",
            )),
        }
    }
}
