//! Commands: the durable, ordered deltas handed to the log and storage.
//!
//! Wire shape of one command frame:
//!
//! ```text
//! tag: u8 | payload_len: u32 be | payload | crc32(payload): u32 be
//! ```
//!
//! Decoding is resilient to truncation: a frame cut short at ANY prefix
//! decodes as `Ok(None)`, never as an error and never as a different valid
//! command. A complete frame with an unknown tag or a checksum mismatch is
//! corruption. Recovery leans on this: a torn tail reads as "no more
//! commands".

use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::error::{KernelError, Result};
use crate::index::SchemaRule;
use crate::types::{
    DynamicId, LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId, RuleId,
};

use super::records::{
    DynamicLabelRecord, LabelStorage, LabelTokenRecord, NodeRecord, PropertyOwner, PropertyRecord,
    PropKeyTokenRecord, RelTypeTokenRecord, RelationshipRecord, SchemaRuleRecord,
};

const TAG_PROP_KEY_TOKEN: u8 = 0x01;
const TAG_LABEL_TOKEN: u8 = 0x02;
const TAG_REL_TYPE_TOKEN: u8 = 0x03;
const TAG_NODE: u8 = 0x04;
const TAG_RELATIONSHIP: u8 = 0x05;
const TAG_PROPERTY: u8 = 0x06;
const TAG_DYNAMIC_LABEL: u8 = 0x07;
const TAG_SCHEMA_RULE: u8 = 0x08;

/// A before/after record delta bound for the write-ahead log.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Property key token creation.
    PropKeyToken(PropKeyTokenRecord),
    /// Label token creation.
    LabelToken(LabelTokenRecord),
    /// Relationship type token creation.
    RelTypeToken(RelTypeTokenRecord),
    /// Node transition.
    Node {
        /// State before the transaction.
        before: NodeRecord,
        /// State after the transaction.
        after: NodeRecord,
    },
    /// Relationship transition.
    Relationship {
        /// State before the transaction.
        before: RelationshipRecord,
        /// State after the transaction.
        after: RelationshipRecord,
    },
    /// Property slot transition.
    Property {
        /// State before the transaction.
        before: PropertyRecord,
        /// State after the transaction.
        after: PropertyRecord,
    },
    /// Dynamic label overflow record image (in-use with the full label set,
    /// or not-in-use when re-inlined).
    DynamicLabel(DynamicLabelRecord),
    /// Schema rule transition.
    SchemaRule {
        /// State before the transaction.
        before: SchemaRuleRecord,
        /// State after the transaction.
        after: SchemaRuleRecord,
    },
}

impl Command {
    fn tag(&self) -> u8 {
        match self {
            Command::PropKeyToken(_) => TAG_PROP_KEY_TOKEN,
            Command::LabelToken(_) => TAG_LABEL_TOKEN,
            Command::RelTypeToken(_) => TAG_REL_TYPE_TOKEN,
            Command::Node { .. } => TAG_NODE,
            Command::Relationship { .. } => TAG_RELATIONSHIP,
            Command::Property { .. } => TAG_PROPERTY,
            Command::DynamicLabel(_) => TAG_DYNAMIC_LABEL,
            Command::SchemaRule { .. } => TAG_SCHEMA_RULE,
        }
    }

    /// Kind priority used by [`CommandSorter`]; token commands sort first so
    /// recovery sees names before the records that reference them.
    pub fn kind_priority(&self) -> u8 {
        self.tag()
    }

    /// Entity id component of the sort key.
    pub fn sort_id(&self) -> u64 {
        match self {
            Command::PropKeyToken(r) => u64::from(r.id.0),
            Command::LabelToken(r) => u64::from(r.id.0),
            Command::RelTypeToken(r) => u64::from(r.id.0),
            Command::Node { after, .. } => after.id.0,
            Command::Relationship { after, .. } => after.id.0,
            Command::Property { after, .. } => after.owner.sort_id(),
            Command::DynamicLabel(r) => r.id.0,
            Command::SchemaRule { after, .. } => after.id.0,
        }
    }

    /// Appends the encoded frame to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        match self {
            Command::PropKeyToken(r) => {
                payload.put_u32(r.id.0);
                put_string(&mut payload, &r.name);
            }
            Command::LabelToken(r) => {
                payload.put_u32(r.id.0);
                put_string(&mut payload, &r.name);
            }
            Command::RelTypeToken(r) => {
                payload.put_u32(r.id.0);
                put_string(&mut payload, &r.name);
            }
            Command::Node { before, after } => {
                encode_node(&mut payload, before);
                encode_node(&mut payload, after);
            }
            Command::Relationship { before, after } => {
                encode_relationship(&mut payload, before);
                encode_relationship(&mut payload, after);
            }
            Command::Property { before, after } => {
                encode_property(&mut payload, before);
                encode_property(&mut payload, after);
            }
            Command::DynamicLabel(r) => encode_dynamic(&mut payload, r),
            Command::SchemaRule { before, after } => {
                encode_schema_rule_record(&mut payload, before);
                encode_schema_rule_record(&mut payload, after);
            }
        }
        out.put_u8(self.tag());
        out.put_u32(payload.len() as u32);
        out.extend_from_slice(&payload);
        out.put_u32(crc32fast::hash(&payload));
    }

    /// Decodes the next frame from `buf`. `Ok(None)` means the remaining
    /// bytes are a truncated frame (or empty); the buffer position is not
    /// meaningful afterwards.
    pub fn decode(buf: &mut impl Buf) -> Result<Option<Command>> {
        if buf.remaining() < 5 {
            return Ok(None);
        }
        let tag = buf.get_u8();
        let len = buf.get_u32() as usize;
        if buf.remaining() < len + 4 {
            return Ok(None);
        }
        let mut payload = vec![0u8; len];
        buf.copy_to_slice(&mut payload);
        let crc = buf.get_u32();
        if crc != crc32fast::hash(&payload) {
            return Err(KernelError::Corruption("command checksum mismatch"));
        }
        let mut p: &[u8] = &payload;
        let command = match tag {
            TAG_PROP_KEY_TOKEN => {
                let id = PropKeyId(get_u32(&mut p)?);
                let name = get_string(&mut p)?;
                Command::PropKeyToken(PropKeyTokenRecord { id, name })
            }
            TAG_LABEL_TOKEN => {
                let id = LabelId(get_u32(&mut p)?);
                let name = get_string(&mut p)?;
                Command::LabelToken(LabelTokenRecord { id, name })
            }
            TAG_REL_TYPE_TOKEN => {
                let id = RelTypeId(get_u32(&mut p)?);
                let name = get_string(&mut p)?;
                Command::RelTypeToken(RelTypeTokenRecord { id, name })
            }
            TAG_NODE => Command::Node {
                before: decode_node(&mut p)?,
                after: decode_node(&mut p)?,
            },
            TAG_RELATIONSHIP => Command::Relationship {
                before: decode_relationship(&mut p)?,
                after: decode_relationship(&mut p)?,
            },
            TAG_PROPERTY => Command::Property {
                before: decode_property(&mut p)?,
                after: decode_property(&mut p)?,
            },
            TAG_DYNAMIC_LABEL => Command::DynamicLabel(decode_dynamic(&mut p)?),
            TAG_SCHEMA_RULE => Command::SchemaRule {
                before: decode_schema_rule_record(&mut p)?,
                after: decode_schema_rule_record(&mut p)?,
            },
            _ => return Err(KernelError::Corruption("unknown command tag")),
        };
        if !p.is_empty() {
            return Err(KernelError::Corruption("trailing bytes in command payload"));
        }
        Ok(Some(command))
    }
}

/// Total order on commands: kind priority, then entity id.
///
/// Applying this order to the command list is the last step of prepare,
/// which makes the stream handed to the log identical between a live commit
/// and a recovery replay of the same logical operations.
pub struct CommandSorter;

impl CommandSorter {
    /// Sorts `commands` into the canonical order.
    pub fn sort(commands: &mut [Command]) {
        commands.sort_by(Self::compare);
    }

    fn compare(a: &Command, b: &Command) -> Ordering {
        a.kind_priority()
            .cmp(&b.kind_priority())
            .then_with(|| a.sort_id().cmp(&b.sort_id()))
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.put_u32(s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(KernelError::Corruption("command payload underrun"));
    }
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(KernelError::Corruption("command payload underrun"));
    }
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(KernelError::Corruption("command payload underrun"));
    }
    Ok(buf.get_u64())
}

fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(KernelError::Corruption("bad bool byte in command payload")),
    }
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(KernelError::Corruption("command payload underrun"));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| KernelError::Corruption("non-utf8 token name"))
}

fn put_value(out: &mut Vec<u8>, value: &PropertyValue) {
    match value {
        PropertyValue::Bool(v) => {
            out.put_u8(0);
            out.put_u8(u8::from(*v));
        }
        PropertyValue::Int(v) => {
            out.put_u8(1);
            out.put_i64(*v);
        }
        PropertyValue::Float(v) => {
            out.put_u8(2);
            out.put_u64(v.to_bits());
        }
        PropertyValue::String(v) => {
            out.put_u8(3);
            put_string(out, v);
        }
        PropertyValue::Bytes(v) => {
            out.put_u8(4);
            out.put_u32(v.len() as u32);
            out.extend_from_slice(v);
        }
    }
}

fn get_value(buf: &mut &[u8]) -> Result<PropertyValue> {
    match get_u8(buf)? {
        0 => Ok(PropertyValue::Bool(get_bool(buf)?)),
        1 => Ok(PropertyValue::Int(get_u64(buf)? as i64)),
        2 => Ok(PropertyValue::Float(f64::from_bits(get_u64(buf)?))),
        3 => Ok(PropertyValue::String(get_string(buf)?)),
        4 => {
            let len = get_u32(buf)? as usize;
            if buf.remaining() < len {
                return Err(KernelError::Corruption("command payload underrun"));
            }
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            Ok(PropertyValue::Bytes(bytes))
        }
        _ => Err(KernelError::Corruption("unknown property value tag")),
    }
}

fn encode_node(out: &mut Vec<u8>, record: &NodeRecord) {
    out.put_u64(record.id.0);
    out.put_u8(u8::from(record.in_use));
    out.put_u8(u8::from(record.created));
    match &record.labels {
        LabelStorage::Inline(labels) => {
            out.put_u8(0);
            out.put_u8(labels.len() as u8);
            for label in labels {
                out.put_u32(label.0);
            }
        }
        LabelStorage::Dynamic(id) => {
            out.put_u8(1);
            out.put_u64(id.0);
        }
    }
}

fn decode_node(buf: &mut &[u8]) -> Result<NodeRecord> {
    let id = NodeId(get_u64(buf)?);
    let in_use = get_bool(buf)?;
    let created = get_bool(buf)?;
    let labels = match get_u8(buf)? {
        0 => {
            let count = get_u8(buf)? as usize;
            let mut labels = smallvec::SmallVec::new();
            for _ in 0..count {
                labels.push(LabelId(get_u32(buf)?));
            }
            LabelStorage::Inline(labels)
        }
        1 => LabelStorage::Dynamic(DynamicId(get_u64(buf)?)),
        _ => return Err(KernelError::Corruption("unknown label storage tag")),
    };
    Ok(NodeRecord {
        id,
        in_use,
        created,
        labels,
    })
}

fn encode_relationship(out: &mut Vec<u8>, record: &RelationshipRecord) {
    out.put_u64(record.id.0);
    out.put_u8(u8::from(record.in_use));
    out.put_u8(u8::from(record.created));
    out.put_u64(record.start_node.0);
    out.put_u64(record.end_node.0);
    out.put_u32(record.rel_type.0);
}

fn decode_relationship(buf: &mut &[u8]) -> Result<RelationshipRecord> {
    Ok(RelationshipRecord {
        id: RelId(get_u64(buf)?),
        in_use: get_bool(buf)?,
        created: get_bool(buf)?,
        start_node: NodeId(get_u64(buf)?),
        end_node: NodeId(get_u64(buf)?),
        rel_type: RelTypeId(get_u32(buf)?),
    })
}

fn encode_property(out: &mut Vec<u8>, record: &PropertyRecord) {
    match record.owner {
        PropertyOwner::Node(id) => {
            out.put_u8(0);
            out.put_u64(id.0);
        }
        PropertyOwner::Relationship(id) => {
            out.put_u8(1);
            out.put_u64(id.0);
        }
        PropertyOwner::Graph => out.put_u8(2),
    }
    out.put_u32(record.key.0);
    out.put_u8(u8::from(record.in_use));
    out.put_u8(u8::from(record.created));
    match &record.value {
        Some(value) => {
            out.put_u8(1);
            put_value(out, value);
        }
        None => out.put_u8(0),
    }
}

fn decode_property(buf: &mut &[u8]) -> Result<PropertyRecord> {
    let owner = match get_u8(buf)? {
        0 => PropertyOwner::Node(NodeId(get_u64(buf)?)),
        1 => PropertyOwner::Relationship(RelId(get_u64(buf)?)),
        2 => PropertyOwner::Graph,
        _ => return Err(KernelError::Corruption("unknown property owner tag")),
    };
    let key = PropKeyId(get_u32(buf)?);
    let in_use = get_bool(buf)?;
    let created = get_bool(buf)?;
    let value = match get_u8(buf)? {
        0 => None,
        1 => Some(get_value(buf)?),
        _ => return Err(KernelError::Corruption("bad optional value tag")),
    };
    Ok(PropertyRecord {
        owner,
        key,
        in_use,
        created,
        value,
    })
}

fn encode_dynamic(out: &mut Vec<u8>, record: &DynamicLabelRecord) {
    out.put_u64(record.id.0);
    out.put_u8(u8::from(record.in_use));
    out.put_u8(u8::from(record.created));
    out.put_u64(record.owner.0);
    out.put_u32(record.labels.len() as u32);
    for label in &record.labels {
        out.put_u32(label.0);
    }
}

fn decode_dynamic(buf: &mut &[u8]) -> Result<DynamicLabelRecord> {
    let id = DynamicId(get_u64(buf)?);
    let in_use = get_bool(buf)?;
    let created = get_bool(buf)?;
    let owner = NodeId(get_u64(buf)?);
    let count = get_u32(buf)? as usize;
    let mut labels = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        labels.push(LabelId(get_u32(buf)?));
    }
    Ok(DynamicLabelRecord {
        id,
        in_use,
        created,
        owner,
        labels,
    })
}

fn encode_schema_rule(out: &mut Vec<u8>, rule: &SchemaRule) {
    match rule {
        SchemaRule::Index {
            label,
            property_key,
        } => {
            out.put_u8(0);
            out.put_u32(label.0);
            out.put_u32(property_key.0);
        }
        SchemaRule::ConstraintIndex {
            label,
            property_key,
            owner,
        } => {
            out.put_u8(1);
            out.put_u32(label.0);
            out.put_u32(property_key.0);
            match owner {
                Some(owner) => {
                    out.put_u8(1);
                    out.put_u64(owner.0);
                }
                None => out.put_u8(0),
            }
        }
        SchemaRule::UniquenessConstraint {
            label,
            property_key,
            owned_index,
        } => {
            out.put_u8(2);
            out.put_u32(label.0);
            out.put_u32(property_key.0);
            out.put_u64(owned_index.0);
        }
    }
}

fn decode_schema_rule(buf: &mut &[u8]) -> Result<SchemaRule> {
    match get_u8(buf)? {
        0 => Ok(SchemaRule::Index {
            label: LabelId(get_u32(buf)?),
            property_key: PropKeyId(get_u32(buf)?),
        }),
        1 => {
            let label = LabelId(get_u32(buf)?);
            let property_key = PropKeyId(get_u32(buf)?);
            let owner = match get_u8(buf)? {
                0 => None,
                1 => Some(RuleId(get_u64(buf)?)),
                _ => return Err(KernelError::Corruption("bad optional owner tag")),
            };
            Ok(SchemaRule::ConstraintIndex {
                label,
                property_key,
                owner,
            })
        }
        2 => Ok(SchemaRule::UniquenessConstraint {
            label: LabelId(get_u32(buf)?),
            property_key: PropKeyId(get_u32(buf)?),
            owned_index: RuleId(get_u64(buf)?),
        }),
        _ => Err(KernelError::Corruption("unknown schema rule tag")),
    }
}

fn encode_schema_rule_record(out: &mut Vec<u8>, record: &SchemaRuleRecord) {
    out.put_u64(record.id.0);
    out.put_u8(u8::from(record.in_use));
    out.put_u8(u8::from(record.created));
    encode_schema_rule(out, &record.rule);
}

fn decode_schema_rule_record(buf: &mut &[u8]) -> Result<SchemaRuleRecord> {
    Ok(SchemaRuleRecord {
        id: RuleId(get_u64(buf)?),
        in_use: get_bool(buf)?,
        created: get_bool(buf)?,
        rule: decode_schema_rule(buf)?,
    })
}
