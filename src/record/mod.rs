//! Record snapshots and the durable commands derived from them.
//!
//! A record is a fixed-shape storage entity (node, relationship, property,
//! schema rule, token). Commands pair the before and after image of one
//! record; diffing happens in the transaction record state, encoding and
//! ordering here.

mod command;
mod labels;
mod records;

pub use command::{Command, CommandSorter};
pub use labels::{NodeLabelsField, NODE_LABEL_INLINE_CAPACITY};
pub use records::{
    DynamicLabelRecord, LabelStorage, LabelTokenRecord, NodeRecord, PropertyOwner,
    PropertyRecord, PropKeyTokenRecord, RelTypeTokenRecord, RelationshipRecord,
    SchemaRuleRecord,
};
