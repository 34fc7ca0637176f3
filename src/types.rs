//! Identifier newtypes and property values shared by every layer.
//!
//! All entities are addressed by unsigned integer ids. The reserved maximum
//! value of each id space is the "no such entity" sentinel, exposed as the
//! associated `NONE` constant instead of leaking raw `MAX` comparisons into
//! caller code.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $raw:ty) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        pub struct $name(pub $raw);

        impl $name {
            /// Sentinel meaning "no such entity / not yet resolved".
            pub const NONE: Self = Self(<$raw>::MAX);

            /// Returns `true` when this id is the [`Self::NONE`] sentinel.
            pub const fn is_none(self) -> bool {
                self.0 == <$raw>::MAX
            }

            /// Returns `true` when this id refers to a real entity.
            pub const fn is_some(self) -> bool {
                !self.is_none()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$raw> for $name {
            fn from(value: $raw) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $raw {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

entity_id!(
    /// A node id.
    NodeId, u64
);
entity_id!(
    /// A relationship id.
    RelId, u64
);
entity_id!(
    /// A schema rule id (indexes and constraints share this id space).
    RuleId, u64
);
entity_id!(
    /// A dynamic label overflow record id.
    DynamicId, u64
);
entity_id!(
    /// A label token id.
    LabelId, u32
);
entity_id!(
    /// A property key token id.
    PropKeyId, u32
);
entity_id!(
    /// A relationship type token id.
    RelTypeId, u32
);

/// A property value as stored on nodes, relationships and the graph itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// Compares two values of the same variant; cross-variant comparisons
    /// yield `None`.
    pub fn partial_cmp_value(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.partial_cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.partial_cmp(b),
            (PropertyValue::String(a), PropertyValue::String(b)) => a.partial_cmp(b),
            (PropertyValue::Bytes(a), PropertyValue::Bytes(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Deterministic byte image of the value, used for index-entry resource
    /// hashing and command encoding. The leading tag byte keeps variants
    /// from colliding.
    pub fn to_index_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            PropertyValue::Bool(v) => {
                out.push(0);
                out.push(u8::from(*v));
            }
            PropertyValue::Int(v) => {
                out.push(1);
                out.extend_from_slice(&v.to_be_bytes());
            }
            PropertyValue::Float(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            PropertyValue::String(v) => {
                out.push(3);
                out.extend_from_slice(v.as_bytes());
            }
            PropertyValue::Bytes(v) => {
                out.push(4);
                out.extend_from_slice(v);
            }
        }
        out
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}
