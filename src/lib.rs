//! Tenebra is the transactional statement layer of an embedded graph
//! database: it turns logical graph operations (create node, set property,
//! add label, create index, ...) into a durable, atomic, ordered command
//! stream while enforcing schema invariants and giving callers a consistent
//! view of in-flight changes layered over committed storage.
//!
//! The crate is organised around a handful of collaborating pieces:
//!
//! - [`record`]: before/after record snapshots and the log commands derived
//!   from them,
//! - [`state`]: the per-transaction overlay ([`state::TxState`]) merged into
//!   every read,
//! - [`api`]: the capability traits a statement exposes to callers,
//! - [`kernel`]: the transaction and statement state machines,
//! - [`store`], [`log`], [`index`], [`locking`]: the collaborator contracts
//!   (storage backend, command sink, index providers, lock service) together
//!   with in-memory reference implementations.

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod kernel;
pub mod locking;
pub mod log;
pub mod record;
pub mod state;
pub mod store;
pub mod types;

pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use kernel::{Kernel, KernelStatement, KernelTransaction};
pub use types::{LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId, RuleId};
