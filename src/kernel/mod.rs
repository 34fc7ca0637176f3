//! The transaction kernel: lifecycle state machine, statement handles,
//! the overlay-to-command bridge and the pre-commit integrity gate.

mod integrity;
mod record_state;
mod statement;
mod transaction;

pub use statement::{CloseableResource, KernelStatement};
pub use transaction::{Kernel, KernelTransaction, TerminationHandle, TransactionType};

pub(crate) use transaction::TransactionInner;
