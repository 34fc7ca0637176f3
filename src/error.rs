//! Error taxonomy for the kernel.
//!
//! Variants fall into the categories callers are expected to dispatch on:
//! usage errors (`InvalidState`, `InvalidTransactionType`), recoverable
//! not-found lookups, eagerly-validated schema/token errors, the pre-commit
//! integrity gate, and resource failures that abort the whole transaction.

use std::io;

use thiserror::Error;

use crate::types::{LabelId, PropKeyId, RelTypeId};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Why a transaction was asked to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Explicitly terminated by the user or an administrator.
    Terminated,
    /// Terminated because the transaction exceeded its configured timeout.
    Timeout,
    /// Terminated because the database is shutting down.
    Shutdown,
}

/// All failures surfaced by the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Underlying storage or log I/O failed; the transaction must roll back.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Programming misuse: operating on a closed statement or transaction,
    /// double-closing, and similar lifecycle violations.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A data transaction attempted schema writes or vice versa.
    #[error("cannot perform {attempted} updates in a transaction that has performed {performed} updates")]
    InvalidTransactionType {
        /// The kind of write that was attempted.
        attempted: &'static str,
        /// The kind of write the transaction already performed.
        performed: &'static str,
    },

    /// The transaction was marked for termination.
    #[error("transaction terminated: {0:?}")]
    TransactionTerminated(TerminationReason),

    /// Lookup of an entity by id found nothing.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"node"` or `"schema rule"`.
        kind: &'static str,
        /// The id that missed.
        id: u64,
    },

    /// No label token with the given id exists.
    #[error("label {0} not found")]
    LabelNotFound(LabelId),

    /// No property key token with the given id exists.
    #[error("property key {0} not found")]
    PropertyKeyNotFound(PropKeyId),

    /// No relationship type token with the given id exists.
    #[error("relationship type {0} not found")]
    RelationshipTypeNotFound(RelTypeId),

    /// A schema rule already exists for the same schema.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Token name rejected before an id was allocated.
    #[error("illegal token name: {0:?}")]
    IllegalTokenName(String),

    /// The pre-commit integrity gate rejected the transaction.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A lock could not be acquired before the configured deadline.
    #[error("lock acquisition timed out on {0}")]
    LockTimeout(String),

    /// Decoded bytes were structurally invalid.
    #[error("corruption: {0}")]
    Corruption(&'static str),

    /// Invalid caller-supplied argument.
    #[error("invalid argument: {0}")]
    Invalid(String),
}

impl KernelError {
    /// Returns `true` for failures that must abort and roll back the whole
    /// transaction rather than being recovered at the call site.
    pub fn is_transaction_fatal(&self) -> bool {
        matches!(
            self,
            KernelError::Io(_)
                | KernelError::IntegrityViolation(_)
                | KernelError::Corruption(_)
                | KernelError::TransactionTerminated(_)
        )
    }
}
