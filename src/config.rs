//! Kernel tunables.
//!
//! `KernelConfig` follows the preset pattern of the storage configuration:
//! `default()` favours strictness (short lock waits, command-count ceiling),
//! the named constructors relax individual knobs. Configs round-trip through
//! TOML so embedders can ship them in a config file.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Tunables for transaction and statement behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Abort commit when a transaction has been open longer than this.
    /// `None` disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_timeout_ms: Option<u64>,
    /// Hard ceiling on the number of commands a single transaction may
    /// generate; guards against runaway bulk mutations.
    pub max_tx_commands: usize,
    /// How long a blocked lock acquisition waits before failing.
    pub lock_timeout_ms: u64,
    /// Batch size used when feeding an index populator.
    pub index_population_batch_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: None,
            max_tx_commands: 1 << 20,
            lock_timeout_ms: 10_000,
            index_population_batch_size: 1_000,
        }
    }
}

impl KernelConfig {
    /// Aggressive timeouts for interactive workloads.
    pub fn interactive() -> Self {
        Self {
            transaction_timeout_ms: Some(30_000),
            lock_timeout_ms: 2_000,
            ..Self::default()
        }
    }

    /// Relaxed limits for batch ingestion.
    pub fn bulk_load() -> Self {
        Self {
            transaction_timeout_ms: None,
            max_tx_commands: 1 << 26,
            lock_timeout_ms: 60_000,
            index_population_batch_size: 10_000,
        }
    }

    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| KernelError::Invalid(format!("bad kernel config: {e}")))
    }

    /// Serializes the config to TOML text.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| KernelError::Invalid(format!("unserializable kernel config: {e}")))
    }
}
