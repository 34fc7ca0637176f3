//! The transaction command log.
//!
//! Commit appends one entry per transaction: a header of transaction id and
//! command count, followed by the encoded command frames in their sorted
//! order. Replay decodes entries back out for recovery. A torn tail (any
//! truncation inside the trailing entry) drops that whole transaction;
//! everything before it replays normally.

use bytes::{Buf, BufMut};
use parking_lot::Mutex;

use crate::error::{KernelError, Result};
use crate::record::Command;

/// Entry header: transaction id (u64) plus command count (u32).
const ENTRY_HEADER_LEN: usize = 12;

/// Where committed command streams go.
pub trait CommandSink: Send + Sync {
    /// Appends one transaction's ordered commands.
    fn append(&self, tx_id: u64, commands: &[Command]) -> Result<()>;
}

/// One decoded log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TxEntry {
    /// The committing transaction's id.
    pub tx_id: u64,
    /// The sorted command stream.
    pub commands: Vec<Command>,
}

/// In-memory [`CommandSink`] holding the raw encoded log.
#[derive(Default)]
pub struct MemoryLog {
    buf: Mutex<Vec<u8>>,
}

impl MemoryLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the raw log bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    /// Total encoded length.
    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

impl CommandSink for MemoryLog {
    fn append(&self, tx_id: u64, commands: &[Command]) -> Result<()> {
        let count = u32::try_from(commands.len())
            .map_err(|_| KernelError::Invalid("transaction too large for one log entry".into()))?;
        let mut buf = self.buf.lock();
        buf.put_u64(tx_id);
        buf.put_u32(count);
        for command in commands {
            command.encode(&mut buf);
        }
        tracing::debug!(tx_id, commands = commands.len(), "log entry appended");
        Ok(())
    }
}

/// Decodes log entries from raw bytes, dropping the whole trailing
/// transaction if the tail is torn. Corruption anywhere other than plain
/// truncation is an error.
pub fn replay(bytes: &[u8]) -> Result<Vec<TxEntry>> {
    let mut buf = bytes;
    let mut entries = Vec::new();
    while buf.remaining() > 0 {
        if buf.remaining() < ENTRY_HEADER_LEN {
            tracing::warn!(
                trailing = buf.remaining(),
                "torn log tail, dropping trailing transaction"
            );
            break;
        }
        let tx_id = buf.get_u64();
        let count = buf.get_u32() as usize;
        let mut commands = Vec::with_capacity(count);
        let mut torn = false;
        for _ in 0..count {
            match Command::decode(&mut buf)? {
                Some(command) => commands.push(command),
                None => {
                    torn = true;
                    break;
                }
            }
        }
        if torn || commands.len() < count {
            tracing::warn!(tx_id, "torn log tail, dropping trailing transaction");
            break;
        }
        entries.push(TxEntry { tx_id, commands });
    }
    Ok(entries)
}
