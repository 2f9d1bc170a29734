//! Durable ledger
//!
//! Players, round outcomes and session snapshots in header-first
//! delimited text files, guarded by advisory file locks and written
//! behind the round engine by a single writer task.

mod codec;
mod lock;
mod outbox;
mod records;
mod store;

pub use codec::{decode_rows, encode_rows};
pub use lock::{FileLock, LockPolicy};
pub use outbox::{LedgerOutbox, LedgerWrite, LedgerWriter, WriterStats};
pub use records::{LedgerRow, PlayerRecord, RoundOutcomeRecord, SessionRecord};
pub use store::{Ledger, PLAYERS_FILE, ROUNDS_FILE, SESSIONS_FILE};

use std::path::PathBuf;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("lock on {} still held after {attempts} attempts", path.display())]
    LockContended { path: PathBuf, attempts: u32 },

    #[error("malformed row in {} at line {line}: {reason}", file.display())]
    Malformed {
        file: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("ledger writer has shut down")]
    WriterClosed,
}
