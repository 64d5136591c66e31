//! Error types for ledger synchronization

use crate::types::LedgerHash;
use thiserror::Error;

/// Result type for ledger synchronization operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger synchronization errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB or another backend)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Transaction scope misuse or a failed commit
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Candidate ledger does not chain from the held ledger
    #[error("Chain mismatch: expected parent {expected}, got {found}")]
    ChainMismatch {
        /// Hash of the currently held ledger
        expected: LedgerHash,
        /// Parent hash carried by the candidate
        found: LedgerHash,
    },

    /// State tree has nodes that are not available locally
    #[error("Incomplete state: {0}")]
    IncompleteState(String),

    /// Persisted ledger data failed verification
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    /// Invariant violation (delta leaf absent from both trees, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed hash text
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
