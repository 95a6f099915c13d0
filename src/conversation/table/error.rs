//! Error types reported by table implementations.

use thiserror::Error;

/// Backing table error type.
#[derive(Debug, Error)]
pub enum TableError {
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Stored attributes could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A multi-item write was rolled back.
    #[error("transaction canceled at operation {index}: {reason}")]
    TransactionCanceled {
        /// Position of the failing operation.
        index: usize,
        /// Why it failed.
        reason: String,
    },
    /// A conditional update found no item to update.
    #[error("no item with sort key {sort_key:?} to update")]
    ConditionFailed {
        /// Sort key of the missing item.
        sort_key: String,
    },
    /// The handle is scoped to another partition.
    #[error("access denied to partition {partition:?}")]
    AccessDenied {
        /// Partition that was requested.
        partition: String,
    },
    /// Failure injected by a test table.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Convenience result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;
