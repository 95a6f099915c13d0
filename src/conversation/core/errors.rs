//! Error types for the conversation store.

use thiserror::Error;

use crate::conversation::table::TableError;

/// Conversation store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lookup, rename or delete matched no record.
    #[error("record not found: {0}")]
    RecordNotFound(String),
    /// The atomic write, an update or a delete was rejected by the table.
    #[error("write failed: {0}")]
    WriteFailed(#[source] TableError),
    /// A query or point read was rejected by the table.
    #[error("read failed: {0}")]
    ReadFailed(#[source] TableError),
    /// A sort key does not match the composite pattern.
    #[error("malformed key: {0}")]
    MalformedKey(String),
    /// Identifier rejected at construction.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    /// Message tree invariants violated.
    #[error("invalid conversation: {0}")]
    InvalidConversation(String),
    /// Stored attributes are missing or have the wrong type.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Table handle could not be obtained.
    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Convenience result alias for conversation store operations.
pub type StoreResult<T> = Result<T, StoreError>;
