//! Conversation persistence over a single multi-tenant key-value table.
//!
//! This module is organized into:
//! - `core`: configuration, errors, identifiers, key layout and domain model
//! - `table`: the backing table contract with `SQLite` and in-memory implementations
//! - `codec`: mapping between domain objects and table items
//! - `repository`: the `ConversationRepository` entry point
//! - `writer`, `reader`, `mutator`: its write, read and rename/delete paths

pub mod codec;
pub mod core;
pub mod mutator;
pub mod reader;
pub mod repository;
pub mod table;
pub mod writer;

pub use self::core::{
    BotId, BotUsage, BulkDeleteOutcome, ChatStoreConfig, Content, Conversation,
    ConversationId, ConversationListing, ConversationSummary, ListingConfig, Message,
    MessageMap, Role, StorageConfig, StoreError, StoreResult, UserId,
};
pub use repository::ConversationRepository;
pub use table::{
    InMemoryTableProvider, SqliteTableProvider, Table, TableError, TableProvider, TableResult,
};
pub use writer::now_seconds;
