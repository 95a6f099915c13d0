//! Core conversation store types, keys and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod keys;
pub mod model;

pub use config::{ChatStoreConfig, ListingConfig, StorageConfig};
pub use errors::{StoreError, StoreResult};
pub use ids::{BotId, ConversationId, UserId};
pub use model::{
    BotUsage, BulkDeleteOutcome, Content, Conversation, ConversationListing, ConversationSummary,
    Message, MessageMap, Role,
};
