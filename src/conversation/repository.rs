//! Conversation repository: the entry point of the store.
//!
//! Operations are split by concern across `writer`, `reader` and `mutator`;
//! this module holds the shared state they run on.

use std::sync::Arc;

use crate::conversation::core::config::ListingConfig;
use crate::conversation::core::errors::StoreResult;
use crate::conversation::core::ids::UserId;
use crate::conversation::table::{Table, TableProvider};

/// Conversation persistence over a single scoped key-value table.
///
/// The repository owns no connection of its own: the table provider is
/// injected by the caller, which also owns its lifecycle.
#[derive(Clone)]
pub struct ConversationRepository {
    tables: Arc<dyn TableProvider>,
    listing: ListingConfig,
}

impl ConversationRepository {
    /// Create a repository over `tables` with the given listing policy.
    #[must_use]
    pub fn new(tables: Arc<dyn TableProvider>, listing: ListingConfig) -> Self {
        Self { tables, listing }
    }

    /// Listing policy in effect.
    #[must_use]
    pub const fn listing(&self) -> &ListingConfig {
        &self.listing
    }

    /// Table handle scoped to `user_id`'s partition.
    pub(crate) fn table(&self, user_id: &UserId) -> StoreResult<Arc<dyn Table>> {
        Ok(self.tables.table_for_user(user_id)?)
    }
}
