//! Backing table contract and implementations.
//!
//! The conversation store talks to one key-value table through [`Table`]:
//! partition queries with byte-limited pages, an exact-match secondary index
//! on the sort key, all-or-nothing multi-item writes, and single-item
//! update/delete. A [`TableProvider`] hands out handles scoped to one user's
//! partition.

pub mod error;
pub mod item;
pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::conversation::core::ids::UserId;

pub use error::{TableError, TableResult};
pub use item::{Attributes, Item, PartitionQuery, PrimaryKey, QueryPage, WriteOp};
pub use memory::{InMemoryTable, InMemoryTableProvider};
pub use sqlite::{SqliteTable, SqliteTableProvider};

/// Boxed future type for table operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Single-table key-value store.
pub trait Table: Send + Sync {
    /// Read one page of a partition.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the partition is out of scope.
    fn query(&self, query: PartitionQuery) -> StoreFuture<'_, TableResult<QueryPage>>;

    /// Exact-match lookup on the sort key index, across partitions.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn query_sort_key_index(&self, sort_key: &str) -> StoreFuture<'_, TableResult<Vec<Item>>>;

    /// Read one item by primary key.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the partition is out of scope.
    fn get_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<Option<Item>>>;

    /// Apply every operation or none of them.
    ///
    /// # Errors
    /// Returns an error, with no operation applied, if any operation fails.
    fn transact_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, TableResult<()>>;

    /// Set attributes on an existing item, keeping the others.
    ///
    /// Unlike [`WriteOp::Update`], never creates an item.
    ///
    /// # Errors
    /// Returns [`TableError::ConditionFailed`] if the item does not exist, or an
    /// error if storage access fails or the partition is out of scope.
    fn update_item(&self, key: PrimaryKey, set: Attributes) -> StoreFuture<'_, TableResult<()>>;

    /// Remove one item if present.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the partition is out of scope.
    fn delete_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<()>>;
}

/// Source of table handles scoped to one user's partition.
pub trait TableProvider: Send + Sync {
    /// Handle that can only touch `user_id`'s partition.
    ///
    /// # Errors
    /// Returns an error if the handle cannot be obtained.
    fn table_for_user(&self, user_id: &UserId) -> TableResult<Arc<dyn Table>>;
}

/// Fail unless `partition` is the scoped partition.
pub(crate) fn authorize(scope: &str, partition: &str) -> TableResult<()> {
    if scope == partition {
        Ok(())
    } else {
        Err(TableError::AccessDenied {
            partition: partition.to_string(),
        })
    }
}
