//! Configuration for the conversation store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::{StoreError, StoreResult};

/// Environment variable overriding [`StorageConfig::sqlite_path`].
pub const ENV_SQLITE_PATH: &str = "CHAT_STORE_SQLITE_PATH";
/// Environment variable overriding [`StorageConfig::table_name`].
pub const ENV_TABLE: &str = "CHAT_STORE_TABLE";
/// Environment variable overriding [`StorageConfig::page_size_bytes`].
pub const ENV_PAGE_SIZE_BYTES: &str = "CHAT_STORE_PAGE_SIZE_BYTES";
/// Environment variable overriding [`ListingConfig::max_pages`].
pub const ENV_MAX_LIST_PAGES: &str = "CHAT_STORE_MAX_LIST_PAGES";

/// Top-level configuration for the conversation store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatStoreConfig {
    /// Backing table settings.
    pub storage: StorageConfig,
    /// Listing pagination settings.
    pub listing: ListingConfig,
}

impl ChatStoreConfig {
    /// Build a configuration from defaults overlaid with `CHAT_STORE_*` variables.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or the result is invalid.
    pub fn from_env() -> StoreResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_SQLITE_PATH) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(table) = std::env::var(ENV_TABLE) {
            config.storage.table_name = table;
        }
        if let Ok(raw) = std::env::var(ENV_PAGE_SIZE_BYTES) {
            config.storage.page_size_bytes = raw.parse().map_err(|_| {
                StoreError::InvalidConfig(format!("{ENV_PAGE_SIZE_BYTES} is not a number: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_LIST_PAGES) {
            config.listing.max_pages = raw.parse().map_err(|_| {
                StoreError::InvalidConfig(format!("{ENV_MAX_LIST_PAGES} is not a number: {raw}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> StoreResult<()> {
        if !is_identifier(&self.storage.table_name) {
            return Err(StoreError::InvalidConfig(format!(
                "storage.table_name must be an ASCII identifier, got {:?}",
                self.storage.table_name
            )));
        }

        if !is_identifier(&self.storage.sort_key_index) {
            return Err(StoreError::InvalidConfig(format!(
                "storage.sort_key_index must be an ASCII identifier, got {:?}",
                self.storage.sort_key_index
            )));
        }

        if self.storage.page_size_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "storage.page_size_bytes must be > 0".to_string(),
            ));
        }

        if self.listing.max_pages == 0 {
            return Err(StoreError::InvalidConfig(
                "listing.max_pages must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage configuration for the single backing table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path (`:memory:` for a private in-memory database).
    pub sqlite_path: PathBuf,
    /// Table holding every entity kind.
    pub table_name: String,
    /// Name of the secondary index on the sort key.
    pub sort_key_index: String,
    /// Maximum response size of one query page, measured on stored item size.
    pub page_size_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("chat_store.sqlite"),
            table_name: "conversations".to_string(),
            sort_key_index: "SKIndex".to_string(),
            page_size_bytes: 1024 * 1024,
        }
    }
}

/// Pagination policy for user-scoped listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Maximum number of pages fetched before the listing is truncated.
    pub max_pages: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self { max_pages: 5 }
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
