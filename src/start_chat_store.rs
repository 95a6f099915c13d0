//! Startup helpers for the conversation store.
//!
//! The store keeps no process-wide client: callers open a repository here (or
//! build one around their own [`TableProvider`]) and own its lifecycle.
//!
//! [`TableProvider`]: crate::conversation::table::TableProvider

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::conversation::core::config::ChatStoreConfig;
use crate::conversation::core::errors::StoreResult;
use crate::conversation::repository::ConversationRepository;
use crate::conversation::table::SqliteTableProvider;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (at least `info`).
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .try_init();
}

/// Open a repository backed by the `SQLite` table described in `config`.
///
/// # Errors
/// Returns an error if the configuration is invalid or the database cannot be opened.
pub async fn open_repository(config: &ChatStoreConfig) -> StoreResult<ConversationRepository> {
    config.validate()?;
    let provider = SqliteTableProvider::new(&config.storage).await?;
    tracing::info!(
        path = %config.storage.sqlite_path.display(),
        max_pages = config.listing.max_pages,
        "conversation store opened"
    );
    Ok(ConversationRepository::new(
        Arc::new(provider),
        config.listing.clone(),
    ))
}

/// Open a repository configured from `CHAT_STORE_*` environment variables.
///
/// # Errors
/// Returns an error if a variable is invalid or the database cannot be opened.
pub async fn open_repository_from_env() -> StoreResult<ConversationRepository> {
    let config = ChatStoreConfig::from_env()?;
    open_repository(&config).await
}
