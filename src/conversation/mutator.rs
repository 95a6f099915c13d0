//! Title rename and deletion.

use serde_json::json;
use tracing::{debug, warn};

use crate::conversation::codec::TITLE;
use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{ConversationId, UserId};
use crate::conversation::core::keys;
use crate::conversation::core::model::BulkDeleteOutcome;
use crate::conversation::reader::resolve_conversation;
use crate::conversation::repository::ConversationRepository;
use crate::conversation::table::{Attributes, PrimaryKey, TableError};

impl ConversationRepository {
    /// Rename a conversation, leaving every other attribute untouched.
    ///
    /// The update only applies to an existing record: a conversation deleted
    /// between the index lookup and the update is reported as missing rather
    /// than recreated with a title alone.
    ///
    /// # Errors
    /// Returns [`StoreError::RecordNotFound`] if the conversation does not exist,
    /// or [`StoreError::WriteFailed`] if the update is rejected.
    pub async fn change_title(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        new_title: &str,
    ) -> StoreResult<()> {
        debug!(user = %user_id, conversation = %conversation_id, title = new_title, "changing title");
        let table = self.table(user_id)?;
        let item = resolve_conversation(table.as_ref(), user_id, conversation_id).await?;

        let mut set = Attributes::new();
        set.insert(TITLE.to_string(), json!(new_title));
        table
            .update_item(item.key, set)
            .await
            .map_err(|err| match err {
                TableError::ConditionFailed { .. } => StoreError::RecordNotFound(format!(
                    "conversation {conversation_id} was deleted before its title changed"
                )),
                other => StoreError::WriteFailed(other),
            })
    }

    /// Delete one conversation. Its bot usage record is kept.
    ///
    /// # Errors
    /// Returns [`StoreError::RecordNotFound`] if the conversation does not exist,
    /// or [`StoreError::WriteFailed`] if the delete is rejected.
    pub async fn delete_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> StoreResult<()> {
        debug!(user = %user_id, conversation = %conversation_id, "deleting conversation");
        let table = self.table(user_id)?;
        let item = resolve_conversation(table.as_ref(), user_id, conversation_id).await?;
        table
            .delete_item(item.key)
            .await
            .map_err(StoreError::WriteFailed)
    }

    /// Delete every conversation the listing returns, one request at a time.
    ///
    /// Bounded by the same page cap as [`Self::find_conversations_by_user`]:
    /// when the listing is truncated, conversations beyond the cap survive and
    /// the outcome reports `truncated`. Not atomic: a failure partway leaves
    /// earlier deletions in place.
    ///
    /// # Errors
    /// Returns [`StoreError::RecordNotFound`] if the user has no conversation,
    /// or [`StoreError::WriteFailed`] on the first rejected delete.
    pub async fn delete_all_conversations_for_user(
        &self,
        user_id: &UserId,
    ) -> StoreResult<BulkDeleteOutcome> {
        debug!(user = %user_id, "deleting all conversations");
        let listing = self.find_conversations_by_user(user_id).await?;
        if listing.is_empty() {
            return Err(StoreError::RecordNotFound(format!(
                "no conversations found for user {user_id}"
            )));
        }
        if listing.truncated {
            warn!(
                user = %user_id,
                listed = listing.conversations.len(),
                "listing truncated; conversations beyond the page cap will remain"
            );
        }

        let table = self.table(user_id)?;
        let mut outcome = BulkDeleteOutcome {
            deleted: 0,
            truncated: listing.truncated,
        };
        for summary in &listing.conversations {
            let key = PrimaryKey::new(
                keys::partition_key(user_id),
                keys::conversation_sort_key(user_id, &summary.id),
            );
            table
                .delete_item(key)
                .await
                .map_err(StoreError::WriteFailed)?;
            outcome.deleted += 1;
        }

        debug!(user = %user_id, deleted = outcome.deleted, "deleted conversations");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::conversation::codec;
    use crate::conversation::core::config::ListingConfig;
    use crate::conversation::core::errors::StoreError;
    use crate::conversation::core::ids::{BotId, ConversationId, UserId};
    use crate::conversation::core::model::fixtures::three_message_conversation;
    use crate::conversation::repository::ConversationRepository;
    use crate::conversation::repository::test_support::{Warnings, in_memory, user};
    use crate::conversation::table::{
        Attributes, InMemoryTableProvider, Item, PartitionQuery, PrimaryKey, QueryPage,
        StoreFuture, Table, TableProvider, TableResult, WriteOp,
    };

    /// Deletes whatever the sort key index resolves, right after resolving it.
    struct VanishingTable {
        inner: Arc<dyn Table>,
    }

    impl Table for VanishingTable {
        fn query(&self, query: PartitionQuery) -> StoreFuture<'_, TableResult<QueryPage>> {
            self.inner.query(query)
        }

        fn query_sort_key_index(&self, sort_key: &str) -> StoreFuture<'_, TableResult<Vec<Item>>> {
            let sort_key = sort_key.to_string();
            Box::pin(async move {
                let found = self.inner.query_sort_key_index(&sort_key).await?;
                for item in &found {
                    self.inner.delete_item(item.key.clone()).await?;
                }
                Ok(found)
            })
        }

        fn get_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<Option<Item>>> {
            self.inner.get_item(key)
        }

        fn transact_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, TableResult<()>> {
            self.inner.transact_write(ops)
        }

        fn update_item(&self, key: PrimaryKey, set: Attributes) -> StoreFuture<'_, TableResult<()>> {
            self.inner.update_item(key, set)
        }

        fn delete_item(&self, key: PrimaryKey) -> StoreFuture<'_, TableResult<()>> {
            self.inner.delete_item(key)
        }
    }

    struct VanishingProvider(InMemoryTableProvider);

    impl TableProvider for VanishingProvider {
        fn table_for_user(&self, user_id: &UserId) -> TableResult<Arc<dyn Table>> {
            Ok(Arc::new(VanishingTable {
                inner: self.0.table_for_user(user_id)?,
            }))
        }
    }

    #[tokio::test]
    async fn test_change_title_keeps_other_fields() {
        let (repository, _provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        let conversation = three_message_conversation("conv-1", Some("bot-1"));
        repository.store_conversation(&owner, &conversation).await.unwrap();

        repository
            .change_title(&owner, &conversation.id, "New Title")
            .await
            .unwrap();

        let stored = repository
            .find_conversation_by_id(&owner, &conversation.id)
            .await
            .unwrap();
        assert_eq!(stored.title, "New Title");
        let mut expected = conversation.clone();
        expected.title = "New Title".to_string();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_change_title_of_concurrently_deleted_leaves_no_record() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        let conversation = three_message_conversation("conv-1", None);
        repository.store_conversation(&owner, &conversation).await.unwrap();

        let racing = ConversationRepository::new(
            Arc::new(VanishingProvider(provider.clone())),
            ListingConfig::default(),
        );
        let err = racing
            .change_title(&owner, &conversation.id, "New Title")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));

        assert!(provider.is_empty().await);
        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_change_title_of_missing_is_not_found() {
        let (repository, provider) = in_memory(1024, 5);
        let err = repository
            .change_title(&user("user-1"), &ConversationId::parse("nope").unwrap(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_then_lookup_is_not_found() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        let conversation = three_message_conversation("conv-1", Some("bot-1"));
        repository.store_conversation(&owner, &conversation).await.unwrap();

        repository
            .delete_conversation(&owner, &conversation.id)
            .await
            .unwrap();

        let err = repository
            .find_conversation_by_id(&owner, &conversation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));

        let bot = BotId::parse("bot-1").unwrap();
        assert!(provider.item(&codec::bot_key(&owner, &bot)).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (repository, _provider) = in_memory(1024, 5);
        let err = repository
            .delete_conversation(&user("user-1"), &ConversationId::parse("nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_all_removes_only_conversations() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        for id in ["conv-1", "conv-2"] {
            repository
                .store_conversation(&owner, &three_message_conversation(id, Some("bot-1")))
                .await
                .unwrap();
        }
        repository
            .store_conversation(&user("user-2"), &three_message_conversation("conv-3", None))
            .await
            .unwrap();

        let (warnings, _guard) = Warnings::capture();
        let outcome = repository
            .delete_all_conversations_for_user(&owner)
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(!outcome.truncated);
        assert!(warnings.messages().is_empty());

        // user-2's conversation and user-1's bot usage remain.
        assert_eq!(provider.len().await, 2);
        let err = repository
            .delete_all_conversations_for_user(&owner)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_all_is_incomplete_past_page_cap() {
        let (repository, _provider) = in_memory(1, 2);
        let owner = user("user-1");
        for n in 0..3 {
            repository
                .store_conversation(&owner, &three_message_conversation(&format!("conv-{n}"), None))
                .await
                .unwrap();
        }

        let (warnings, _guard) = Warnings::capture();
        let outcome = repository
            .delete_all_conversations_for_user(&owner)
            .await
            .unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(outcome.truncated);
        assert_eq!(
            warnings.messages(),
            vec![
                "conversation listing truncated at page cap".to_string(),
                "listing truncated; conversations beyond the page cap will remain".to_string(),
            ]
        );

        let remaining = repository.find_conversations_by_user(&owner).await.unwrap();
        let ids: Vec<_> = remaining
            .conversations
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["conv-0"]);
    }

    #[tokio::test]
    async fn test_delete_all_failure_keeps_earlier_deletions() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        for n in 0..3 {
            repository
                .store_conversation(&owner, &three_message_conversation(&format!("conv-{n}"), None))
                .await
                .unwrap();
        }
        provider.fail_delete_after(1).await;

        let err = repository
            .delete_all_conversations_for_user(&owner)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert_eq!(provider.len().await, 2);
    }
}
