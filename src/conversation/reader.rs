//! Read paths: bounded listing, point lookup through the sort key index, and
//! bot usage reads.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::conversation::codec::{self, SUMMARY_PROJECTION};
use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{BotId, ConversationId, UserId};
use crate::conversation::core::keys;
use crate::conversation::core::model::{BotUsage, Conversation, ConversationListing};
use crate::conversation::repository::ConversationRepository;
use crate::conversation::table::{Item, PartitionQuery, Table};

impl ConversationRepository {
    /// List a user's conversations, newest sort key first.
    ///
    /// Pages are followed until the table is exhausted or `listing.max_pages`
    /// pages have been read; in the latter case a warning is logged and the
    /// listing is returned with `truncated` set. Treat the result as "recent
    /// conversations", never as a complete count.
    ///
    /// Only the first page is read in full. Continuation pages fetch
    /// `CreateTime`, `Title` and `BotId`, and their summaries reuse the model of
    /// the first page's first conversation.
    ///
    /// # Errors
    /// Returns [`StoreError::ReadFailed`] if a query fails, or a decoding error
    /// for a malformed record.
    pub async fn find_conversations_by_user(
        &self,
        user_id: &UserId,
    ) -> StoreResult<ConversationListing> {
        debug!(user = %user_id, "finding conversations");
        let table = self.table(user_id)?;
        let query = PartitionQuery::new(keys::partition_key(user_id))
            .begins_with(keys::conversation_sort_key_prefix(user_id))
            .descending();

        let mut page = table
            .query(query.clone())
            .await
            .map_err(StoreError::ReadFailed)?;
        let mut listing = ConversationListing {
            conversations: page
                .items
                .iter()
                .map(codec::decode_summary)
                .collect::<StoreResult<Vec<_>>>()?,
            pages_fetched: 1,
            truncated: false,
        };
        let representative = listing
            .conversations
            .first()
            .map(|summary| summary.model.clone())
            .unwrap_or_default();

        let continuation = query.project(SUMMARY_PROJECTION);
        while let Some(start) = page.last_evaluated_key.take() {
            if listing.pages_fetched >= self.listing().max_pages {
                warn!(
                    user = %user_id,
                    max_pages = self.listing().max_pages,
                    "conversation listing truncated at page cap"
                );
                listing.truncated = true;
                break;
            }
            page = table
                .query(continuation.clone().start_after(start))
                .await
                .map_err(StoreError::ReadFailed)?;
            listing.pages_fetched += 1;
            for item in &page.items {
                listing
                    .conversations
                    .push(codec::decode_projected_summary(item, &representative)?);
            }
        }

        debug!(
            user = %user_id,
            found = listing.conversations.len(),
            pages = listing.pages_fetched,
            "found conversations"
        );
        Ok(listing)
    }

    /// Load one conversation, message tree included.
    ///
    /// # Errors
    /// Returns [`StoreError::RecordNotFound`] if no record has the conversation's
    /// sort key.
    pub async fn find_conversation_by_id(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> StoreResult<Conversation> {
        debug!(user = %user_id, conversation = %conversation_id, "finding conversation");
        let table = self.table(user_id)?;
        let item = resolve_conversation(table.as_ref(), user_id, conversation_id).await?;
        codec::decode_conversation(&item)
    }

    /// Read the last-used marker of one bot.
    ///
    /// # Errors
    /// Returns [`StoreError::ReadFailed`] if the read fails.
    pub async fn find_bot_usage(
        &self,
        user_id: &UserId,
        bot_id: &BotId,
    ) -> StoreResult<Option<BotUsage>> {
        debug!(user = %user_id, bot = %bot_id, "finding bot usage");
        let table = self.table(user_id)?;
        let item = table
            .get_item(codec::bot_key(user_id, bot_id))
            .await
            .map_err(StoreError::ReadFailed)?;
        match item {
            Some(item) => codec::decode_bot_usage(&item),
            None => Ok(None),
        }
    }

    /// Bots the user has talked to, most recently used first.
    ///
    /// Subject to the same page cap as conversation listings.
    ///
    /// # Errors
    /// Returns [`StoreError::ReadFailed`] if a query fails.
    pub async fn list_bot_usage(&self, user_id: &UserId) -> StoreResult<Vec<BotUsage>> {
        debug!(user = %user_id, "listing bot usage");
        let table = self.table(user_id)?;
        let items = self
            .collect_pages(
                &table,
                PartitionQuery::new(keys::partition_key(user_id))
                    .begins_with(keys::bot_sort_key_prefix(user_id)),
            )
            .await?;

        let mut usage = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(entry) = codec::decode_bot_usage(item)? {
                usage.push(entry);
            }
        }
        usage.sort_by(|a, b| b.last_bot_used.total_cmp(&a.last_bot_used));
        Ok(usage)
    }

    async fn collect_pages(
        &self,
        table: &Arc<dyn Table>,
        first: PartitionQuery,
    ) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;
        while let Some(request) = next.take() {
            if pages >= self.listing().max_pages {
                warn!(
                    partition = %request.partition_key,
                    max_pages = self.listing().max_pages,
                    "listing truncated at page cap"
                );
                break;
            }
            let page = table
                .query(request.clone())
                .await
                .map_err(StoreError::ReadFailed)?;
            pages += 1;
            items.extend(page.items);
            next = page.last_evaluated_key.map(|key| request.start_after(key));
        }
        Ok(items)
    }
}

/// Find a conversation record through the sort key index.
///
/// Sort keys are unique by construction; the first match wins.
pub(crate) async fn resolve_conversation(
    table: &dyn Table,
    user_id: &UserId,
    conversation_id: &ConversationId,
) -> StoreResult<Item> {
    let sort_key = keys::conversation_sort_key(user_id, conversation_id);
    table
        .query_sort_key_index(&sort_key)
        .await
        .map_err(StoreError::ReadFailed)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            StoreError::RecordNotFound(format!("no conversation found with id {conversation_id}"))
        })
}

#[cfg(test)]
mod tests {
    use crate::conversation::codec::{self, LAST_BOT_USED};
    use crate::conversation::core::errors::StoreError;
    use crate::conversation::core::ids::{BotId, ConversationId};
    use crate::conversation::core::model::fixtures::three_message_conversation;
    use crate::conversation::repository::test_support::{Warnings, in_memory, user};
    use crate::conversation::table::Item;

    #[tokio::test]
    async fn test_listing_is_descending_by_sort_key() {
        let (repository, _provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        for id in ["conv-b", "conv-a", "conv-c"] {
            repository
                .store_conversation(&owner, &three_message_conversation(id, None))
                .await
                .unwrap();
        }
        repository
            .store_conversation(&user("user-2"), &three_message_conversation("conv-z", None))
            .await
            .unwrap();

        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        let ids: Vec<_> = listing
            .conversations
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["conv-c", "conv-b", "conv-a"]);
        assert_eq!(listing.pages_fetched, 1);
        assert!(!listing.truncated);
        assert_eq!(listing.conversations[0].model, "claude-v3-haiku");
    }

    #[tokio::test]
    async fn test_listing_excludes_bot_usage_records() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        repository
            .store_conversation(&owner, &three_message_conversation("conv-1", Some("bot-1")))
            .await
            .unwrap();
        assert_eq!(provider.len().await, 2);

        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        assert_eq!(listing.conversations.len(), 1);
        assert_eq!(listing.conversations[0].bot_id.as_ref().unwrap().as_str(), "bot-1");
    }

    #[tokio::test]
    async fn test_listing_stops_at_page_cap() {
        // One conversation per page.
        let (repository, provider) = in_memory(1, 5);
        let owner = user("user-1");
        for n in 0..8 {
            repository
                .store_conversation(&owner, &three_message_conversation(&format!("conv-{n}"), None))
                .await
                .unwrap();
        }

        let (warnings, _guard) = Warnings::capture();
        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        assert!(listing.truncated);
        assert_eq!(listing.pages_fetched, 5);
        assert_eq!(provider.query_calls(), 5);
        assert_eq!(
            warnings.messages(),
            vec!["conversation listing truncated at page cap".to_string()]
        );

        let ids: Vec<_> = listing
            .conversations
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["conv-7", "conv-6", "conv-5", "conv-4", "conv-3"]);
    }

    #[tokio::test]
    async fn test_listing_exactly_at_cap_is_complete() {
        let (repository, _provider) = in_memory(1, 3);
        let owner = user("user-1");
        for n in 0..3 {
            repository
                .store_conversation(&owner, &three_message_conversation(&format!("conv-{n}"), None))
                .await
                .unwrap();
        }
        let (warnings, _guard) = Warnings::capture();
        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        assert_eq!(listing.conversations.len(), 3);
        assert_eq!(listing.pages_fetched, 3);
        assert!(!listing.truncated);
        assert!(warnings.messages().is_empty());
    }

    #[tokio::test]
    async fn test_continuation_pages_reuse_first_model() {
        let (repository, _provider) = in_memory(1, 5);
        let owner = user("user-1");
        let mut older = three_message_conversation("conv-1", Some("bot-1"));
        if let Some(a1) = older.message_map.get_mut("a1") {
            a1.model = "older-model".to_string();
        }
        let mut newer = three_message_conversation("conv-2", None);
        if let Some(a1) = newer.message_map.get_mut("a1") {
            a1.model = "newer-model".to_string();
        }
        repository.store_conversation(&owner, &older).await.unwrap();
        repository.store_conversation(&owner, &newer).await.unwrap();

        let listing = repository.find_conversations_by_user(&owner).await.unwrap();
        assert_eq!(listing.pages_fetched, 2);
        assert_eq!(listing.conversations[0].model, "newer-model");
        assert_eq!(listing.conversations[1].model, "newer-model");
        assert_eq!(listing.conversations[1].title, "Greeting");
        assert_eq!(listing.conversations[1].bot_id.as_ref().unwrap().as_str(), "bot-1");
    }

    #[tokio::test]
    async fn test_empty_user_lists_nothing() {
        let (repository, _provider) = in_memory(1024, 5);
        let listing = repository
            .find_conversations_by_user(&user("nobody"))
            .await
            .unwrap();
        assert!(listing.is_empty());
        assert!(!listing.truncated);
    }

    #[tokio::test]
    async fn test_lookup_of_missing_id_is_not_found() {
        let (repository, _provider) = in_memory(1024, 5);
        let err = repository
            .find_conversation_by_id(&user("user-1"), &ConversationId::parse("nope").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_is_isolated_per_user() {
        let (repository, _provider) = in_memory(1024 * 1024, 5);
        let conversation = three_message_conversation("conv-1", None);
        repository
            .store_conversation(&user("user-1"), &conversation)
            .await
            .unwrap();
        let err = repository
            .find_conversation_by_id(&user("user-2"), &conversation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_bot_usage_reads() {
        let (repository, provider) = in_memory(1024 * 1024, 5);
        let owner = user("user-1");
        repository
            .store_conversation(&owner, &three_message_conversation("conv-1", Some("bot-a")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repository
            .store_conversation(&owner, &three_message_conversation("conv-2", Some("bot-b")))
            .await
            .unwrap();
        // A bot record that was never used.
        let idle = BotId::parse("bot-idle").unwrap();
        provider
            .seed(Item::new(codec::bot_key(&owner, &idle), Default::default()))
            .await;

        let bot_a = BotId::parse("bot-a").unwrap();
        let usage = repository.find_bot_usage(&owner, &bot_a).await.unwrap().unwrap();
        assert_eq!(usage.bot_id, bot_a);
        assert!(repository.find_bot_usage(&owner, &idle).await.unwrap().is_none());
        assert!(
            repository
                .find_bot_usage(&owner, &BotId::parse("bot-unknown").unwrap())
                .await
                .unwrap()
                .is_none()
        );

        let listed = repository.list_bot_usage(&owner).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|u| u.bot_id.as_str()).collect();
        assert_eq!(ids, vec!["bot-b", "bot-a"]);
        let stored = provider
            .item(&codec::bot_key(&owner, &bot_a))
            .await
            .unwrap();
        assert!(stored.attributes[LAST_BOT_USED].is_number());
    }
}
