//! Atomic conversation writes.

use chrono::Utc;
use tracing::debug;

use crate::conversation::codec;
use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::UserId;
use crate::conversation::core::model::Conversation;
use crate::conversation::repository::ConversationRepository;
use crate::conversation::table::WriteOp;

/// Current time in fractional seconds since the Unix epoch.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl ConversationRepository {
    /// Create or fully replace a conversation, bumping its bot's last-used marker.
    ///
    /// The conversation record and, when `bot_id` is set, the bot usage record
    /// are written in one transaction: both land or neither does. The whole
    /// message tree is rewritten on every call. Failures are not retried.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidConversation`] if the tree is inconsistent,
    /// or [`StoreError::WriteFailed`] if the table rejects the transaction.
    pub async fn store_conversation(
        &self,
        user_id: &UserId,
        conversation: &Conversation,
    ) -> StoreResult<()> {
        debug!(user = %user_id, conversation = %conversation.id, "storing conversation");
        conversation.validate()?;

        let mut ops = vec![WriteOp::Put(codec::encode_conversation(
            user_id,
            conversation,
        )?)];
        if let Some(bot_id) = &conversation.bot_id {
            ops.push(WriteOp::Update {
                key: codec::bot_key(user_id, bot_id),
                set: codec::bot_usage_update(now_seconds()),
            });
        }

        let table = self.table(user_id)?;
        table
            .transact_write(ops)
            .await
            .map_err(StoreError::WriteFailed)
    }
}
