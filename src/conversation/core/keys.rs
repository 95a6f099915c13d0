//! Key layout for the single backing table.
//!
//! Every record a user owns lives in the user's partition. The sort key tells
//! entity kinds apart:
//!
//! ```text
//! PK = {user}    SK = {user}#CONV#{conversation}   → conversation record
//! PK = {user}    SK = {user}#BOT#{bot}             → bot usage record
//! ```
//!
//! New entity kinds must pick a marker disjoint from `CONV` and `BOT`.

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{BotId, ConversationId, UserId};

/// Marker segment separating owner and id in conversation sort keys.
pub const CONVERSATION_MARKER: &str = "#CONV#";
/// Marker segment separating owner and id in bot usage sort keys.
pub const BOT_MARKER: &str = "#BOT#";

/// Partition key for every record owned by `user_id`.
#[must_use]
pub fn partition_key(user_id: &UserId) -> String {
    user_id.as_str().to_string()
}

/// Sort key of a conversation record: `"{user}#CONV#{conversation}"`.
#[must_use]
pub fn conversation_sort_key(user_id: &UserId, conversation_id: &ConversationId) -> String {
    format!("{user_id}{CONVERSATION_MARKER}{conversation_id}")
}

/// Prefix shared by all conversation sort keys of a user.
#[must_use]
pub fn conversation_sort_key_prefix(user_id: &UserId) -> String {
    format!("{user_id}{CONVERSATION_MARKER}")
}

/// Sort key of a bot usage record: `"{user}#BOT#{bot}"`.
#[must_use]
pub fn bot_sort_key(user_id: &UserId, bot_id: &BotId) -> String {
    format!("{user_id}{BOT_MARKER}{bot_id}")
}

/// Prefix shared by all bot usage sort keys of a user.
#[must_use]
pub fn bot_sort_key_prefix(user_id: &UserId) -> String {
    format!("{user_id}{BOT_MARKER}")
}

/// Extract the conversation id from a conversation sort key.
///
/// # Errors
/// Returns [`StoreError::MalformedKey`] if the key does not follow
/// `"{user}#CONV#{conversation}"` exactly once.
pub fn decompose_conversation_sort_key(sort_key: &str) -> StoreResult<ConversationId> {
    let id = split_marker(sort_key, CONVERSATION_MARKER)?;
    ConversationId::parse(id).map_err(|err| malformed(sort_key, &err.to_string()))
}

/// Extract the bot id from a bot usage sort key.
///
/// # Errors
/// Returns [`StoreError::MalformedKey`] if the key does not follow
/// `"{user}#BOT#{bot}"` exactly once.
pub fn decompose_bot_sort_key(sort_key: &str) -> StoreResult<BotId> {
    let id = split_marker(sort_key, BOT_MARKER)?;
    BotId::parse(id).map_err(|err| malformed(sort_key, &err.to_string()))
}

fn split_marker<'a>(sort_key: &'a str, marker: &str) -> StoreResult<&'a str> {
    let Some((owner, id)) = sort_key.split_once(marker) else {
        return Err(malformed(sort_key, &format!("missing {marker} marker")));
    };
    if owner.is_empty() {
        return Err(malformed(sort_key, "empty owner segment"));
    }
    if id.is_empty() {
        return Err(malformed(sort_key, "empty id segment"));
    }
    if id.contains(marker) {
        return Err(malformed(sort_key, &format!("{marker} marker appears twice")));
    }
    Ok(id)
}

fn malformed(sort_key: &str, reason: &str) -> StoreError {
    StoreError::MalformedKey(format!("{sort_key:?}: {reason}"))
}
