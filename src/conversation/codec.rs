//! Mapping between domain objects and table items.
//!
//! Attribute layout of a conversation record:
//!
//! | attribute       | type            |
//! |-----------------|-----------------|
//! | `Title`         | string          |
//! | `CreateTime`    | number          |
//! | `MessageMap`    | JSON string     |
//! | `LastMessageId` | string          |
//! | `BotId`         | string or null  |
//!
//! A bot usage record carries `LastBotUsed` (number).

use serde_json::{Value, json};

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{BotId, UserId};
use crate::conversation::core::keys;
use crate::conversation::core::model::{
    BotUsage, Conversation, ConversationSummary, MessageMap, representative_model,
};
use crate::conversation::table::{Attributes, Item, PrimaryKey};

/// Conversation title attribute.
pub const TITLE: &str = "Title";
/// Conversation creation time attribute.
pub const CREATE_TIME: &str = "CreateTime";
/// Serialized message tree attribute.
pub const MESSAGE_MAP: &str = "MessageMap";
/// Last message id attribute.
pub const LAST_MESSAGE_ID: &str = "LastMessageId";
/// Associated bot attribute.
pub const BOT_ID: &str = "BotId";
/// Bot usage timestamp attribute.
pub const LAST_BOT_USED: &str = "LastBotUsed";

/// Attributes fetched for continuation pages of a listing.
pub const SUMMARY_PROJECTION: [&str; 3] = [CREATE_TIME, TITLE, BOT_ID];

/// Primary key of a conversation record.
#[must_use]
pub fn conversation_key(user_id: &UserId, conversation: &Conversation) -> PrimaryKey {
    PrimaryKey::new(
        keys::partition_key(user_id),
        keys::conversation_sort_key(user_id, &conversation.id),
    )
}

/// Primary key of a bot usage record.
#[must_use]
pub fn bot_key(user_id: &UserId, bot_id: &BotId) -> PrimaryKey {
    PrimaryKey::new(
        keys::partition_key(user_id),
        keys::bot_sort_key(user_id, bot_id),
    )
}

/// Encode a full conversation record.
///
/// # Errors
/// Returns an error if the message tree cannot be serialized.
pub fn encode_conversation(user_id: &UserId, conversation: &Conversation) -> StoreResult<Item> {
    let mut attributes = Attributes::new();
    attributes.insert(TITLE.to_string(), json!(conversation.title));
    attributes.insert(CREATE_TIME.to_string(), json!(conversation.create_time));
    attributes.insert(
        MESSAGE_MAP.to_string(),
        Value::String(serde_json::to_string(&conversation.message_map)?),
    );
    attributes.insert(
        LAST_MESSAGE_ID.to_string(),
        json!(conversation.last_message_id),
    );
    attributes.insert(
        BOT_ID.to_string(),
        conversation
            .bot_id
            .as_ref()
            .map_or(Value::Null, |bot| json!(bot.as_str())),
    );
    Ok(Item::new(conversation_key(user_id, conversation), attributes))
}

/// Attributes setting a bot's last-used marker.
#[must_use]
pub fn bot_usage_update(used_at: f64) -> Attributes {
    let mut set = Attributes::new();
    set.insert(LAST_BOT_USED.to_string(), json!(used_at));
    set
}

/// Decode a full conversation record, message tree included.
///
/// # Errors
/// Returns an error if the key is malformed or an attribute is missing or mistyped.
pub fn decode_conversation(item: &Item) -> StoreResult<Conversation> {
    Ok(Conversation {
        id: keys::decompose_conversation_sort_key(&item.key.sk)?,
        title: string_attr(item, TITLE)?.to_string(),
        create_time: number_attr(item, CREATE_TIME)?,
        message_map: message_map_attr(item)?,
        last_message_id: string_attr(item, LAST_MESSAGE_ID)?.to_string(),
        bot_id: bot_attr(item)?,
    })
}

/// Decode a summary from a full record; the model comes from `LastMessageId`.
///
/// # Errors
/// Returns an error if the record is malformed or its last message is not in the tree.
pub fn decode_summary(item: &Item) -> StoreResult<ConversationSummary> {
    let message_map = message_map_attr(item)?;
    let last_message_id = string_attr(item, LAST_MESSAGE_ID)?;
    let model = representative_model(&message_map, last_message_id).ok_or_else(|| {
        StoreError::InvalidRecord(format!(
            "{}: last message {last_message_id} is not in the message map",
            item.key.sk
        ))
    })?;
    summary_with_model(item, model.to_string())
}

/// Decode a summary from a projected record, using a model supplied by the caller.
///
/// # Errors
/// Returns an error if the key is malformed or an attribute is missing or mistyped.
pub fn decode_projected_summary(item: &Item, model: &str) -> StoreResult<ConversationSummary> {
    summary_with_model(item, model.to_string())
}

/// Decode a bot usage record; `None` when it carries no `LastBotUsed`.
///
/// # Errors
/// Returns an error if the key is malformed or `LastBotUsed` is not a number.
pub fn decode_bot_usage(item: &Item) -> StoreResult<Option<BotUsage>> {
    let bot_id = keys::decompose_bot_sort_key(&item.key.sk)?;
    match item.attributes.get(LAST_BOT_USED) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => Ok(Some(BotUsage {
            bot_id,
            last_bot_used: number_attr(item, LAST_BOT_USED)?,
        })),
    }
}

fn summary_with_model(item: &Item, model: String) -> StoreResult<ConversationSummary> {
    Ok(ConversationSummary {
        id: keys::decompose_conversation_sort_key(&item.key.sk)?,
        create_time: number_attr(item, CREATE_TIME)?,
        title: string_attr(item, TITLE)?.to_string(),
        model,
        bot_id: bot_attr(item)?,
    })
}

fn attr<'a>(item: &'a Item, name: &str) -> StoreResult<&'a Value> {
    item.attributes
        .get(name)
        .ok_or_else(|| invalid(item, &format!("missing {name}")))
}

fn string_attr<'a>(item: &'a Item, name: &str) -> StoreResult<&'a str> {
    attr(item, name)?
        .as_str()
        .ok_or_else(|| invalid(item, &format!("{name} is not a string")))
}

fn number_attr(item: &Item, name: &str) -> StoreResult<f64> {
    attr(item, name)?
        .as_f64()
        .ok_or_else(|| invalid(item, &format!("{name} is not a number")))
}

fn message_map_attr(item: &Item) -> StoreResult<MessageMap> {
    Ok(serde_json::from_str(string_attr(item, MESSAGE_MAP)?)?)
}

fn bot_attr(item: &Item) -> StoreResult<Option<BotId>> {
    match item.attributes.get(BOT_ID) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.is_empty() => Ok(None),
        Some(Value::String(raw)) => Ok(Some(BotId::parse(raw.as_str())?)),
        Some(_) => Err(invalid(item, "BotId is not a string")),
    }
}

fn invalid(item: &Item, reason: &str) -> StoreError {
    StoreError::InvalidRecord(format!("{}: {reason}", item.key.sk))
}
