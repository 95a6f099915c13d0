//! Conversation domain model.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::conversation::core::errors::{StoreError, StoreResult};
use crate::conversation::core::ids::{BotId, ConversationId};

/// Speaker role of a message.
///
/// The set is closed and shared with every other reader of the table. A stored
/// message carrying any other role fails to decode, which fails the lookup of
/// its conversation and any listing whose first page holds it. Adding a role
/// means upgrading readers before writers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// System instruction.
    System,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(value.to_string()),
        }
    }
}

/// Message body discriminated by content type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Content type, e.g. `text`.
    pub content_type: String,
    /// Payload.
    pub body: String,
}

impl Content {
    /// Plain text content.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            body: body.into(),
        }
    }
}

/// One node of a conversation's message tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: Content,
    /// Model that produced or handled the message.
    pub model: String,
    /// Child message ids, in order.
    pub children: Vec<String>,
    /// Parent message id, `None` for the root.
    pub parent: Option<String>,
    /// Creation time in fractional seconds since the Unix epoch.
    pub create_time: f64,
}

/// Message tree keyed by message id.
pub type MessageMap = BTreeMap<String, Message>;

/// A full conversation as stored in one record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Creation time in fractional seconds since the Unix epoch.
    pub create_time: f64,
    /// Every message of the conversation.
    pub message_map: MessageMap,
    /// Most recently appended message.
    pub last_message_id: String,
    /// Bot the conversation was held with, if any.
    pub bot_id: Option<BotId>,
}

impl Conversation {
    /// Check the message tree invariants.
    ///
    /// The map must be non-empty, `last_message_id` must be one of its keys,
    /// there must be exactly one root, parent and children links must agree,
    /// and every message must be reachable from the root.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidConversation`] describing the first violation.
    pub fn validate(&self) -> StoreResult<()> {
        if self.message_map.is_empty() {
            return Err(self.invalid("message map is empty"));
        }
        if !self.message_map.contains_key(&self.last_message_id) {
            return Err(self.invalid(&format!(
                "last message {} is not in the message map",
                self.last_message_id
            )));
        }

        let mut roots = self
            .message_map
            .iter()
            .filter(|(_, message)| message.parent.is_none())
            .map(|(id, _)| id);
        let Some(root) = roots.next() else {
            return Err(self.invalid("message tree has no root"));
        };
        if let Some(extra) = roots.next() {
            return Err(self.invalid(&format!("message tree has a second root {extra}")));
        }

        for (id, message) in &self.message_map {
            if let Some(parent_id) = &message.parent {
                let parent = self.message_map.get(parent_id).ok_or_else(|| {
                    self.invalid(&format!("message {id} has unknown parent {parent_id}"))
                })?;
                if !parent.children.contains(id) {
                    return Err(self.invalid(&format!(
                        "parent {parent_id} does not list child {id}"
                    )));
                }
            }
            for child_id in &message.children {
                let child = self.message_map.get(child_id).ok_or_else(|| {
                    self.invalid(&format!("message {id} has unknown child {child_id}"))
                })?;
                if child.parent.as_deref() != Some(id.as_str()) {
                    return Err(self.invalid(&format!(
                        "child {child_id} does not point back to {id}"
                    )));
                }
            }
        }

        let mut visited = HashSet::new();
        let mut stack = vec![root.as_str()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(self.invalid(&format!("message {id} is reachable twice")));
            }
            if let Some(message) = self.message_map.get(id) {
                stack.extend(message.children.iter().map(String::as_str));
            }
        }
        if visited.len() != self.message_map.len() {
            return Err(self.invalid("message tree has unreachable messages"));
        }

        Ok(())
    }

    /// Model of the message referenced by `last_message_id`.
    #[must_use]
    pub fn representative_model(&self) -> Option<&str> {
        representative_model(&self.message_map, &self.last_message_id)
    }

    fn invalid(&self, reason: &str) -> StoreError {
        StoreError::InvalidConversation(format!("{}: {reason}", self.id))
    }
}

/// Model of the message `last_message_id` within `message_map`.
#[must_use]
pub fn representative_model<'a>(
    message_map: &'a MessageMap,
    last_message_id: &str,
) -> Option<&'a str> {
    message_map
        .get(last_message_id)
        .map(|message| message.model.as_str())
}

/// Listing entry for a conversation; never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Creation time in fractional seconds since the Unix epoch.
    pub create_time: f64,
    /// Display title.
    pub title: String,
    /// Representative model of the conversation.
    pub model: String,
    /// Associated bot, if any.
    pub bot_id: Option<BotId>,
}

/// Result of a bounded, paginated listing.
///
/// A listing is "recent conversations, possibly incomplete". When
/// `truncated` is set, more records exist beyond the page cap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationListing {
    /// Summaries in descending sort key order.
    pub conversations: Vec<ConversationSummary>,
    /// Number of query pages fetched.
    pub pages_fetched: usize,
    /// Whether the page cap stopped the listing before the end.
    pub truncated: bool,
}

impl ConversationListing {
    /// Whether no conversation was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

/// Last-used marker of a bot for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BotUsage {
    /// Bot identifier.
    pub bot_id: BotId,
    /// Last time a conversation referencing the bot was written.
    pub last_bot_used: f64,
}

/// Outcome of deleting every listed conversation of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    /// Number of conversation records deleted.
    pub deleted: usize,
    /// Whether the listing was truncated, leaving conversations behind.
    pub truncated: bool,
}
