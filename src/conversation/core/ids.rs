//! Identifier types for the conversation store.
//!
//! Every identifier ends up embedded in a composite sort key such as
//! `"<user>#CONV#<conversation>"`. Identifiers are therefore plain strings with
//! one hard rule: they are non-empty and never contain the `#` separator.
//! Rejecting `#` at construction is what keeps key decomposition unambiguous;
//! the key codec still refuses ambiguous keys read back from storage.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::core::errors::{StoreError, StoreResult};

/// Separator used between the parts of a composite sort key.
pub const KEY_SEPARATOR: char = '#';

fn check_identifier(kind: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidId(format!("{kind} must not be empty")));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(StoreError::InvalidId(format!(
            "{kind} must not contain '{KEY_SEPARATOR}': {value:?}"
        )));
    }
    Ok(())
}

/// Declare a string identifier newtype with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        kind = $kind:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            ///
            /// # Errors
            /// Returns [`StoreError::InvalidId`] for empty values or values containing `#`.
            pub fn parse(value: impl Into<String>) -> StoreResult<Self> {
                let value = value.into();
                check_identifier($kind, &value)?;
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the underlying string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = StoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_string_id!(
    /// Owning user. Doubles as the partition key of every record the user owns.
    UserId,
    kind = "user id"
);

define_string_id!(
    /// Conversation identifier.
    ConversationId,
    kind = "conversation id"
);

define_string_id!(
    /// Bot identifier referenced by conversations.
    BotId,
    kind = "bot id"
);

impl ConversationId {
    /// Issue a new time-ordered identifier (`UUIDv7`).
    ///
    /// Listings are ordered by sort key, so time-ordered ids make descending
    /// key order match reverse creation order.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}
