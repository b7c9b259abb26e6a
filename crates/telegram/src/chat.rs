//! Chat identifiers: resolving configured channel references and describing
//! chats found through `getUpdates`.

use std::fmt;

use pipeline::{ChannelRef, DelegateError};
use serde_json::Value;

/// Prefix Telegram uses for supergroup and channel ids.
const CHANNEL_ID_PREFIX: &str = "-100";

/// A channel reference interpreted for the Bot API `chat_id` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    /// Public channel or group username, including the leading `@`.
    Handle(String),
    /// Supergroup or channel id (`-100…`).
    Channel(i64),
    /// Any other numeric chat id (users, basic groups).
    Id(i64),
}

impl ChatTarget {
    /// Interprets a configured channel reference.
    ///
    /// Precedence: `@handle`, then `-100…` channel ids, then any other signed
    /// integer. Anything else is rejected without touching the network.
    pub fn resolve(channel: &ChannelRef) -> Result<Self, DelegateError> {
        let raw = channel.as_str().trim();
        let invalid = |reason: &str| DelegateError::InvalidChannel {
            channel: raw.to_string(),
            reason: reason.to_string(),
        };

        if let Some(handle) = raw.strip_prefix('@') {
            if handle.is_empty()
                || !handle
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(invalid(
                    "handle must be letters, digits or underscores after '@'",
                ));
            }
            return Ok(Self::Handle(raw.to_string()));
        }

        if raw.starts_with(CHANNEL_ID_PREFIX) {
            return raw
                .parse::<i64>()
                .map(Self::Channel)
                .map_err(|_| invalid("channel id must be numeric"));
        }

        raw.parse::<i64>()
            .map(Self::Id)
            .map_err(|_| invalid("expected '@handle' or a numeric chat id"))
    }

    /// Value for the Bot API `chat_id` field.
    pub fn to_chat_id(&self) -> Value {
        match self {
            Self::Handle(handle) => Value::String(handle.clone()),
            Self::Channel(id) | Self::Id(id) => Value::from(*id),
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => f.write_str(handle),
            Self::Channel(id) | Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// A chat the bot has seen in its pending updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredChat {
    pub id: i64,
    /// Telegram chat type: `private`, `group`, `supergroup` or `channel`.
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl DiscoveredChat {
    /// The `channel_id` to configure for publishing to this chat, if it is a
    /// channel or supergroup. Public chats are addressed by handle.
    pub fn channel_id_hint(&self) -> Option<String> {
        if self.kind != "channel" && self.kind != "supergroup" {
            return None;
        }
        Some(match &self.username {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => self.id.to_string(),
        })
    }
}
