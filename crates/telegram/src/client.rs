//! Telegram Bot API client.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pipeline::{
    ChannelRef, DelegateError, Messenger, MessengerConnector, MessengerCredentials, ParseMode,
};

use crate::chat::{ChatTarget, DiscoveredChat};

/// Default Bot API base URL.
pub const DEFAULT_TELEGRAM_BASE: &str = "https://api.telegram.org";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PLATFORM: &str = "telegram";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Endpoint settings shared by every client a [`connector`] opens.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Base URL; `/bot<token>/<method>` is appended.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl TelegramConfig {
    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TELEGRAM_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Bot API client bound to one bot token.
pub struct TelegramClient {
    client: Client,
    token: String,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig, token: impl Into<String>) -> Result<Self, DelegateError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DelegateError::Client {
                service: PLATFORM.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            token: token.into(),
            config,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    /// Calls a Bot API method and unwraps the `{ok, result}` envelope.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, DelegateError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!(method, "Calling Telegram Bot API");

        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| DelegateError::Transport {
                service: PLATFORM.to_string(),
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| DelegateError::Transport {
            service: PLATFORM.to_string(),
            message: e.without_url().to_string(),
        })?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DelegateError::Rejected {
                    service: PLATFORM.to_string(),
                    status: status.as_u16(),
                    message: format!("HTTP {status}"),
                })
            }
            Err(e) => {
                return Err(DelegateError::InvalidResponse {
                    service: PLATFORM.to_string(),
                    message: e.to_string(),
                })
            }
        };

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or(status.as_u16());
            let message = envelope
                .description
                .unwrap_or_else(|| "request failed".to_string());
            return Err(match code {
                401 | 403 => DelegateError::Auth {
                    service: PLATFORM.to_string(),
                    message,
                },
                429 => DelegateError::RateLimited {
                    service: PLATFORM.to_string(),
                    message,
                },
                _ => DelegateError::Rejected {
                    service: PLATFORM.to_string(),
                    status: code,
                    message,
                },
            });
        }

        envelope.result.ok_or_else(|| DelegateError::InvalidResponse {
            service: PLATFORM.to_string(),
            message: format!("{method} returned no result"),
        })
    }

    /// Lists the chats found in the bot's pending updates, first sighting
    /// first, each chat once.
    pub async fn discover_chats(&self) -> Result<Vec<DiscoveredChat>, DelegateError> {
        let updates: Vec<Update> = self.call("getUpdates", &GetUpdates { timeout: 0 }).await?;

        let mut seen = HashSet::new();
        let chats = updates
            .into_iter()
            .filter_map(|update| update.message.or(update.channel_post))
            .map(|message| message.chat)
            .filter(|chat| chat.id != 0 && seen.insert(chat.id))
            .map(|chat| DiscoveredChat {
                id: chat.id,
                kind: chat.kind,
                title: chat.title,
                username: chat.username,
            })
            .collect::<Vec<_>>();

        tracing::info!(chats = chats.len(), "Discovered Telegram chats");
        Ok(chats)
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn send_message(
        &self,
        channel: &ChannelRef,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), DelegateError> {
        let target = ChatTarget::resolve(channel)?;
        let request = SendMessage {
            chat_id: target.to_chat_id(),
            text,
            parse_mode: parse_mode_name(parse_mode),
        };

        let sent: SentMessage = self.call("sendMessage", &request).await?;
        tracing::debug!(chat = %target, message_id = sent.message_id, "Telegram message sent");
        Ok(())
    }
}

fn parse_mode_name(mode: ParseMode) -> Option<&'static str> {
    match mode {
        ParseMode::Markdown => Some("Markdown"),
        ParseMode::MarkdownV2 => Some("MarkdownV2"),
        ParseMode::Html => Some("HTML"),
        ParseMode::Plain => None,
    }
}

/// Connector opening one [`TelegramClient`] per bot token.
///
/// A bundle's `base_url` overrides the one in `config`.
pub fn connector(config: TelegramConfig) -> MessengerConnector {
    Arc::new(
        move |credentials: &MessengerCredentials| -> Result<Arc<dyn Messenger>, DelegateError> {
            let mut config = config.clone();
            if let Some(base_url) = &credentials.base_url {
                config.base_url = base_url.clone();
            }
            Ok(Arc::new(TelegramClient::new(config, credentials.token.clone())?))
        },
    )
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: Value,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    timeout: u32,
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<UpdateMessage>,
    #[serde(default)]
    channel_post: Option<UpdateMessage>,
}

#[derive(Debug, Deserialize)]
struct UpdateMessage {
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
}
