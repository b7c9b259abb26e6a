//! Port traits for the external systems nodes delegate to.
//!
//! The core never speaks HTTP. Node variants hold a client behind one of these
//! traits; the `llm` and `telegram` crates provide the real implementations,
//! tests provide recording doubles.
//!
//! Clients are created per credential bundle through a connector, so two
//! nodes referencing different bundles of the same service get independent
//! clients.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::DelegateError;
use crate::identifiers::ChannelRef;
use crate::types::{Generation, ModelParams, ParseMode, Prompt};

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Name of the backing service, used in logs.
    fn service(&self) -> &str;

    /// Generates a completion for `prompt`.
    async fn generate_text(
        &self,
        prompt: &Prompt,
        params: &ModelParams,
    ) -> Result<Generation, DelegateError>;
}

/// Secrets and endpoint needed to open a [`LanguageModel`] client.
#[derive(Clone, PartialEq, Eq)]
pub struct LanguageModelCredentials {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Endpoint override for compatible services; `None` uses the provider default.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for LanguageModelCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModelCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Opens a [`LanguageModel`] client for one credential bundle.
pub type LanguageModelConnector = Arc<
    dyn Fn(&LanguageModelCredentials) -> Result<Arc<dyn LanguageModel>, DelegateError>
        + Send
        + Sync,
>;

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

/// Message delivery backend.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Platform name reported in node output (e.g. `"telegram"`).
    fn platform(&self) -> &str;

    /// Delivers `text` to `channel`.
    ///
    /// Interpreting the channel reference (handle vs numeric id) is the
    /// implementation's responsibility.
    async fn send_message(
        &self,
        channel: &ChannelRef,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), DelegateError>;
}

/// Secrets and endpoint needed to open a [`Messenger`] client.
#[derive(Clone, PartialEq, Eq)]
pub struct MessengerCredentials {
    /// Bot token.
    pub token: String,
    /// Endpoint override; `None` uses the platform default.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for MessengerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerCredentials")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Opens a [`Messenger`] client for one credential bundle.
pub type MessengerConnector = Arc<
    dyn Fn(&MessengerCredentials) -> Result<Arc<dyn Messenger>, DelegateError> + Send + Sync,
>;
