//! Shared value types exchanged between nodes and their collaborators.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (temperatures are finite and within the provider's
//! range, token counts are non-negative) and cross the port boundary defined
//! in [`crate::collaborators`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token accounting
// ---------------------------------------------------------------------------

/// Number of tokens consumed by a language-model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Language-model request/response values
// ---------------------------------------------------------------------------

/// Model used when neither the node nor its credentials name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Completion length used when neither the node nor its credentials set one.
pub const DEFAULT_MAX_TOKENS: u32 = 300;

/// Sampling temperature used when neither the node nor its credentials set one.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Sampling parameters for one text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Provider model identifier.
    pub model: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature in `[0.0, 2.0]`.
    pub temperature: f32,
}

impl ModelParams {
    /// Returns `true` if `temperature` is a value providers accept.
    pub fn is_valid_temperature(temperature: f32) -> bool {
        temperature.is_finite() && (0.0..=2.0).contains(&temperature)
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// A rendered prompt ready to be sent to a language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Optional system instruction sent ahead of the user turn.
    pub system: Option<String>,
    /// The user turn.
    pub user: String,
}

impl Prompt {
    /// Creates a prompt with only a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    /// Attaches a system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Result of one text-generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Model that actually served the request, as reported by the provider.
    pub model: String,
    /// Total tokens billed for the call, when the provider reports usage.
    pub usage: Option<TokenCount>,
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// How a messaging platform should interpret markup in an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Legacy Markdown (`*bold*`, `_italic_`).
    #[default]
    #[serde(alias = "Markdown")]
    Markdown,
    /// MarkdownV2 with strict escaping rules.
    #[serde(alias = "MarkdownV2", alias = "markdownv2")]
    MarkdownV2,
    /// HTML subset.
    #[serde(alias = "HTML")]
    Html,
    /// No markup; text is sent verbatim.
    Plain,
}
