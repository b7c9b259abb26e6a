//! Built-in autochain node types.
//!
//! | Type tag | Node | Credentials |
//! |----------|------|-------------|
//! | `text_generator` | [`TextGenerator`] | `openai`, falls back to `"default"` |
//! | `text_formatter` | [`TextFormatter`] | none |
//! | `telegram_publisher` | [`TelegramPublisher`] | `telegram`, explicit reference required |
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes translate between the data bag and the
//! collaborator ports defined in the [`pipeline`] crate. They never speak HTTP
//! themselves; the composition root hands them connectors through
//! [`Collaborators`].

use std::sync::Arc;

use pipeline::{LanguageModelConnector, MessengerConnector, NodeRegistry};

pub mod telegram_publisher;
pub mod template;
pub mod text_formatter;
pub mod text_generator;

pub use telegram_publisher::{TelegramPublisher, TelegramPublisherFactory, DEFAULT_MESSAGE_TEMPLATE};
pub use text_formatter::TextFormatter;
pub use text_generator::{TextGenerator, TextGeneratorFactory};

// ---------------------------------------------------------------------------
// Type tags, services and data-bag keys
// ---------------------------------------------------------------------------

/// Type tag of [`TextGenerator`].
pub const TEXT_GENERATOR: &str = "text_generator";
/// Type tag of [`TelegramPublisher`].
pub const TELEGRAM_PUBLISHER: &str = "telegram_publisher";
/// Type tag of [`TextFormatter`].
pub const TEXT_FORMATTER: &str = "text_formatter";

/// Credential service consulted by [`TextGenerator`].
pub const OPENAI_SERVICE: &str = "openai";
/// Credential service consulted by [`TelegramPublisher`].
pub const TELEGRAM_SERVICE: &str = "telegram";

/// Key [`TextGenerator`] writes its output under; default input of the other nodes.
pub const GENERATED_TEXT: &str = "generated_text";
/// Model that served the generation.
pub const MODEL_USED: &str = "model_used";
/// Tokens billed for the generation, when reported.
pub const TOKENS_USED: &str = "tokens_used";
/// Unformatted text preserved by [`TextFormatter`].
pub const ORIGINAL_TEXT: &str = "original_text";

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Connectors the built-in nodes open their clients through.
#[derive(Clone)]
pub struct Collaborators {
    pub language_model: LanguageModelConnector,
    pub messenger: MessengerConnector,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Registers the built-in node types into `registry`.
pub fn register_builtin(registry: &mut NodeRegistry, collaborators: &Collaborators) {
    registry
        .register(
            TEXT_GENERATOR,
            TextGeneratorFactory::new(Arc::clone(&collaborators.language_model)),
        )
        .register(TEXT_FORMATTER, text_formatter::create)
        .register(
            TELEGRAM_PUBLISHER,
            TelegramPublisherFactory::new(Arc::clone(&collaborators.messenger)),
        );
}

/// A registry holding only the built-in node types.
pub fn builtin_registry(collaborators: &Collaborators) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin(&mut registry, collaborators);
    registry
}
