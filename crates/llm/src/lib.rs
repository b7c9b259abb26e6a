//! autochain language-model adapter.
//!
//! Implements [`pipeline::LanguageModel`] for OpenAI's chat-completions API and
//! any service exposing the same wire format (point `base_url` at it).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and status-code classification live here. The [`pipeline`] crate sees only
//! [`pipeline::LanguageModel`] and [`pipeline::LanguageModelConnector`].

mod openai;

pub use openai::{connector, OpenAiClient, OpenAiConfig, DEFAULT_OPENAI_BASE};
