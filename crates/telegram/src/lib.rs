//! autochain Telegram adapter.
//!
//! Implements [`pipeline::Messenger`] on top of the Telegram Bot API and
//! offers chat discovery through `getUpdates`, used to find the id of a
//! private channel the bot has been added to.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and Bot API wire types live here. The
//! [`pipeline`] crate sees only [`pipeline::Messenger`] and
//! [`pipeline::MessengerConnector`]. Bot tokens are part of every request URL,
//! so URLs are never logged and are stripped from transport errors.

mod chat;
mod client;

pub use chat::{ChatTarget, DiscoveredChat};
pub use client::{connector, TelegramClient, TelegramConfig, DEFAULT_TELEGRAM_BASE};
