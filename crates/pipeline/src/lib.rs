//! Core orchestration domain for autochain.
//!
//! This crate owns the node abstraction, the credential store, the node-type
//! registry, the pipeline builder and the sequential execution engine.
//! Infrastructure crates implement the collaborator traits defined here; they
//! never add orchestration rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No HTTP and no filesystem paths.
//! Credential documents are parsed from any reader; locating the file is the
//! caller's concern.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`NodeId`, `NodeType`, `CredentialName`, …) |
//! | [`types`] | Value types crossing the port boundary (`ModelParams`, `Generation`, …) |
//! | [`errors`] | Error taxonomy and [`ErrorKind`] classification |
//! | [`data`] | The [`DataBag`] threaded through a run |
//! | [`credentials`] | [`CredentialBundle`] and [`CredentialStore`] |
//! | [`node`] | [`NodeDefinition`], [`NodeConfig`], [`RunContext`], the [`Node`] trait |
//! | [`collaborators`] | Language-model and messenger port traits |
//! | [`registry`] | Type-tag → factory registry |
//! | [`builder`] | [`PipelineBuilder`] |
//! | [`engine`] | [`Pipeline`] and its run state machine |

pub mod builder;
pub mod collaborators;
pub mod credentials;
pub mod data;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod node;
pub mod registry;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use builder::PipelineBuilder;
pub use collaborators::{
    LanguageModel, LanguageModelConnector, LanguageModelCredentials, Messenger,
    MessengerConnector, MessengerCredentials,
};
pub use credentials::{
    CredentialBundle, CredentialStore, CredentialStoreBuilder, Fallback, DEFAULT_CREDENTIAL,
};
pub use data::DataBag;
pub use engine::{Pipeline, RunState};
pub use errors::{BuildError, CredentialError, DelegateError, ErrorKind, NodeError, PipelineError};
pub use identifiers::{ChannelRef, CredentialName, NodeId, NodeType, PipelineRunId};
pub use node::{Node, NodeConfig, NodeDefinition, RunContext};
pub use registry::{NodeFactory, NodeRegistry};
pub use types::{
    Generation, ModelParams, ParseMode, Prompt, TokenCount, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
};
