//! Error types for building and running pipelines.
//!
//! The error types form two layers:
//!
//! - [`NodeError`] and [`DelegateError`] are raised by individual nodes and
//!   their collaborators.
//! - [`BuildError`] and [`PipelineError`] wrap a node-level cause with the
//!   identity of the node that produced it, for the build phase and the run
//!   phase respectively.
//!
//! Every error maps onto one [`ErrorKind`], so callers and tests can branch on
//! the failure class without matching message text. All kinds are fatal to
//! the current run; nothing here is retried.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Failure class shared by every error type in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed node parameters or credentials.
    Config,
    /// The node definition names a type nobody registered.
    UnsupportedNodeType,
    /// A key a node needs from upstream is absent or has the wrong shape.
    Input,
    /// The language-model or messaging collaborator failed.
    Delegate,
    /// The overall run deadline elapsed.
    Timeout,
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure reported by an external collaborator (language model, messenger).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DelegateError {
    /// The request never produced an HTTP response (DNS, TLS, connect, timeout).
    #[error("{service} transport error: {message}")]
    Transport { service: String, message: String },

    /// The service rejected the credentials.
    #[error("{service} authentication failed: {message}")]
    Auth { service: String, message: String },

    /// The service asked us to slow down.
    #[error("{service} rate limit exceeded: {message}")]
    RateLimited { service: String, message: String },

    /// The service answered with an error status.
    #[error("{service} rejected the request ({status}): {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },

    /// The service answered successfully but the payload was unusable.
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },

    /// A channel reference could not be interpreted in any supported form.
    #[error("invalid channel '{channel}': {reason}")]
    InvalidChannel { channel: String, reason: String },

    /// The collaborator client could not be constructed.
    #[error("{service} client could not be created: {message}")]
    Client { service: String, message: String },
}

// ---------------------------------------------------------------------------
// Node errors
// ---------------------------------------------------------------------------

/// Failure raised by a node during construction, validation or execution.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A required node parameter is absent.
    #[error("missing required parameter '{parameter}'")]
    MissingParameter { parameter: String },

    /// A node parameter is present but has the wrong type or value.
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// The node needs credentials for `service` and none were attached.
    #[error("credentials required for service '{service}'")]
    MissingCredentials { service: String },

    /// The credential reference names no bundle in the store.
    #[error("credentials '{name}' not found for service '{service}'")]
    CredentialNotFound { service: String, name: String },

    /// A credential bundle value fails the node's format checks.
    #[error("invalid {service} credential field '{field}': {reason}")]
    InvalidCredentialFormat {
        service: String,
        field: String,
        reason: String,
    },

    /// A required upstream value is missing from the data bag or mis-shaped.
    #[error("input '{key}' {reason}")]
    Input { key: String, reason: String },

    /// The delegated collaborator call failed.
    #[error(transparent)]
    Delegate(#[from] DelegateError),
}

impl NodeError {
    /// Shorthand for [`NodeError::InvalidParameter`].
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`NodeError::InvalidCredentialFormat`].
    pub fn invalid_credential(
        service: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCredentialFormat {
            service: service.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter { .. }
            | Self::InvalidParameter { .. }
            | Self::MissingCredentials { .. }
            | Self::CredentialNotFound { .. }
            | Self::InvalidCredentialFormat { .. } => ErrorKind::Config,
            Self::Input { .. } => ErrorKind::Input,
            Self::Delegate(_) => ErrorKind::Delegate,
        }
    }
}

// ---------------------------------------------------------------------------
// Build-phase errors
// ---------------------------------------------------------------------------

/// Failure turning node definitions into a pipeline.
///
/// The first failing definition aborts the build; no partial pipeline is
/// returned.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No factory is registered for the definition's type tag.
    #[error("node '{node_name}' ({node_id}): unsupported node type '{node_type}'")]
    UnsupportedNodeType {
        node_type: String,
        node_name: String,
        node_id: String,
    },

    /// The registered factory refused the definition.
    #[error("failed to create node '{node_name}' ({node_id}): {source}")]
    Node {
        node_name: String,
        node_id: String,
        #[source]
        source: NodeError,
    },
}

impl BuildError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedNodeType { .. } => ErrorKind::UnsupportedNodeType,
            Self::Node { source, .. } => source.kind(),
        }
    }

    /// Name of the definition that failed.
    pub fn node_name(&self) -> &str {
        match self {
            Self::UnsupportedNodeType { node_name, .. } | Self::Node { node_name, .. } => node_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Run-phase errors
// ---------------------------------------------------------------------------

/// Failure of a pipeline run, attributed to the first node that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The node refused to run because its configuration is incomplete.
    #[error("node '{node}' validation failed: {source}")]
    NodeValidation {
        node: String,
        index: usize,
        #[source]
        source: NodeError,
    },

    /// The node ran and failed.
    #[error("node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        index: usize,
        #[source]
        source: NodeError,
    },

    /// The run deadline elapsed while the node was in flight.
    #[error("node '{node}' did not finish within the {budget:?} run budget")]
    Timeout {
        node: String,
        index: usize,
        budget: Duration,
    },
}

impl PipelineError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeValidation { source, .. } | Self::NodeExecution { source, .. } => {
                source.kind()
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Name of the node the failure is attributed to.
    pub fn node(&self) -> &str {
        match self {
            Self::NodeValidation { node, .. }
            | Self::NodeExecution { node, .. }
            | Self::Timeout { node, .. } => node,
        }
    }

    /// Position of the failing node in the pipeline.
    pub fn index(&self) -> usize {
        match self {
            Self::NodeValidation { index, .. }
            | Self::NodeExecution { index, .. }
            | Self::Timeout { index, .. } => *index,
        }
    }
}

// ---------------------------------------------------------------------------
// Credential loading errors
// ---------------------------------------------------------------------------

/// Failure loading a credential document.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The source could not be read.
    #[error("failed to read credentials: {0}")]
    Read(#[from] std::io::Error),

    /// The source is not valid JSON.
    #[error("failed to parse credentials: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON does not have the `service -> name -> bundle` shape.
    #[error("malformed credentials at '{path}': {reason}")]
    Malformed { path: String, reason: String },
}
