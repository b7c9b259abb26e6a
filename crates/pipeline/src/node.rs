//! The node abstraction: declarative definitions, resolved configuration,
//! the per-run context and the [`Node`] trait itself.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::credentials::CredentialBundle;
use crate::data::DataBag;
use crate::errors::NodeError;
use crate::identifiers::{CredentialName, NodeId, NodeType, PipelineRunId};

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Declarative description of one node, as written in a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Identifier of the node within its pipeline.
    pub id: NodeId,

    /// Type tag used to pick the node implementation.
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Human-readable name used in logs and errors. Falls back to `id`.
    #[serde(default)]
    pub name: String,

    /// Name of the credential bundle to inject. An empty string counts as absent.
    #[serde(
        default,
        alias = "credentialsRef",
        alias = "credentials_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials: Option<String>,

    /// Free-form node parameters.
    #[serde(default, alias = "parameters")]
    pub config: Map<String, Value>,
}

impl NodeDefinition {
    /// Creates a definition without credentials or parameters.
    pub fn new(id: NodeId, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id,
            node_type,
            name: name.into(),
            credentials: None,
            config: Map::new(),
        }
    }

    /// Sets the credential reference.
    pub fn with_credentials(mut self, name: impl Into<String>) -> Self {
        self.credentials = Some(name.into());
        self
    }

    /// Sets one parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// The credential reference, if one was given.
    pub fn credentials_ref(&self) -> Option<CredentialName> {
        self.credentials.as_deref().and_then(CredentialName::new)
    }

    /// The name to report this node under.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Runtime configuration handed to a node constructor.
///
/// Carries the definition's identity and parameters plus any credential
/// bundles the node's factory resolved, keyed by service name.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Identifier of the node within its pipeline.
    pub id: NodeId,
    /// Type tag the node was created from.
    pub node_type: NodeType,
    /// Name used in logs and errors.
    pub name: String,
    parameters: Map<String, Value>,
    credentials: BTreeMap<String, CredentialBundle>,
}

impl NodeConfig {
    /// Copies identity and parameters out of a definition.
    pub fn from_definition(definition: &NodeDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            node_type: definition.node_type.clone(),
            name: definition.display_name().to_string(),
            parameters: definition.config.clone(),
            credentials: BTreeMap::new(),
        }
    }

    /// Attaches a resolved credential bundle under `service`.
    pub fn with_credentials(mut self, service: impl Into<String>, bundle: &CredentialBundle) -> Self {
        self.credentials.insert(service.into(), bundle.clone());
        self
    }

    /// The credential bundle attached for `service`.
    pub fn credentials(&self, service: &str) -> Option<&CredentialBundle> {
        self.credentials.get(service)
    }

    /// Decodes the parameter map into a node-specific typed configuration.
    ///
    /// Fields listed in `required` are checked first so their absence is
    /// reported as [`NodeError::MissingParameter`] rather than a decode error.
    pub fn decode<T: DeserializeOwned>(&self, required: &[&str]) -> Result<T, NodeError> {
        if let Some(missing) = required.iter().find(|key| !self.parameters.contains_key(**key)) {
            return Err(NodeError::MissingParameter {
                parameter: (*missing).to_string(),
            });
        }

        serde_path_to_error::deserialize(Value::Object(self.parameters.clone())).map_err(|e| {
            let parameter = match e.path().to_string() {
                path if path == "." => "config".to_string(),
                path => path,
            };
            NodeError::invalid_parameter(parameter, e.into_inner().to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Per-run information shared with every node of that run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: PipelineRunId,
    deadline: Option<(Instant, Duration)>,
}

impl RunContext {
    /// A context with a fresh run id and no deadline.
    pub fn new() -> Self {
        Self {
            run_id: PipelineRunId::new_random(),
            deadline: None,
        }
    }

    /// Bounds the whole run by `budget`, starting now.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> PipelineRunId {
        self.run_id
    }

    /// Instant the run must finish by, if bounded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// The total budget the deadline was derived from.
    pub fn budget(&self) -> Option<Duration> {
        self.deadline.map(|(_, budget)| budget)
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// A configured unit of pipeline work.
///
/// `execute` must depend only on `input` and the node's own configuration and
/// must return its output rather than mutate shared state. Side effects such as
/// network calls are expected; the engine never retries them.
#[async_trait]
pub trait Node: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Read-only view of the node's configuration.
    fn config(&self) -> &NodeConfig;

    /// Checks that the node has everything it needs to run.
    fn validate(&self) -> Result<(), NodeError>;

    /// Runs the node against the accumulated data of the run.
    async fn execute(&self, ctx: &RunContext, input: &DataBag) -> Result<DataBag, NodeError>;
}
