//! Turns declarative node definitions into a runnable [`Pipeline`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::engine::Pipeline;
use crate::errors::BuildError;
use crate::node::NodeDefinition;
use crate::registry::NodeRegistry;

/// Composes a [`CredentialStore`] and a [`NodeRegistry`] into pipelines.
///
/// Both collaborators are injected already loaded; the builder performs no
/// I/O and can be reused for any number of pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    credentials: Arc<CredentialStore>,
    registry: Arc<NodeRegistry>,
}

impl PipelineBuilder {
    /// Creates a builder over a loaded store and a populated registry.
    pub fn new(credentials: Arc<CredentialStore>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            credentials,
            registry,
        }
    }

    /// The credential store nodes are resolved against.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The registry node types are dispatched through.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Builds a pipeline whose nodes appear in `definitions` order.
    ///
    /// The first definition that cannot be turned into a node aborts the build.
    pub fn build(
        &self,
        name: impl Into<String>,
        definitions: &[NodeDefinition],
    ) -> Result<Pipeline, BuildError> {
        let mut pipeline = Pipeline::new(name);
        info!(pipeline = %pipeline.name(), nodes = definitions.len(), "Building pipeline");

        for definition in definitions {
            let node = self
                .registry
                .create(definition, &self.credentials)
                .inspect_err(|err| {
                    warn!(
                        pipeline = %pipeline.name(),
                        node = %definition.display_name(),
                        node_type = %definition.node_type,
                        error = %err,
                        "Node construction failed"
                    );
                })?;
            pipeline.add_node(node);
        }

        info!(
            pipeline = %pipeline.name(),
            nodes = pipeline.node_count(),
            "Pipeline built"
        );
        Ok(pipeline)
    }
}
