//! Node-type registry: maps a definition's `type` tag to the factory that
//! builds it.
//!
//! Adding a node type is a [`NodeRegistry::register`] call; neither the
//! registry's dispatch nor the engine changes. Each factory owns its credential
//! policy (which service, whether an absent reference falls back to
//! `"default"`) and must validate eagerly so that a returned node is always
//! fully constructed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::errors::{BuildError, NodeError};
use crate::node::{Node, NodeDefinition};

/// Builds a [`Node`] from its definition and the credential store.
pub trait NodeFactory: Send + Sync {
    /// Creates the node, resolving whatever credentials it needs.
    fn create(
        &self,
        definition: &NodeDefinition,
        credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, NodeError>;
}

impl<F> NodeFactory for F
where
    F: Fn(&NodeDefinition, &CredentialStore) -> Result<Arc<dyn Node>, NodeError> + Send + Sync,
{
    fn create(
        &self,
        definition: &NodeDefinition,
        credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, NodeError> {
        self(definition, credentials)
    }
}

/// Mapping from node-type tag to factory.
///
/// Populated once during start-up and then shared read-only.
#[derive(Default, Clone)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `node_type`, replacing any earlier entry.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        factory: impl NodeFactory + 'static,
    ) -> &mut Self {
        let node_type = node_type.into();
        if self
            .factories
            .insert(node_type.clone(), Arc::new(factory))
            .is_some()
        {
            warn!(node_type = %node_type, "Replacing previously registered node factory");
        } else {
            debug!(node_type = %node_type, "Registered node factory");
        }
        self
    }

    /// Returns `true` if a factory is registered for `node_type`.
    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Registered type tags, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Creates the node described by `definition`.
    ///
    /// Failures are wrapped with the definition's name and id.
    pub fn create(
        &self,
        definition: &NodeDefinition,
        credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, BuildError> {
        let factory = self
            .factories
            .get(definition.node_type.as_str())
            .ok_or_else(|| BuildError::UnsupportedNodeType {
                node_type: definition.node_type.to_string(),
                node_name: definition.display_name().to_string(),
                node_id: definition.id.to_string(),
            })?;

        factory
            .create(definition, credentials)
            .map_err(|source| BuildError::Node {
                node_name: definition.display_name().to_string(),
                node_id: definition.id.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataBag;
    use crate::errors::ErrorKind;
    use crate::identifiers::{NodeId, NodeType};
    use crate::node::{NodeConfig, RunContext};
    use async_trait::async_trait;

    struct Noop(NodeConfig);

    #[async_trait]
    impl Node for Noop {
        fn config(&self) -> &NodeConfig {
            &self.0
        }

        fn validate(&self) -> Result<(), NodeError> {
            Ok(())
        }

        async fn execute(&self, _ctx: &RunContext, _input: &DataBag) -> Result<DataBag, NodeError> {
            Ok(DataBag::new())
        }
    }

    fn noop_factory(
        definition: &NodeDefinition,
        _credentials: &CredentialStore,
    ) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(Noop(NodeConfig::from_definition(definition))))
    }

    fn definition(node_type: &str) -> NodeDefinition {
        NodeDefinition::new(
            NodeId::new("n1").unwrap(),
            NodeType::new(node_type).unwrap(),
            "First",
        )
    }

    #[test]
    fn test_create_dispatches_by_type() {
        let mut registry = NodeRegistry::new();
        registry.register("noop", noop_factory);

        let node = registry
            .create(&definition("noop"), &CredentialStore::new())
            .unwrap();
        assert_eq!(node.name(), "First");
        assert_eq!(node.config().node_type.as_str(), "noop");
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let registry = NodeRegistry::new();
        let err = registry
            .create(&definition("mystery"), &CredentialStore::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedNodeType);
        assert_eq!(err.node_name(), "First");
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn test_factory_error_is_wrapped_with_node_identity() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "picky",
            |_: &NodeDefinition, _: &CredentialStore| -> Result<Arc<dyn Node>, NodeError> {
                Err(NodeError::MissingParameter {
                    parameter: "prompt_template".into(),
                })
            },
        );

        let err = registry
            .create(&definition("picky"), &CredentialStore::new())
            .err()
            .unwrap();
        match err {
            BuildError::Node {
                node_name,
                node_id,
                source: NodeError::MissingParameter { parameter },
            } => {
                assert_eq!(node_name, "First");
                assert_eq!(node_id, "n1");
                assert_eq!(parameter, "prompt_template");
            }
            other => panic!("expected BuildError::Node, got {other:?}"),
        }
    }

    #[test]
    fn test_registered_types_sorted_and_replaceable() {
        let mut registry = NodeRegistry::new();
        registry.register("zeta", noop_factory);
        registry.register("alpha", noop_factory);
        registry.register("alpha", noop_factory);

        assert_eq!(registry.registered_types(), vec!["alpha", "zeta"]);
        assert!(registry.contains("zeta"));
        assert!(!registry.contains("beta"));
    }
}
