//! The sequential execution engine.
//!
//! A run walks the nodes in insertion order. For each node it validates,
//! executes against the accumulated [`DataBag`], and merges the returned
//! output (last write wins). The first failure stops the run; nothing from the
//! failing node is merged and later nodes never start.
//!
//! The only suspension point is a node's `execute` future. When the run has a
//! deadline, that future is raced against it; on expiry the future is dropped,
//! which cancels whatever collaborator call was in flight, and the failure is
//! attributed to that node. A node that would start after the deadline has
//! already passed fails the same way without being validated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, Instrument};

use crate::data::DataBag;
use crate::errors::PipelineError;
use crate::node::{Node, RunContext};

/// Lifecycle of the most recent run of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has started.
    NotStarted,
    /// The node at `node_index` is validating or executing.
    Running { node_index: usize },
    /// Every node ran successfully.
    Completed,
    /// The node at `node_index` failed; no later node ran.
    Failed { node_index: usize },
}

/// Ordered sequence of nodes plus the state of its latest run.
pub struct Pipeline {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
    state: RunState,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            state: RunState::NotStarted,
        }
    }

    /// Appends a node; execution order is insertion order.
    pub fn add_node(&mut self, node: Arc<dyn Node>) {
        debug!(pipeline = %self.name, node = %node.name(), "Added node");
        self.nodes.push(node);
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node names in execution order.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Nodes in execution order.
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// State of the latest run.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs every node in order.
    ///
    /// Returns `Ok(())` once the last node's output has been merged; the final
    /// data bag is discarded. On failure the error names the first node that
    /// failed validation, failed execution, or was in flight when the deadline
    /// elapsed.
    pub async fn execute(&mut self, ctx: &RunContext) -> Result<(), PipelineError> {
        let span = info_span!("pipeline_run", pipeline = %self.name, run_id = %ctx.run_id());
        self.run(ctx).instrument(span).await
    }

    async fn run(&mut self, ctx: &RunContext) -> Result<(), PipelineError> {
        info!(nodes = self.nodes.len(), budget = ?ctx.budget(), "Starting pipeline execution");

        let mut bag = DataBag::new();
        let total = self.nodes.len();

        for (index, node) in self.nodes.iter().enumerate() {
            self.state = RunState::Running { node_index: index };
            let node_span = info_span!("node", node = %node.name(), index);

            info!(parent: &node_span, "Executing node {}/{}", index + 1, total);

            if ctx.remaining() == Some(Duration::ZERO) {
                self.state = RunState::Failed { node_index: index };
                return Err(deadline_elapsed(node.as_ref(), index, ctx, &node_span));
            }

            if let Err(source) = node_span.in_scope(|| node.validate()) {
                error!(parent: &node_span, error = %source, "Node validation failed");
                self.state = RunState::Failed { node_index: index };
                return Err(PipelineError::NodeValidation {
                    node: node.name().to_string(),
                    index,
                    source,
                });
            }

            let execution = node.execute(ctx, &bag).instrument(node_span.clone());
            let outcome = match ctx.deadline() {
                Some(deadline) => match tokio::time::timeout_at(deadline, execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        self.state = RunState::Failed { node_index: index };
                        return Err(deadline_elapsed(node.as_ref(), index, ctx, &node_span));
                    }
                },
                None => execution.await,
            };

            let output = match outcome {
                Ok(output) => output,
                Err(source) => {
                    error!(parent: &node_span, error = %source, "Node execution failed");
                    self.state = RunState::Failed { node_index: index };
                    return Err(PipelineError::NodeExecution {
                        node: node.name().to_string(),
                        index,
                        source,
                    });
                }
            };

            debug!(parent: &node_span, keys = ?output.keys().collect::<Vec<_>>(), "Merging node output");
            bag.merge(output);
            info!(parent: &node_span, "Node completed successfully");
        }

        self.state = RunState::Completed;
        info!(keys = bag.len(), "Pipeline execution completed");
        Ok(())
    }
}

fn deadline_elapsed(
    node: &dyn Node,
    index: usize,
    ctx: &RunContext,
    span: &tracing::Span,
) -> PipelineError {
    let budget = ctx.budget().unwrap_or_default();
    error!(parent: span, ?budget, "Run deadline elapsed");
    PipelineError::Timeout {
        node: node.name().to_string(),
        index,
        budget,
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .field("state", &self.state)
            .finish()
    }
}
