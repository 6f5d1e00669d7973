//! Executing a compiled graph

use crate::checkpoint::{Checkpoint, CheckpointSaver};
use crate::error::{GraphError, GraphResult};
use crate::graph::START;
use crate::node::NodeAction;
use crate::state::{KeyStrategy, PartialState, SharedState};
use skillflow_core::InvocationId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// A validated graph, ready to run. Immutable; share it behind an `Arc`.
pub struct CompiledGraph {
    steps: Vec<(String, Arc<dyn NodeAction>)>,
    strategies: BTreeMap<String, KeyStrategy>,
    saver: Arc<dyn CheckpointSaver>,
}

impl CompiledGraph {
    pub(crate) fn new(
        steps: Vec<(String, Arc<dyn NodeAction>)>,
        strategies: BTreeMap<String, KeyStrategy>,
        saver: Arc<dyn CheckpointSaver>,
    ) -> Self {
        Self { steps, strategies, saver }
    }

    /// Node names in the order they run.
    pub fn execution_order(&self) -> Vec<&str> {
        self.steps.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn saver(&self) -> &Arc<dyn CheckpointSaver> { &self.saver }

    /// Run the graph from the seed under a fresh invocation id.
    pub async fn invoke(&self, seed: PartialState) -> GraphResult<SharedState> {
        self.invoke_with_id(InvocationId::generate(), seed).await
    }

    pub async fn invoke_with_id(&self, invocation_id: InvocationId, seed: PartialState) -> GraphResult<SharedState> {
        let mut state = SharedState::with_strategies(self.strategies.clone());
        state.merge_all(seed);

        info!(invocation = %invocation_id, nodes = self.steps.len(), "graph invocation started");
        self.saver.put(Checkpoint::new(invocation_id.clone(), START, 0, state.clone())).await?;
        self.run_from(&invocation_id, state, 0).await
    }

    /// Continue an invocation after its latest checkpoint. A finished
    /// invocation returns its final state without running anything.
    pub async fn resume(&self, invocation_id: &InvocationId) -> GraphResult<SharedState> {
        let checkpoint = self
            .saver
            .latest(invocation_id)
            .await?
            .ok_or_else(|| GraphError::NothingToResume(invocation_id.clone()))?;

        info!(
            invocation = %invocation_id,
            after = %checkpoint.node,
            step = checkpoint.step,
            "resuming graph invocation"
        );
        self.run_from(invocation_id, checkpoint.state, checkpoint.step).await
    }

    /// Latest checkpointed state of an invocation.
    pub async fn state(&self, invocation_id: &InvocationId) -> GraphResult<Option<SharedState>> {
        Ok(self.saver.latest(invocation_id).await?.map(|c| c.state))
    }

    async fn run_from(&self, invocation_id: &InvocationId, mut state: SharedState, completed: usize) -> GraphResult<SharedState> {
        for (step, (name, action)) in self.steps.iter().enumerate().skip(completed) {
            let started = Instant::now();
            let partial = match action.apply(&state).await {
                Ok(p) => p,
                Err(source) => {
                    error!(invocation = %invocation_id, node = %name, error = %source, "node failed");
                    return Err(GraphError::NodeExecution { node: name.clone(), source });
                }
            };

            let written: Vec<String> = partial.keys().cloned().collect();
            state.merge_all(partial);
            self.saver
                .put(Checkpoint::new(invocation_id.clone(), name.as_str(), step + 1, state.clone()))
                .await?;

            info!(
                invocation = %invocation_id,
                node = %name,
                step = step + 1,
                keys = ?written,
                duration_ms = started.elapsed().as_millis() as u64,
                "node finished"
            );
        }

        info!(invocation = %invocation_id, "graph invocation finished");
        Ok(state)
    }
}
