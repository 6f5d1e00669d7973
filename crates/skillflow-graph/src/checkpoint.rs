//! Checkpoints and the savers that hold them

use crate::state::SharedState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use skillflow_core::InvocationId;

/// State snapshot taken after a node finished.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub invocation_id: InvocationId,
    /// Node that produced this state; `START` for the seed.
    pub node: String,
    /// Number of nodes completed when the snapshot was taken.
    pub step: usize,
    pub created_at: DateTime<Utc>,
    pub state: SharedState,
}

impl Checkpoint {
    pub fn new(invocation_id: InvocationId, node: impl Into<String>, step: usize, state: SharedState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invocation_id,
            node: node.into(),
            step,
            created_at: Utc::now(),
            state,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint storage failed: {0}")]
    Storage(String),
}

#[async_trait::async_trait]
pub trait CheckpointSaver: Send + Sync {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// All checkpoints of an invocation, oldest first.
    async fn list(&self, invocation_id: &InvocationId) -> Result<Vec<Checkpoint>, CheckpointError>;

    async fn latest(&self, invocation_id: &InvocationId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.list(invocation_id).await?.pop())
    }

    async fn clear(&self, invocation_id: &InvocationId) -> Result<(), CheckpointError>;
}

/// Volatile saver; concurrent invocations write to separate entries.
#[derive(Default)]
pub struct MemorySaver {
    runs: DashMap<InvocationId, Vec<Checkpoint>>,
}

impl MemorySaver {
    pub fn new() -> Self { Self::default() }

    pub fn invocations(&self) -> Vec<InvocationId> {
        let mut ids: Vec<InvocationId> = self.runs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait::async_trait]
impl CheckpointSaver for MemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.runs.entry(checkpoint.invocation_id.clone()).or_default().push(checkpoint);
        Ok(())
    }

    async fn list(&self, invocation_id: &InvocationId) -> Result<Vec<Checkpoint>, CheckpointError> {
        Ok(self.runs.get(invocation_id).map(|c| c.clone()).unwrap_or_default())
    }

    async fn latest(&self, invocation_id: &InvocationId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.runs.get(invocation_id).and_then(|c| c.last().cloned()))
    }

    async fn clear(&self, invocation_id: &InvocationId) -> Result<(), CheckpointError> {
        self.runs.remove(invocation_id);
        Ok(())
    }
}
