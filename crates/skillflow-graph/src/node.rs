//! Node contract

use crate::state::{PartialState, SharedState};
use futures::future::BoxFuture;
use std::future::Future;

pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// One unit of work in a graph. A node reads the state and returns the keys
/// it wants to write; it never sees edges or other nodes.
#[async_trait::async_trait]
pub trait NodeAction: Send + Sync {
    async fn apply(&self, state: &SharedState) -> Result<PartialState, NodeError>;
}

type BoxedNodeFn = Box<dyn Fn(SharedState) -> BoxFuture<'static, Result<PartialState, NodeError>> + Send + Sync>;

/// A node backed by an async closure. Built with [`node_fn`].
pub struct FnNode(BoxedNodeFn);

/// Wrap an async closure as a node. The closure gets its own copy of the state.
pub fn node_fn<F, Fut>(f: F) -> FnNode
where
    F: Fn(SharedState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PartialState, NodeError>> + Send + 'static,
{
    FnNode(Box::new(move |state| Box::pin(f(state))))
}

#[async_trait::async_trait]
impl NodeAction for FnNode {
    async fn apply(&self, state: &SharedState) -> Result<PartialState, NodeError> {
        (self.0)(state.clone()).await
    }
}
