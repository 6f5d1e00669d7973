//! skillflow graph - a state graph of async nodes with per-node checkpoints
//!
//! Build a [`StateGraph`], wire nodes between [`START`] and [`END`], then
//! [`compile`](StateGraph::compile) it. The compiled graph runs nodes in one
//! topological pass, merging each node's partial output into the shared
//! state and checkpointing after every node.

pub mod checkpoint;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod node;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointSaver, MemorySaver};
pub use compiled::CompiledGraph;
pub use error::{GraphError, GraphResult, ValidationIssue};
pub use graph::{CompileConfig, StateGraph, END, START};
pub use node::{node_fn, FnNode, NodeAction, NodeError};
pub use state::{KeyStrategy, PartialState, SharedState};
pub use skillflow_core::InvocationId;
