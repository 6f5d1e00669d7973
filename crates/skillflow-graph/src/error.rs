use crate::checkpoint::CheckpointError;
use crate::node::NodeError;
use skillflow_core::InvocationId;
use std::fmt;

pub type GraphResult<T> = Result<T, GraphError>;

/// What compile found wrong with the graph's shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationIssue {
    /// An edge names a node that was never added.
    UnknownNode,
    /// No path from START reaches the node.
    Unreachable,
    /// No path from the node reaches END.
    DeadEnd,
    Cycle,
    EdgeIntoStart,
    EdgeFromEnd,
    NoNodes,
    /// Nothing is wired to START.
    NoEntry,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownNode => "edge references an unknown node",
            Self::Unreachable => "node is unreachable from START",
            Self::DeadEnd => "node cannot reach END",
            Self::Cycle => "node is part of a cycle",
            Self::EdgeIntoStart => "edge points into START",
            Self::EdgeFromEnd => "edge leaves END",
            Self::NoNodes => "graph has no nodes",
            Self::NoEntry => "no edge leaves START",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    #[error("'{0}' is a reserved node name")]
    ReservedName(String),

    #[error("invalid graph at '{node}': {issue}")]
    Validation { node: String, issue: ValidationIssue },

    #[error("node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("no checkpoints for invocation {0}")]
    NothingToResume(InvocationId),
}

impl GraphError {
    pub(crate) fn invalid(node: impl Into<String>, issue: ValidationIssue) -> Self {
        Self::Validation { node: node.into(), issue }
    }
}
