//! StateGraph builder and compile-time validation

use crate::checkpoint::{CheckpointSaver, MemorySaver};
use crate::compiled::CompiledGraph;
use crate::error::{GraphError, GraphResult, ValidationIssue};
use crate::node::NodeAction;
use crate::state::KeyStrategy;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub const START: &str = "__START__";
pub const END: &str = "__END__";

fn is_sentinel(name: &str) -> bool {
    name == START || name == END
}

/// Options bound into the compiled graph.
#[derive(Default)]
pub struct CompileConfig {
    /// Where checkpoints go. A fresh [`MemorySaver`] when unset.
    pub saver: Option<Arc<dyn CheckpointSaver>>,
}

impl CompileConfig {
    pub fn with_saver(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver: Some(saver) }
    }
}

#[derive(Default)]
pub struct StateGraph {
    nodes: Vec<(String, Arc<dyn NodeAction>)>,
    edges: Vec<(String, String)>,
    strategies: BTreeMap<String, KeyStrategy>,
}

impl StateGraph {
    pub fn new() -> Self { Self::default() }

    /// A graph whose state merges the listed keys with the given strategies.
    pub fn with_strategies<I, K>(strategies: I) -> Self
    where
        I: IntoIterator<Item = (K, KeyStrategy)>,
        K: Into<String>,
    {
        Self {
            strategies: strategies.into_iter().map(|(k, s)| (k.into(), s)).collect(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>, action: impl NodeAction + 'static) -> GraphResult<&mut Self> {
        let name = name.into();
        if is_sentinel(&name) {
            return Err(GraphError::ReservedName(name));
        }
        if self.nodes.iter().any(|(n, _)| *n == name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.nodes.push((name, Arc::new(action)));
        Ok(self)
    }

    /// Wire `from` to `to`. Endpoints are checked at compile.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let edge = (from.into(), to.into());
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        self
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn compile(self, config: CompileConfig) -> GraphResult<CompiledGraph> {
        let order = self.validate()?;
        debug!(order = ?order, "graph compiled");

        let mut actions: HashMap<String, Arc<dyn NodeAction>> = self.nodes.into_iter().collect();
        let steps = order
            .into_iter()
            .filter_map(|name| actions.remove(&name).map(|a| (name, a)))
            .collect();
        let saver = config.saver.unwrap_or_else(|| Arc::new(MemorySaver::new()));
        Ok(CompiledGraph::new(steps, self.strategies, saver))
    }

    /// Check the graph's shape and return the execution order.
    fn validate(&self) -> GraphResult<Vec<String>> {
        if self.nodes.is_empty() {
            return Err(GraphError::invalid(START, ValidationIssue::NoNodes));
        }

        let index: HashMap<&str, usize> =
            self.nodes.iter().enumerate().map(|(i, (n, _))| (n.as_str(), i)).collect();

        for (from, to) in &self.edges {
            if to == START {
                return Err(GraphError::invalid(from.as_str(), ValidationIssue::EdgeIntoStart));
            }
            if from == END {
                return Err(GraphError::invalid(to.as_str(), ValidationIssue::EdgeFromEnd));
            }
            for end in [from, to] {
                if !is_sentinel(end) && !index.contains_key(end.as_str()) {
                    return Err(GraphError::invalid(end.as_str(), ValidationIssue::UnknownNode));
                }
            }
        }

        if !self.edges.iter().any(|(from, _)| from == START) {
            return Err(GraphError::invalid(START, ValidationIssue::NoEntry));
        }

        let forward = self.reach(START, |(from, to)| (from.as_str(), to.as_str()));
        if let Some((name, _)) = self.nodes.iter().find(|(n, _)| !forward.contains(n.as_str())) {
            return Err(GraphError::invalid(name.as_str(), ValidationIssue::Unreachable));
        }

        let backward = self.reach(END, |(from, to)| (to.as_str(), from.as_str()));
        if let Some((name, _)) = self.nodes.iter().find(|(n, _)| !backward.contains(n.as_str())) {
            return Err(GraphError::invalid(name.as_str(), ValidationIssue::DeadEnd));
        }

        self.topological_order(&index)
    }

    /// Names reachable from `origin` following `direction` over the edges.
    fn reach<'a>(&'a self, origin: &'a str, direction: impl Fn(&'a (String, String)) -> (&'a str, &'a str)) -> HashSet<&'a str> {
        let mut seen = HashSet::from([origin]);
        let mut queue = VecDeque::from([origin]);
        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                let (a, b) = direction(edge);
                if a == current && seen.insert(b) {
                    queue.push_back(b);
                }
            }
        }
        seen
    }

    /// Kahn's algorithm over the registered nodes; ties go to the node added first.
    fn topological_order(&self, index: &HashMap<&str, usize>) -> GraphResult<Vec<String>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (from, to) in &self.edges {
            if let (Some(&f), Some(&t)) = (index.get(from.as_str()), index.get(to.as_str())) {
                in_degree[t] += 1;
                successors[f].push(t);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(self.nodes[i].0.clone());
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = in_degree.iter().position(|&d| d > 0).unwrap_or(0);
            return Err(GraphError::invalid(self.nodes[stuck].0.as_str(), ValidationIssue::Cycle));
        }
        Ok(order)
    }
}
