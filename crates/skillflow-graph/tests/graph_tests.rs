//! Tests for skillflow-graph: builder validation, execution order, merging, checkpoints and resume

use serde_json::{json, Value};
use skillflow_graph::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn seed(pairs: &[(&str, Value)]) -> PartialState {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Writes `{key: value}` and appends its own name to `trace`.
fn writer(name: &'static str, key: &'static str, value: Value) -> FnNode {
    node_fn(move |_state| {
        let value = value.clone();
        async move { Ok::<_, NodeError>(seed(&[(key, value), ("trace", json!(name))])) }
    })
}

fn noop() -> FnNode {
    node_fn(|_| async { Ok::<_, NodeError>(PartialState::new()) })
}

fn issue(result: GraphResult<CompiledGraph>) -> (String, ValidationIssue) {
    match result {
        Err(GraphError::Validation { node, issue }) => (node, issue),
        Err(e) => panic!("expected validation error, got {}", e),
        Ok(_) => panic!("expected validation error, graph compiled"),
    }
}

// ===========================================================================
// Builder
// ===========================================================================

#[test]
fn duplicate_and_reserved_names_are_rejected() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    assert!(matches!(g.add_node("a", noop()), Err(GraphError::DuplicateNode(n)) if n == "a"));
    assert!(matches!(g.add_node(START, noop()), Err(GraphError::ReservedName(_))));
    assert!(matches!(g.add_node(END, noop()), Err(GraphError::ReservedName(_))));
}

// ===========================================================================
// Compile-time validation
// ===========================================================================

#[test]
fn empty_graph_has_no_nodes() {
    assert_eq!(issue(StateGraph::new().compile(CompileConfig::default())).1, ValidationIssue::NoNodes);
}

#[test]
fn edge_to_unknown_node() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", "ghost").add_edge("a", END);
    assert_eq!(issue(g.compile(CompileConfig::default())), ("ghost".to_string(), ValidationIssue::UnknownNode));
}

#[test]
fn missing_entry_edge() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_edge("a", END);
    assert_eq!(issue(g.compile(CompileConfig::default())).1, ValidationIssue::NoEntry);
}

#[test]
fn unreachable_node_is_named() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_node("island", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", END).add_edge("island", END);
    assert_eq!(issue(g.compile(CompileConfig::default())), ("island".to_string(), ValidationIssue::Unreachable));
}

#[test]
fn dead_end_node_is_named() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_node("stuck", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", END).add_edge("a", "stuck");
    assert_eq!(issue(g.compile(CompileConfig::default())), ("stuck".to_string(), ValidationIssue::DeadEnd));
}

#[test]
fn cycle_is_rejected() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_node("b", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", "b").add_edge("b", "a").add_edge("b", END);
    assert_eq!(issue(g.compile(CompileConfig::default())).1, ValidationIssue::Cycle);
}

#[test]
fn sentinel_misuse() {
    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", END).add_edge("a", START);
    assert_eq!(issue(g.compile(CompileConfig::default())), ("a".to_string(), ValidationIssue::EdgeIntoStart));

    let mut g = StateGraph::new();
    g.add_node("a", noop()).unwrap();
    g.add_edge(START, "a").add_edge("a", END).add_edge(END, "a");
    assert_eq!(issue(g.compile(CompileConfig::default())).1, ValidationIssue::EdgeFromEnd);
}

#[test]
fn execution_order_is_topological_with_insertion_tie_break() {
    let mut g = StateGraph::new();
    for name in ["join", "left", "right", "fetch"] {
        g.add_node(name, noop()).unwrap();
    }
    g.add_edge(START, "fetch")
        .add_edge("fetch", "left")
        .add_edge("fetch", "right")
        .add_edge("left", "join")
        .add_edge("right", "join")
        .add_edge("join", END);

    let compiled = g.compile(CompileConfig::default()).unwrap();
    assert_eq!(compiled.execution_order(), vec!["fetch", "left", "right", "join"]);
}

// ===========================================================================
// Invocation
// ===========================================================================

fn two_step_graph(saver: Arc<MemorySaver>) -> CompiledGraph {
    let mut g = StateGraph::with_strategies([("trace", KeyStrategy::Append)]);
    g.add_node("c2m", writer("c2m", "instructions", json!("## Instructions"))).unwrap();
    g.add_node(
        "exec",
        node_fn(|state: SharedState| async move {
            let instructions = state.get_str("instructions").ok_or("instructions missing")?.to_string();
            Ok::<_, NodeError>(seed(&[("result", json!(format!("ran {}", instructions))), ("trace", json!("exec"))]))
        }),
    )
    .unwrap();
    g.add_edge(START, "c2m").add_edge("c2m", "exec").add_edge("exec", END);
    g.compile(CompileConfig::with_saver(saver)).unwrap()
}

#[tokio::test]
async fn invoke_merges_outputs_and_checkpoints_each_node() {
    let saver = Arc::new(MemorySaver::new());
    let graph = two_step_graph(saver.clone());

    let id = InvocationId::new("run-1");
    let state = graph.invoke_with_id(id.clone(), seed(&[("user_prompt", json!("chips"))])).await.unwrap();

    assert_eq!(state.get_str("user_prompt"), Some("chips"));
    assert_eq!(state.get_str("result"), Some("ran ## Instructions"));
    assert_eq!(state.get("trace"), Some(&json!(["c2m", "exec"])));

    let checkpoints = saver.list(&id).await.unwrap();
    let nodes: Vec<_> = checkpoints.iter().map(|c| (c.node.as_str(), c.step)).collect();
    assert_eq!(nodes, vec![(START, 0), ("c2m", 1), ("exec", 2)]);
    assert!(checkpoints[0].state.get("instructions").is_none());
    assert_eq!(checkpoints[1].state.get_str("instructions"), Some("## Instructions"));
    assert_eq!(graph.state(&id).await.unwrap(), Some(state));
}

#[tokio::test]
async fn node_failure_aborts_and_names_the_node() {
    let mut g = StateGraph::new();
    g.add_node("first", writer("first", "a", json!(1))).unwrap();
    g.add_node("boom", node_fn(|_| async { Err::<PartialState, NodeError>("exploded".into()) })).unwrap();
    g.add_node("never", writer("never", "b", json!(2))).unwrap();
    g.add_edge(START, "first").add_edge("first", "boom").add_edge("boom", "never").add_edge("never", END);
    let graph = g.compile(CompileConfig::default()).unwrap();

    match graph.invoke(PartialState::new()).await {
        Err(GraphError::NodeExecution { node, source }) => {
            assert_eq!(node, "boom");
            assert_eq!(source.to_string(), "exploded");
        }
        other => panic!("expected node failure, got {:?}", other.map(|s| s.len())),
    }
}

#[tokio::test]
async fn resume_continues_after_last_checkpoint() {
    let first_runs = Arc::new(AtomicUsize::new(0));
    let flaky_calls = Arc::new(AtomicUsize::new(0));

    let mut g = StateGraph::with_strategies([("trace", KeyStrategy::Append)]);
    let counter = first_runs.clone();
    g.add_node(
        "first",
        node_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, NodeError>(seed(&[("trace", json!("first"))])) }
        }),
    )
    .unwrap();
    let calls = flaky_calls.clone();
    g.add_node(
        "flaky",
        node_fn(move |_| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err::<PartialState, NodeError>("transient".into())
                } else {
                    Ok(seed(&[("trace", json!("flaky"))]))
                }
            }
        }),
    )
    .unwrap();
    g.add_node("last", writer("last", "done", json!(true))).unwrap();
    g.add_edge(START, "first").add_edge("first", "flaky").add_edge("flaky", "last").add_edge("last", END);
    let graph = g.compile(CompileConfig::default()).unwrap();

    let id = InvocationId::new("flaky-run");
    assert!(graph.invoke_with_id(id.clone(), PartialState::new()).await.is_err());
    assert_eq!(graph.state(&id).await.unwrap().unwrap().get("trace"), Some(&json!(["first"])));

    let state = graph.resume(&id).await.unwrap();
    assert_eq!(state.get("trace"), Some(&json!(["first", "flaky", "last"])));
    assert_eq!(first_runs.load(Ordering::SeqCst), 1);

    // Resuming a finished run runs nothing and returns the final state.
    let again = graph.resume(&id).await.unwrap();
    assert_eq!(again, state);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn resume_without_checkpoints() {
    let graph = two_step_graph(Arc::new(MemorySaver::new()));
    let err = graph.resume(&InvocationId::new("unknown")).await.unwrap_err();
    assert!(matches!(err, GraphError::NothingToResume(_)));
}

#[tokio::test]
async fn concurrent_invocations_keep_separate_checkpoints() {
    let saver = Arc::new(MemorySaver::new());
    let graph = Arc::new(two_step_graph(saver.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let graph = graph.clone();
        handles.push(tokio::spawn(async move {
            let id = InvocationId::new(format!("run-{}", i));
            graph.invoke_with_id(id.clone(), seed(&[("user_prompt", json!(i))])).await.map(|s| (id, s))
        }));
    }

    for handle in handles {
        let (id, state) = handle.await.unwrap().unwrap();
        let checkpoints = saver.list(&id).await.unwrap();
        assert_eq!(checkpoints.len(), 3);
        assert!(checkpoints.iter().all(|c| c.invocation_id == id));
        assert_eq!(checkpoints[2].state, state);
    }
    assert_eq!(saver.invocations().len(), 8);
}

#[tokio::test]
async fn undeclared_keys_replace() {
    let mut g = StateGraph::new();
    g.add_node("one", writer("one", "k", json!(1))).unwrap();
    g.add_node("two", writer("two", "k", json!(2))).unwrap();
    g.add_edge(START, "one").add_edge("one", "two").add_edge("two", END);
    let state = g.compile(CompileConfig::default()).unwrap().invoke(PartialState::new()).await.unwrap();
    assert_eq!(state.get("k"), Some(&json!(2)));
    assert_eq!(state.get("trace"), Some(&json!("two")));
}
