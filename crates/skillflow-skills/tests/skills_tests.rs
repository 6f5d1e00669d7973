//! Tests for skillflow-skills: step parsing, skill discovery, the step
//! executor's failure isolation, and the instructions pipeline

use serde_json::json;
use skillflow_agent::ReactAgent;
use skillflow_graph::{CheckpointSaver, CompileConfig, GraphError, InvocationId, MemorySaver, PartialState, START};
use skillflow_llm::{LlmProvider, LlmRequest, ScriptedBehavior, ScriptedProvider};
use skillflow_skills::pipeline::{EXECUTION_RESULT_KEY, INSTRUCTIONS_KEY, TRACE_KEY};
use skillflow_skills::*;
use skillflow_tools::{FnTool, ToolContext, ToolRegistry};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FIVE_STEP_SKILL: &str = "\
---
name: industry-analyst
description: Analyze an industry step by step
---

# Industry Analyst

调用工具get_developmentAnalysis is mentioned before the section and must be ignored.

## Instructions
1. 调用工具get_developmentAnalysis分析行业发展情况
2. 调用工具get_CharacteristicsAnalysis
3. Next, invoke tool get_EvaluatePolicyEnvironmentTool
4. 调用工具 get_DetermineCoreCompetitivenessFactorsTool
5. 调用工具get_IdentifyIndustryChallengesTool
Summarize the results.

## Examples
- 调用工具get_weather should not be picked up
";

fn last_user_text(request: &LlmRequest) -> String {
    request.messages.last().map(|m| m.text()).unwrap_or_default()
}

fn is_report_writer(request: &LlmRequest) -> bool {
    request.system.as_deref().is_some_and(|s| s.contains("report writer"))
}

fn full_report() -> String {
    REPORT_SECTIONS.iter().map(|s| format!("## {}\n...\n", s)).collect()
}

/// Step agents echo their instruction; the report writer returns every section.
fn echo_provider() -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::from_fn(|request| {
        if is_report_writer(request) {
            ScriptedBehavior::text(full_report())
        } else {
            ScriptedBehavior::text(format!("analysis: {}", last_user_text(request)))
        }
    }))
}

fn write_skill(root: &Path, name: &str, content: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join("scripts")).unwrap();
    std::fs::write(dir.join(SKILL_FILE), content).unwrap();
}

fn executor(provider: Arc<ScriptedProvider>, root: &Path) -> SkillExecutor {
    SkillExecutor::new(AgentFactory::new(provider), SkillRegistry::new(root))
}

// ===========================================================================
// Step parsing
// ===========================================================================

#[test]
fn parses_steps_inside_instructions_only() {
    let steps = parse_steps_str(FIVE_STEP_SKILL).unwrap();
    assert_eq!(
        steps,
        vec![
            "get_developmentAnalysis",
            "get_CharacteristicsAnalysis",
            "get_EvaluatePolicyEnvironmentTool",
            "get_DetermineCoreCompetitivenessFactorsTool",
            "get_IdentifyIndustryChallengesTool",
        ]
    );
}

#[test]
fn subsection_headers_do_not_end_the_window() {
    let doc = "## Instructions\n### Phase one\n调用工具a\n## More Instructions\n调用工具b\n## Guidelines\n调用工具c\n";
    assert_eq!(parse_steps_str(doc).unwrap(), vec!["a", "b"]);
}

#[test]
fn no_steps_is_an_error() {
    assert!(matches!(parse_steps_str("# Title\n调用工具x\n"), Err(SkillError::NoStepsFound)));
    assert!(matches!(parse_steps_str("## Instructions\nJust prose.\n"), Err(SkillError::NoStepsFound)));
}

#[tokio::test]
async fn missing_document_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = parse_steps(&dir.path().join("nope.md")).await.unwrap_err();
    assert!(matches!(err, SkillError::Io { .. }));
}

#[tokio::test(flavor = "current_thread")]
async fn steps_are_read_from_the_document_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SKILL.md");
    tokio::fs::write(&path, FIVE_STEP_SKILL).await.unwrap();

    let steps = parse_steps(&path).await.unwrap();
    assert_eq!(steps, parse_steps_str(FIVE_STEP_SKILL).unwrap());
    assert_eq!(steps.len(), 5);
}

// ===========================================================================
// Skill registry
// ===========================================================================

#[tokio::test]
async fn registry_lists_skills_sorted() {
    let root = tempfile::tempdir().unwrap();
    write_skill(root.path(), "zeta", "---\nname: zeta\ndescription: last\n---\n");
    write_skill(root.path(), "industry-analyst", FIVE_STEP_SKILL);
    write_skill(root.path(), "untitled", "## Instructions\n调用工具x\n");
    std::fs::create_dir_all(root.path().join("not-a-skill")).unwrap();

    let registry = SkillRegistry::new(root.path());
    let skills = registry.list().await;
    let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["industry-analyst", "untitled", "zeta"]);
    assert_eq!(skills[0].description, "Analyze an industry step by step");
    assert_eq!(skills[0].path, root.path().join("industry-analyst"));
}

#[tokio::test]
async fn registry_rejects_path_like_names() {
    let root = tempfile::tempdir().unwrap();
    write_skill(root.path(), "real", FIVE_STEP_SKILL);
    let registry = SkillRegistry::new(root.path());

    assert_eq!(registry.resolve("real").unwrap(), root.path().join("real").join(SKILL_FILE));
    for name in ["", "../real", "real/../real", "a/b", "missing"] {
        assert!(matches!(registry.resolve(name), Err(SkillError::SkillNotFound(_))), "{name}");
    }
    assert_eq!(registry.scripts_dir("real"), root.path().join("real").join("scripts"));
}

#[tokio::test]
async fn registry_on_missing_root_lists_nothing() {
    let registry = SkillRegistry::new("/definitely/not/a/skills/root");
    assert!(registry.list().await.is_empty());
}

// ===========================================================================
// Step catalog
// ===========================================================================

#[test]
fn industry_catalog_frames_instructions() {
    let catalog = StepCatalog::industry_analysis();
    assert_eq!(catalog.len(), 5);
    assert_eq!(catalog.names()[0], "get_developmentAnalysis");

    let spec = catalog.get("get_developmentAnalysis").unwrap();
    assert_eq!(spec.frame("semiconductor"), "Analyze the development status and trends of the semiconductor industry");

    let report = catalog.synthesis().frame("semiconductor");
    assert!(report.contains("for semiconductor"));
    assert!(REPORT_SECTIONS.iter().all(|s| report.contains(s)));
}

#[test]
fn catalog_register_replaces_by_tool_name() {
    let mut catalog = StepCatalog::industry_analysis();
    catalog.register(StepSpec::new("get_developmentAnalysis", "custom", "d", "sys", "custom {input}"));
    catalog.register(StepSpec::new("get_weather", "weather-agent", "d", "sys", "weather in {input}"));
    assert_eq!(catalog.len(), 6);
    assert_eq!(catalog.names()[0], "get_developmentAnalysis");
    assert_eq!(catalog.get("get_developmentAnalysis").unwrap().agent, "custom");
}

#[tokio::test]
async fn step_tools_run_their_agent() {
    let provider = echo_provider();
    let agents = AgentFactory::new(provider.clone());
    let mut registry = ToolRegistry::new();
    register_step_tools(&StepCatalog::industry_analysis(), &agents, &mut registry);
    assert_eq!(registry.len(), 5);

    let result = registry
        .execute("get_EvaluatePolicyEnvironmentTool", &json!({ "input": "batteries" }), &ToolContext::new("caller"))
        .await;
    assert_eq!(result.to_content_string(), "analysis: Evaluate the policy environment of the batteries industry");

    let request = &provider.requests().await[0];
    assert!(request.system.as_deref().unwrap().contains("policy environment analyst"));
}

// ===========================================================================
// Skill executor
// ===========================================================================

#[tokio::test]
async fn end_to_end_two_step_skill() {
    let root = tempfile::tempdir().unwrap();
    write_skill(
        root.path(),
        "industry-analyst",
        "---\nname: industry-analyst\n---\n## Instructions\n1. 调用工具get_developmentAnalysis\n2. 调用工具get_CharacteristicsAnalysis\n",
    );
    let provider = echo_provider();

    let report = executor(provider.clone(), root.path())
        .execute_skill("semiconductor", "industry-analyst")
        .await
        .unwrap();

    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.steps[0].tool, "get_developmentAnalysis");
    assert_eq!(
        report.steps[0].outcome,
        StepOutcome::Success("analysis: Analyze the development status and trends of the semiconductor industry".into())
    );
    assert_eq!(report.steps[1].tool, "get_CharacteristicsAnalysis");

    let rendered = report.render();
    let first = rendered.find("### Step 1: invoke tool get_developmentAnalysis").unwrap();
    let second = rendered.find("### Step 2: invoke tool get_CharacteristicsAnalysis").unwrap();
    let final_report = rendered.find("## Final Report").unwrap();
    assert!(first < second && second < final_report);
    for section in REPORT_SECTIONS {
        assert!(rendered[final_report..].contains(section), "missing section {section}");
    }
    assert!(rendered.contains("Request: semiconductor"));

    // Two step agents plus one synthesis, each in a fresh conversation.
    let requests = provider.requests().await;
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.messages.len() == 1));
    assert!(last_user_text(&requests[2]).contains("### Step 2: invoke tool get_CharacteristicsAnalysis"));
}

#[tokio::test]
async fn failing_step_is_isolated() {
    let root = tempfile::tempdir().unwrap();
    write_skill(root.path(), "industry-analyst", FIVE_STEP_SKILL);
    let provider = Arc::new(ScriptedProvider::from_fn(|request| {
        if request.system.as_deref().is_some_and(|s| s.contains("characteristics analyst")) {
            ScriptedBehavior::Error("upstream 503".into())
        } else if is_report_writer(request) {
            ScriptedBehavior::text(full_report())
        } else {
            ScriptedBehavior::text("ok")
        }
    }));

    let report = executor(provider.clone(), root.path())
        .execute_skill("semiconductor", "industry-analyst")
        .await
        .unwrap();

    assert_eq!(report.steps.len(), 5);
    assert_eq!(report.steps.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(report.failed(), 1);
    match &report.steps[1].outcome {
        StepOutcome::Failed(message) => {
            assert!(message.contains("get_CharacteristicsAnalysis"));
            assert!(message.contains("upstream 503"));
        }
        other => panic!("step 2 should fail, got {:?}", other),
    }
    assert!(report.render().contains("**Failed:** tool 'get_CharacteristicsAnalysis' failed"));
    assert!(!report.synthesis.is_empty());
    assert_eq!(provider.call_count().await, 6);
}

#[tokio::test]
async fn unknown_step_tool_is_recorded_and_skipped() {
    let provider = echo_provider();
    let dir = tempfile::tempdir().unwrap();
    let steps = vec!["get_weather".to_string(), "get_developmentAnalysis".to_string()];

    let report = executor(provider.clone(), dir.path()).execute_steps("chips", "adhoc", &steps).await.unwrap();

    assert_eq!(report.steps[0].outcome, StepOutcome::Failed("unknown tool: get_weather".into()));
    assert!(report.steps[1].is_success());
    // No agent is built for the unknown step.
    assert_eq!(provider.call_count().await, 2);
}

#[tokio::test]
async fn synthesis_failure_aborts_the_run() {
    let provider = Arc::new(ScriptedProvider::from_fn(|request| {
        if is_report_writer(request) {
            ScriptedBehavior::Error("quota exceeded".into())
        } else {
            ScriptedBehavior::text("ok")
        }
    }));
    let dir = tempfile::tempdir().unwrap();
    let steps = vec!["get_developmentAnalysis".to_string()];

    let err = executor(provider, dir.path()).execute_steps("chips", "adhoc", &steps).await.unwrap_err();
    assert!(matches!(err, SkillError::Synthesis(_)));
}

#[tokio::test]
async fn structural_errors_abort_before_any_model_call() {
    let root = tempfile::tempdir().unwrap();
    write_skill(root.path(), "empty", "---\nname: empty\n---\n## Instructions\nNothing to call.\n");
    let provider = echo_provider();
    let exec = executor(provider.clone(), root.path());

    assert!(matches!(exec.execute_skill("x", "empty").await, Err(SkillError::NoStepsFound)));
    assert!(matches!(exec.execute_skill("x", "ghost").await, Err(SkillError::SkillNotFound(_))));
    assert_eq!(provider.call_count().await, 0);
}

// ===========================================================================
// Skills hook
// ===========================================================================

#[tokio::test]
async fn skills_hook_extends_system_prompt() {
    let root = tempfile::tempdir().unwrap();
    write_skill(root.path(), "industry-analyst", FIVE_STEP_SKILL);
    let hook = SkillsPromptHook::from_registry(&SkillRegistry::new(root.path())).await;
    assert!(hook.section().contains("**industry-analyst**: Analyze an industry step by step"));

    let provider = Arc::new(ScriptedProvider::constant(ScriptedBehavior::text("-> Using skill: [industry-analyst]")));
    let agent = ReactAgent::builder("chat", provider.clone() as Arc<dyn LlmProvider>)
        .system_prompt(SKILLS_SYSTEM_PROMPT)
        .hook(Arc::new(hook))
        .build();
    agent.call("analyze chips").await.unwrap();

    let system = provider.requests().await[0].system.clone().unwrap();
    assert!(system.starts_with(SKILLS_SYSTEM_PROMPT));
    assert!(system.contains("## Available skills"));
}

#[tokio::test]
async fn skills_hook_without_skills_is_a_no_op() {
    let hook = SkillsPromptHook::new(&[]);
    let provider = Arc::new(ScriptedProvider::constant(ScriptedBehavior::text("hi")));
    let agent = ReactAgent::builder("chat", provider.clone() as Arc<dyn LlmProvider>)
        .system_prompt("base")
        .hook(Arc::new(hook))
        .build();
    agent.call("hello").await.unwrap();
    assert_eq!(provider.requests().await[0].system.as_deref(), Some("base"));
}

// ===========================================================================
// Instructions pipeline
// ===========================================================================

#[tokio::test]
async fn pipeline_converts_then_executes() {
    let provider = Arc::new(ScriptedProvider::sequence(vec![
        ScriptedBehavior::text("## Instructions\n1. invoke tool lookup"),
        ScriptedBehavior::tool("lookup", json!({ "input": "chips" })),
        ScriptedBehavior::text("{\"steps\":[{\"tool\":\"lookup\",\"output\":\"found chips\"}]}"),
    ]));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut tools = ToolRegistry::new();
    tools.register(FnTool::new("lookup", "Look something up", move |input: &str, _ctx: &ToolContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        format!("found {}", input)
    }));

    let agents = AgentFactory::new(provider.clone()).with_tools(Arc::new(tools));
    let saver = Arc::new(MemorySaver::new());
    let graph = build_instructions_pipeline(&agents, CompileConfig::with_saver(saver.clone())).unwrap();
    assert_eq!(graph.execution_order(), vec![CONVERT_NODE, EXECUTE_NODE]);

    let id = InvocationId::new("pipeline-1");
    let state = graph.invoke_with_id(id.clone(), pipeline_seed("analyze chips")).await.unwrap();

    assert_eq!(state.get_str(INSTRUCTIONS_KEY), Some("## Instructions\n1. invoke tool lookup"));
    assert!(state.get_str(EXECUTION_RESULT_KEY).unwrap().contains("found chips"));
    assert_eq!(state.get(TRACE_KEY), Some(&json!([CONVERT_NODE, EXECUTE_NODE])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let requests = provider.requests().await;
    // The converter knows the tool names but cannot call them.
    assert!(requests[0].tools.is_none());
    assert!(requests[0].system.as_deref().unwrap().contains("Available tools: lookup"));
    assert_eq!(last_user_text(&requests[1]), "## Instructions\n1. invoke tool lookup");
    assert!(requests[1].tools.is_some());

    let checkpoints = saver.list(&id).await.unwrap();
    let nodes: Vec<_> = checkpoints.iter().map(|c| c.node.as_str()).collect();
    assert_eq!(nodes, vec![START, CONVERT_NODE, EXECUTE_NODE]);
}

#[tokio::test]
async fn pipeline_without_prompt_fails_in_first_node() {
    let provider = Arc::new(ScriptedProvider::constant(ScriptedBehavior::text("unused")));
    let graph = build_instructions_pipeline(&AgentFactory::new(provider.clone()), CompileConfig::default()).unwrap();

    match graph.invoke(PartialState::new()).await {
        Err(GraphError::NodeExecution { node, source }) => {
            assert_eq!(node, CONVERT_NODE);
            assert!(source.to_string().contains("user_prompt"));
        }
        other => panic!("expected node failure, got {:?}", other.map(|s| s.len())),
    }
    assert_eq!(provider.call_count().await, 0);
}
