//! Step catalog: what each skill step's tool name means
//!
//! A step is not a plain function call. Each one frames an instruction
//! around the user's prompt and hands it to a dedicated agent.

use crate::factory::AgentFactory;
use skillflow_tools::{Tool, ToolContext, ToolRegistry, ToolResult};
use std::sync::Arc;
use tracing::{info, warn};

/// Placeholder replaced by the user's prompt when a step is framed.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Headings the final report is asked to contain, in order.
pub const REPORT_SECTIONS: [&str; 6] = [
    "Development status and trends",
    "Core characteristics",
    "Policy environment",
    "Key competitiveness factors",
    "Challenges and risks",
    "Conclusion",
];

#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    /// Tool name as written in the skill document.
    pub tool: String,
    /// Name of the agent that runs the step.
    pub agent: String,
    pub description: String,
    pub system_prompt: String,
    /// Instruction template containing [`INPUT_PLACEHOLDER`].
    pub instruction: String,
}

impl StepSpec {
    pub fn new(
        tool: impl Into<String>,
        agent: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            agent: agent.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            instruction: instruction.into(),
        }
    }

    pub fn frame(&self, input: &str) -> String {
        self.instruction.replace(INPUT_PLACEHOLDER, input)
    }
}

#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepSpec>,
    synthesis: StepSpec,
}

impl StepCatalog {
    /// An empty catalog with the given final-report step.
    pub fn new(synthesis: StepSpec) -> Self {
        Self { steps: Vec::new(), synthesis }
    }

    /// Add a step, replacing any step with the same tool name.
    pub fn register(&mut self, spec: StepSpec) -> &mut Self {
        match self.steps.iter_mut().find(|s| s.tool == spec.tool) {
            Some(existing) => *existing = spec,
            None => self.steps.push(spec),
        }
        self
    }

    pub fn get(&self, tool: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.tool == tool)
    }

    pub fn contains(&self, tool: &str) -> bool { self.get(tool).is_some() }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool.as_str()).collect()
    }

    pub fn steps(&self) -> &[StepSpec] { &self.steps }

    pub fn synthesis(&self) -> &StepSpec { &self.synthesis }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// The five industry-analysis steps and the industry report writer.
    pub fn industry_analysis() -> Self {
        let synthesis = StepSpec::new(
            "final_report",
            "final-report-agent",
            "Write the complete industry analysis report",
            "You are an industry analysis report writer. Build one complete report \
             from the step results you are given.",
            format!(
                "Based on the analyses below, write a complete industry analysis report for {} \
                 with these sections: {}.",
                INPUT_PLACEHOLDER,
                REPORT_SECTIONS.join(", ")
            ),
        );

        let mut catalog = Self::new(synthesis);
        catalog
            .register(StepSpec::new(
                "get_developmentAnalysis",
                "development-analysis-agent",
                "Get analysis for a given industry, including market trends and development status",
                "You are an industry development analyst. Analyze the overall development of the given industry.",
                "Analyze the development status and trends of the {input} industry",
            ))
            .register(StepSpec::new(
                "get_CharacteristicsAnalysis",
                "characteristics-analysis-agent",
                "Get analysis for a given industry, including administrative measures and the competitive landscape",
                "You are an industry characteristics analyst. Analyze the core characteristics of the given industry.",
                "Analyze the core characteristics of the {input} industry",
            ))
            .register(StepSpec::new(
                "get_EvaluatePolicyEnvironmentTool",
                "policy-environment-agent",
                "Get analysis for a given industry, including a policy evaluation",
                "You are a policy environment analyst. Evaluate the policy environment of the given industry.",
                "Evaluate the policy environment of the {input} industry",
            ))
            .register(StepSpec::new(
                "get_DetermineCoreCompetitivenessFactorsTool",
                "core-competitiveness-agent",
                "Get analysis for a given industry, including its core competitiveness factors",
                "You are a competitiveness analyst. Determine the core competitive factors of the given industry.",
                "Determine the core competitive factors of the {input} industry",
            ))
            .register(StepSpec::new(
                "get_IdentifyIndustryChallengesTool",
                "industry-challenges-agent",
                "Get analysis for a given industry, including the challenges it faces",
                "You are a risk management expert. Identify the main challenges facing the given industry.",
                "Identify the main challenges facing the {input} industry",
            ));
        catalog
    }
}

/// A catalog step exposed as a tool, so an agent can call it by name.
pub struct StepTool {
    spec: StepSpec,
    agents: AgentFactory,
}

impl StepTool {
    pub fn new(spec: StepSpec, agents: AgentFactory) -> Self {
        Self { spec, agents }
    }
}

#[async_trait::async_trait]
impl Tool for StepTool {
    fn name(&self) -> &str { &self.spec.tool }

    fn description(&self) -> &str { &self.spec.description }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let agent = self.agents.build(&self.spec.agent, &self.spec.system_prompt);
        info!(tool = %self.spec.tool, caller = %ctx.agent, "step tool invoked");
        match agent.call(&self.spec.frame(input)).await {
            Ok(message) => ToolResult::text(message.text),
            Err(e) => {
                warn!(tool = %self.spec.tool, error = %e, "step tool failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

/// Register every catalog step as a [`StepTool`] on `registry`.
pub fn register_step_tools(catalog: &StepCatalog, agents: &AgentFactory, registry: &mut ToolRegistry) {
    for spec in catalog.steps() {
        registry.register_arc(Arc::new(StepTool::new(spec.clone(), agents.clone())));
    }
}
