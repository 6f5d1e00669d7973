//! Skill step executor
//!
//! Runs a skill's steps one after another through fresh agents. A failing
//! step is recorded and the run moves on; every step gets exactly one
//! [`StepResult`]. The run ends with a synthesis call over the step log.

use crate::catalog::StepCatalog;
use crate::error::SkillError;
use crate::factory::AgentFactory;
use crate::parser::parse_steps;
use crate::registry::SkillRegistry;
use std::fmt::Write as _;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// 1-based position in the skill.
    pub index: usize,
    pub tool: String,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn is_success(&self) -> bool { matches!(self.outcome, StepOutcome::Success(_)) }
}

#[derive(Debug, Clone)]
pub struct SkillReport {
    pub skill: String,
    pub prompt: String,
    pub steps: Vec<StepResult>,
    pub synthesis: String,
}

impl SkillReport {
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.len() - self.succeeded()
    }

    /// The step log followed by the final report.
    pub fn render(&self) -> String {
        let mut out = render_log(&self.skill, &self.prompt, &self.steps);
        out.push_str("## Final Report\n\n");
        out.push_str(&self.synthesis);
        out
    }
}

fn render_log(skill: &str, prompt: &str, steps: &[StepResult]) -> String {
    let mut out = String::from("# Skill Execution Log\n\n");
    let _ = writeln!(out, "Skill: {}", skill);
    let _ = writeln!(out, "Request: {}\n", prompt);
    out.push_str("## Steps\n\n");
    for step in steps {
        let _ = writeln!(out, "### Step {}: invoke tool {}", step.index, step.tool);
        match &step.outcome {
            StepOutcome::Success(text) => {
                let _ = write!(out, "**Result:**\n{}\n\n", text);
            }
            StepOutcome::Failed(message) => {
                let _ = write!(out, "**Failed:** {}\n\n", message);
            }
        }
    }
    out
}

pub struct SkillExecutor {
    agents: AgentFactory,
    catalog: StepCatalog,
    skills: SkillRegistry,
}

impl SkillExecutor {
    /// An executor using the industry-analysis catalog.
    pub fn new(agents: AgentFactory, skills: SkillRegistry) -> Self {
        Self { agents, catalog: StepCatalog::industry_analysis(), skills }
    }

    pub fn with_catalog(mut self, catalog: StepCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &StepCatalog { &self.catalog }

    pub fn skills(&self) -> &SkillRegistry { &self.skills }

    /// Parse the skill's steps, run them all, then synthesize the report.
    pub async fn execute_skill(&self, prompt: &str, skill: &str) -> Result<SkillReport, SkillError> {
        let path = self.skills.resolve(skill)?;
        let steps = parse_steps(&path).await?;
        self.execute_steps(prompt, skill, &steps).await
    }

    pub async fn execute_steps(&self, prompt: &str, skill: &str, steps: &[String]) -> Result<SkillReport, SkillError> {
        if steps.is_empty() {
            return Err(SkillError::NoStepsFound);
        }
        info!(skill = %skill, steps = steps.len(), "skill run started");

        let mut results = Vec::with_capacity(steps.len());
        for (i, tool) in steps.iter().enumerate() {
            let index = i + 1;
            let started = Instant::now();
            let outcome = match self.run_step(prompt, tool).await {
                Ok(text) => {
                    info!(skill = %skill, step = index, tool = %tool, duration_ms = started.elapsed().as_millis() as u64, "step succeeded");
                    StepOutcome::Success(text)
                }
                Err(e) => {
                    error!(skill = %skill, step = index, tool = %tool, error = %e, "step failed");
                    StepOutcome::Failed(e.to_string())
                }
            };
            results.push(StepResult { index, tool: tool.clone(), outcome });
        }

        let synthesis = self.synthesize(prompt, &render_log(skill, prompt, &results)).await?;
        let report = SkillReport { skill: skill.to_string(), prompt: prompt.to_string(), steps: results, synthesis };
        info!(skill = %skill, succeeded = report.succeeded(), failed = report.failed(), "skill run finished");
        Ok(report)
    }

    async fn run_step(&self, prompt: &str, tool: &str) -> Result<String, SkillError> {
        let spec = self.catalog.get(tool).ok_or_else(|| SkillError::UnknownTool(tool.to_string()))?;
        let agent = self.agents.build(&spec.agent, &spec.system_prompt);
        let message = agent.call(&spec.frame(prompt)).await.map_err(|e| SkillError::ToolInvocation {
            tool: tool.to_string(),
            message: e.to_string(),
        })?;
        Ok(message.text)
    }

    async fn synthesize(&self, prompt: &str, log: &str) -> Result<String, SkillError> {
        let spec = self.catalog.synthesis();
        let agent = self.agents.build(&spec.agent, &spec.system_prompt);
        let request = format!("{}\n\n{}", spec.frame(prompt), log);
        let message = agent.call(&request).await.map_err(SkillError::Synthesis)?;
        Ok(message.text)
    }
}
