//! Advertises installed skills to the model

use crate::registry::{SkillMetadata, SkillRegistry};
use skillflow_agent::{AgentHook, HookResult};
use skillflow_llm::LlmRequest;
use std::fmt::Write as _;

/// System prompt for chat agents that may apply skills.
pub const SKILLS_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to skills.\n\n\
Whenever you apply a specific skill to analyze or produce content, declare it \
where you use it in the form `-> Using skill: [skill name]`.";

/// Appends the installed-skills catalog to every request's system prompt.
pub struct SkillsPromptHook {
    section: String,
}

impl SkillsPromptHook {
    pub fn new(skills: &[SkillMetadata]) -> Self {
        Self { section: skills_section(skills) }
    }

    /// Snapshot the skills currently under the registry's root.
    pub async fn from_registry(registry: &SkillRegistry) -> Self {
        Self::new(&registry.list().await)
    }

    pub fn section(&self) -> &str { &self.section }
}

fn skills_section(skills: &[SkillMetadata]) -> String {
    if skills.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Available skills\n\n");
    for skill in skills {
        let _ = writeln!(out, "- **{}**: {} (`{}`)", skill.name, skill.description, skill.path.display());
    }
    out
}

#[async_trait::async_trait]
impl AgentHook for SkillsPromptHook {
    fn name(&self) -> &str { "skills" }

    async fn before_model(&self, request: &mut LlmRequest) -> HookResult {
        if self.section.is_empty() {
            return Ok(());
        }
        request.system = Some(match request.system.take() {
            Some(system) => format!("{}\n\n{}", system, self.section),
            None => self.section.clone(),
        });
        Ok(())
    }
}
