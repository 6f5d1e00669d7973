//! skillflow skills - skill documents, the step executor and the instructions pipeline

pub mod catalog;
pub mod error;
pub mod executor;
pub mod factory;
pub mod hook;
pub mod parser;
pub mod pipeline;
pub mod registry;

pub use catalog::{register_step_tools, StepCatalog, StepSpec, StepTool, INPUT_PLACEHOLDER, REPORT_SECTIONS};
pub use error::SkillError;
pub use executor::{SkillExecutor, SkillReport, StepOutcome, StepResult};
pub use factory::AgentFactory;
pub use hook::{SkillsPromptHook, SKILLS_SYSTEM_PROMPT};
pub use parser::{parse_steps, parse_steps_str};
pub use pipeline::{build_instructions_pipeline, pipeline_seed, ConvertNode, ExecuteNode, CONVERT_NODE, EXECUTE_NODE};
pub use registry::{parse_metadata, split_frontmatter, SkillMetadata, SkillRegistry, SKILL_FILE};
