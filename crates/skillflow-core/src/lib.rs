//! skillflow core - shared identifiers, configuration and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentSettings, LlmConfig, ScriptConfig, SkillflowConfig, SkillsConfig};
pub use error::{Error, Result};
pub use types::*;
