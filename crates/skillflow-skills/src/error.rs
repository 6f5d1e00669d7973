use skillflow_agent::AgentError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("no tool steps found in the Instructions section")]
    NoStepsFound,

    #[error("skill '{0}' not found")]
    SkillNotFound(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("final report synthesis failed: {0}")]
    Synthesis(#[source] AgentError),

    #[error("invalid frontmatter in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SkillError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
