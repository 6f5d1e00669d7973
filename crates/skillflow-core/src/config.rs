//! skillflow configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillflowConfig {
    /// Language model endpoint and sampling.
    pub llm: LlmConfig,
    /// Agent loop limits.
    pub agent: AgentSettings,
    /// Skill document discovery.
    pub skills: SkillsConfig,
    /// Script sandbox settings.
    pub scripts: ScriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat-completions endpoint (OpenAI-compatible).
    pub base_url: String,
    /// Model id sent with every request.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Upper bound on model→tool→model rounds within one `call`.
    pub max_tool_rounds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Directory holding one sub-directory per skill (`<root>/<name>/SKILL.md`).
    pub root: PathBuf,
    /// Skill used when the caller names none.
    pub default_skill: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// External interpreter the scripts are launched with.
    pub interpreter: String,
    /// Script file extension, without the dot.
    pub extension: String,
    /// Hard wall-clock limit per script run.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions".into(),
            model: "qwen-plus".into(),
            api_key_env: "DASHSCOPE_API_KEY".into(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_tool_rounds: 10 }
    }
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("skills"),
            default_skill: "industry-analyst".into(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: "node".into(),
            extension: "js".into(),
            timeout_secs: 30,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl SkillflowConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(crate::Error::IoError(_)) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load config from a TOML file, surfacing read and parse failures.
    pub fn try_load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// `$XDG_CONFIG_HOME/skillflow/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("skillflow").join("config.toml"))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> crate::Result<String> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| crate::Error::config(format!("{} not set", self.llm.api_key_env)))
    }

    /// `<skills root>/<skill>/scripts`
    pub fn scripts_dir(&self, skill: &str) -> PathBuf {
        self.skills.root.join(skill).join("scripts")
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
