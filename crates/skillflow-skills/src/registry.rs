//! Skill discovery
//!
//! Skills live one per directory: `<root>/<name>/SKILL.md`, with scripts in
//! `<root>/<name>/scripts/`. The document opens with YAML frontmatter
//! carrying `name` and `description`.

use crate::error::SkillError;
use serde::{Deserialize, Serialize};
use skillflow_core::SkillsConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Directory holding the skill.
    #[serde(skip)]
    pub path: PathBuf,
}

/// Split `---`-fenced YAML frontmatter off a document.
/// Returns `None` when the document has no frontmatter.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse frontmatter into metadata. A missing `name` falls back to `fallback_name`.
pub fn parse_metadata(content: &str, fallback_name: &str) -> Result<SkillMetadata, String> {
    let mut metadata = match split_frontmatter(content) {
        Some((yaml, _)) if !yaml.trim().is_empty() => {
            serde_yaml::from_str::<SkillMetadata>(yaml).map_err(|e| e.to_string())?
        }
        _ => SkillMetadata::default(),
    };
    if metadata.name.trim().is_empty() {
        metadata.name = fallback_name.to_string();
    }
    Ok(metadata)
}

#[derive(Debug, Clone)]
pub struct SkillRegistry {
    root: PathBuf,
}

impl SkillRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &SkillsConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn skill_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn skill_path(&self, name: &str) -> PathBuf {
        self.skill_dir(name).join(SKILL_FILE)
    }

    pub fn scripts_dir(&self, name: &str) -> PathBuf {
        self.skill_dir(name).join("scripts")
    }

    /// Resolve a skill name to its document, rejecting anything path-like.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, SkillError> {
        let bad = name.is_empty() || name.contains(['/', '\\']) || name.contains("..");
        let path = self.skill_path(name);
        if bad || !path.is_file() {
            return Err(SkillError::SkillNotFound(name.to_string()));
        }
        Ok(path)
    }

    pub async fn load(&self, name: &str) -> Result<SkillMetadata, SkillError> {
        let path = self.resolve(name)?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| SkillError::io(&path, e))?;
        let mut metadata =
            parse_metadata(&content, name).map_err(|message| SkillError::Frontmatter { path: path.clone(), message })?;
        metadata.path = self.skill_dir(name);
        Ok(metadata)
    }

    /// Every skill under the root, sorted by name. Unreadable skills are skipped.
    pub async fn list(&self) -> Vec<SkillMetadata> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "skills root is not readable");
                return Vec::new();
            }
        };

        let mut skills = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().join(SKILL_FILE).is_file() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            match self.load(&dir_name).await {
                Ok(metadata) => skills.push(metadata),
                Err(e) => warn!(skill = %dir_name, error = %e, "failed to load skill"),
            }
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        info!(root = %self.root.display(), count = skills.len(), "skills scanned");
        skills
    }
}
