//! Skill step extraction
//!
//! A skill document is prose. The only structure read from it is the
//! `## Instructions` section, where each line may name one tool with
//! `调用工具<name>` or `invoke tool <name>`. Everything else is ignored.

use crate::error::SkillError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const SECTION_MARKER: &str = "## Instructions";

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:调用工具|(?i:invoke\s+tool))[\s:：`]*([A-Za-z0-9_]+)").expect("static pattern")
    })
}

/// Read a skill document and return its tool steps in order.
pub async fn parse_steps(path: &Path) -> Result<Vec<String>, SkillError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| SkillError::io(path, e))?;
    let steps = parse_steps_str(&text)?;
    debug!(path = %path.display(), steps = ?steps, "parsed skill steps");
    Ok(steps)
}

pub fn parse_steps_str(text: &str) -> Result<Vec<String>, SkillError> {
    let mut steps = Vec::new();
    let mut capturing = false;

    for line in text.lines() {
        if line.contains(SECTION_MARKER) {
            capturing = true;
            continue;
        }
        if !capturing {
            continue;
        }
        if line.starts_with("## ") && !line.contains("Instructions") {
            break;
        }
        if let Some(tool) = step_pattern().captures(line).and_then(|c| c.get(1)) {
            steps.push(tool.as_str().to_string());
        }
    }

    if steps.is_empty() {
        return Err(SkillError::NoStepsFound);
    }
    Ok(steps)
}
