//! `check_script_context`: report which skill scripts exist and which have
//! been analyzed into the in-memory context.

use crate::registry::{Tool, ToolContext, ToolResult};
use crate::tools::script::ScriptRunner;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Number of function names kept per script.
const MAIN_FUNCTIONS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextAction {
    ListAvailable,
    CheckLoaded,
    CheckScript(String),
    Refresh,
}

struct ActionPatterns {
    specific: [Regex; 3],
    refresh: Regex,
    available: Regex,
    loaded: Regex,
}

fn patterns() -> &'static ActionPatterns {
    static PATTERNS: OnceLock<ActionPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static pattern");
        ActionPatterns {
            specific: [
                re(r"(?i)(?:检查|查看|check)\s*(?:脚本|script)?\s*([A-Za-z0-9_.\-]+)\s*(?:是否)?\s*(?:已加载|loaded)"),
                re(r"(?i)(?:\bis\b|是否)\s*(?:script\s+)?([A-Za-z0-9_.\-]+)\s*(?:loaded|已加载)"),
                re(r"(?i)\bscript\s+([A-Za-z0-9_.\-]+)\s+(?:status|状态)"),
            ],
            refresh: re(r"(?i)刷新|更新|\brefresh\b|\breload\b|\bupdate\b"),
            available: re(r"(?i)可用|列出|\bavailable\b|\blist\b"),
            loaded: re(r"(?i)已加载|内存|\bloaded\b|\bmemory\b|\bcontext\b"),
        }
    })
}

impl ContextAction {
    /// Read the requested action from free text. Script names get the
    /// extension appended when it is missing.
    pub fn parse(input: &str, extension: &str) -> Option<Self> {
        let p = patterns();

        if let Some(name) = p.specific.iter().find_map(|re| re.captures(input).map(|c| c[1].to_string())) {
            let suffix = format!(".{}", extension);
            let name = if name.ends_with(&suffix) { name } else { format!("{}{}", name, suffix) };
            return Some(Self::CheckScript(name));
        }
        if p.refresh.is_match(input) {
            return Some(Self::Refresh);
        }
        if p.available.is_match(input) {
            return Some(Self::ListAvailable);
        }
        if p.loaded.is_match(input) {
            return Some(Self::CheckLoaded);
        }
        None
    }

    fn label(&self) -> &'static str {
        match self {
            Self::ListAvailable => "available scripts",
            Self::CheckLoaded => "loaded scripts",
            Self::CheckScript(_) => "script status",
            Self::Refresh => "refresh context",
        }
    }
}

/// What the context knows about one analyzed script.
#[derive(Clone, Debug)]
pub struct ScriptInfo {
    pub loaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub function_count: usize,
    pub main_functions: Vec<String>,
}

fn function_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:function\s+([A-Za-z0-9_$]+)|([A-Za-z0-9_$]+)\s*[:=]\s*(?:function|\([^)]*\)\s*=>))")
            .expect("static pattern")
    })
}

/// Collect function names declared in a script, one per line at most.
pub fn extract_functions(source: &str) -> Vec<String> {
    source
        .lines()
        .filter(|line| line.contains("function") || line.contains("=>"))
        .filter_map(|line| {
            let caps = function_pattern().captures(line)?;
            caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
        })
        .collect()
}

async fn analyze_script(path: &Path) -> std::io::Result<ScriptInfo> {
    let source = tokio::fs::read_to_string(path).await?;
    let functions = extract_functions(&source);
    Ok(ScriptInfo {
        loaded_at: Utc::now(),
        size_bytes: source.len() as u64,
        function_count: functions.len(),
        main_functions: functions.into_iter().take(MAIN_FUNCTIONS).collect(),
    })
}

pub struct ScriptContextTool {
    runner: Arc<ScriptRunner>,
    loaded: DashMap<String, ScriptInfo>,
}

impl ScriptContextTool {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner, loaded: DashMap::new() }
    }

    pub fn loaded_scripts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn run_action(&self, action: &ContextAction) -> String {
        let body = match action {
            ContextAction::ListAvailable => self.list_available(),
            ContextAction::CheckLoaded => self.check_loaded(),
            ContextAction::CheckScript(name) => self.check_script(name),
            ContextAction::Refresh => self.refresh().await,
        };

        let mut out = format!("## Script context check\n\n**Check:** {}\n", action.label());
        if let ContextAction::CheckScript(name) = action {
            let _ = writeln!(out, "**Script:** {}", name);
        }
        out.push('\n');
        out.push_str(&body);
        out
    }

    fn list_available(&self) -> String {
        let names = self.runner.list();
        let dir = self.runner.scripts_dir().display();
        if names.is_empty() {
            return format!("No scripts found in {}.\n", dir);
        }

        let mut out = format!("Found {} script(s) in {}:\n\n", names.len(), dir);
        for (i, name) in names.iter().enumerate() {
            let status = if self.loaded.contains_key(name) { "loaded" } else { "not loaded" };
            let _ = writeln!(out, "{}. {} ({})", i + 1, name, status);
            match std::fs::metadata(self.runner.scripts_dir().join(name)) {
                Ok(meta) => { let _ = writeln!(out, "   - size: {} bytes", meta.len()); }
                Err(_) => out.push_str("   - size: unknown\n"),
            }
        }
        out
    }

    fn check_loaded(&self) -> String {
        let names = self.loaded_scripts();
        if names.is_empty() {
            return "No scripts are loaded. Ask to refresh the script context to load them.\n".to_string();
        }

        let mut out = format!("{} script(s) loaded:\n\n", names.len());
        for (i, name) in names.iter().enumerate() {
            if let Some(info) = self.loaded.get(name) {
                let _ = writeln!(out, "**{}. {}**", i + 1, name);
                write_info(&mut out, &info);
                out.push('\n');
            }
        }
        out
    }

    fn check_script(&self, name: &str) -> String {
        if let Some(info) = self.loaded.get(name) {
            let mut out = "Loaded into context.\n\n".to_string();
            write_info(&mut out, &info);
            return out;
        }

        let path = self.runner.scripts_dir().join(name);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => format!(
                "Not loaded. The file exists at {} ({} bytes); refresh the script context to load it.\n",
                path.display(),
                meta.len()
            ),
            _ => format!("Not loaded. No such file: {}\n", path.display()),
        }
    }

    async fn refresh(&self) -> String {
        let names = self.runner.list();
        if names.is_empty() {
            return format!("No scripts found in {}.\n", self.runner.scripts_dir().display());
        }

        let mut out = format!("Scanning {} script(s)...\n\n", names.len());
        let (mut ok, mut failed) = (0usize, 0usize);
        for name in names {
            match analyze_script(&self.runner.scripts_dir().join(&name)).await {
                Ok(info) => {
                    let _ = writeln!(out, "- {}: loaded ({} functions)", name, info.function_count);
                    self.loaded.insert(name, info);
                    ok += 1;
                }
                Err(e) => {
                    warn!(script = %name, error = %e, "script analysis failed");
                    let _ = writeln!(out, "- {}: failed ({})", name, e);
                    failed += 1;
                }
            }
        }
        let _ = write!(
            out,
            "\nLoaded: {}, failed: {}, now in context: {}\n",
            ok,
            failed,
            self.loaded.len()
        );
        out
    }
}

fn write_info(out: &mut String, info: &ScriptInfo) {
    let _ = writeln!(out, "- loaded at: {}", info.loaded_at.to_rfc3339());
    let _ = writeln!(out, "- size: {} bytes", info.size_bytes);
    let _ = writeln!(out, "- functions: {}", info.function_count);
    let _ = writeln!(out, "- main functions: {}", info.main_functions.join(", "));
}

#[async_trait::async_trait]
impl Tool for ScriptContextTool {
    fn name(&self) -> &str { "check_script_context" }

    fn description(&self) -> &str {
        "Inspect the skill's scripts: list available scripts, show which are loaded, \
         check one script's status, or refresh the script context."
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        info!(agent = %ctx.agent, "check_script_context: {}", input);
        match ContextAction::parse(input, self.runner.extension()) {
            Some(action) => ToolResult::text(self.run_action(&action).await),
            None => ToolResult::error(format!("could not understand script context request '{}'", input)),
        }
    }
}
