//! Script sandbox: run a skill script from a throwaway copy under a timeout

use crate::registry::{Tool, ToolContext, ToolResult};
use globset::Glob;
use regex::Regex;
use skillflow_core::ScriptConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("invalid script name '{0}'")]
    InvalidName(String),

    #[error("script not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("script '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("script '{name}' failed with {}: {stderr}", exit_label(.code))]
    Execution { name: String, code: Option<i32>, stderr: String },

    #[error("script io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "no exit code (killed by signal)".to_string(),
    }
}

/// Captured output of a script that exited successfully.
#[derive(Clone, Debug, Default)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

pub struct ScriptRunner {
    scripts_dir: PathBuf,
    interpreter: String,
    extension: String,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(scripts_dir: impl AsRef<Path>) -> Self {
        Self::from_config(scripts_dir, &ScriptConfig::default())
    }

    pub fn from_config(scripts_dir: impl AsRef<Path>, config: &ScriptConfig) -> Self {
        Self {
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
            interpreter: config.interpreter.clone(),
            extension: config.extension.trim_start_matches('.').to_string(),
            timeout: config.timeout(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn scripts_dir(&self) -> &Path { &self.scripts_dir }

    pub fn extension(&self) -> &str { &self.extension }

    /// Map a bare script name to its file under the scripts directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ScriptError> {
        let name = name.trim();
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        let path = self.scripts_dir.join(name);
        if !path.is_file() {
            return Err(ScriptError::NotFound(path));
        }
        Ok(path)
    }

    /// Run a script by file name.
    ///
    /// The script is copied into a fresh temp file and the interpreter runs
    /// the copy with the temp directory as its working directory. The copy is
    /// removed however the run ends.
    pub async fn run(&self, name: &str) -> Result<ScriptOutput, ScriptError> {
        let source = self.resolve(name)?;
        let started_at = Instant::now();

        let sandbox = tempfile::Builder::new()
            .prefix("script_")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        tokio::fs::copy(&source, sandbox.path()).await?;
        let workdir = sandbox.path().parent().unwrap_or_else(|| Path::new("."));

        info!(
            script = %name,
            interpreter = %self.interpreter,
            sandbox = %sandbox.path().display(),
            timeout_ms = self.timeout.as_millis() as u64,
            "script_started"
        );

        let mut child = Command::new(&self.interpreter)
            .arg(sandbox.path())
            .current_dir(workdir)
            .env("SKILLFLOW_SCRIPT_DIR", &self.scripts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| pipe_missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| pipe_missing("stderr"))?;
        let mut stdout_task = tokio::spawn(drain(stdout));
        let mut stderr_task = tokio::spawn(drain(stderr));

        // The deadline covers both the exit and the pipes closing: a
        // backgrounded grandchild can keep stdout open after the script exits.
        let finished = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await?;
            let stdout = join_drain(&mut stdout_task).await?;
            let stderr = join_drain(&mut stderr_task).await?;
            Ok::<_, ScriptError>((status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                warn!(script = %name, timeout_ms = self.timeout.as_millis() as u64, "script_timed_out");
                return Err(ScriptError::Timeout { name: name.to_string(), timeout: self.timeout });
            }
        };

        info!(
            script = %name,
            status = %status,
            duration_ms = started_at.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "script_finished"
        );

        if !status.success() {
            return Err(ScriptError::Execution {
                name: name.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ScriptOutput { stdout, stderr })
    }

    /// File names of the scripts available to run, sorted.
    pub fn list(&self) -> Vec<String> {
        let matcher = match Glob::new(&format!("*.{}", self.extension)) {
            Ok(g) => g.compile_matcher(),
            Err(e) => {
                warn!("invalid script extension '{}': {}", self.extension, e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = WalkDir::new(&self.scripts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && matcher.is_match(e.file_name()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();

        debug!(dir = %self.scripts_dir.display(), count = names.len(), "listed scripts");
        names
    }
}

fn pipe_missing(which: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("script {} is unavailable", which))
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

async fn join_drain(
    task: &mut tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<String, ScriptError> {
    let bytes = task
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn name_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // After a verb the name must carry an extension or end the input,
            // so "execute the demo" does not yield "the".
            Regex::new(
                r"(?i)(?:执行|运行|调用|\bexecute\b)\s*(?:脚本\s*|script\s+)?(?:([A-Za-z0-9_\-]+\.[A-Za-z0-9]+)|([A-Za-z0-9_\-]+)\s*[.!?。！？]?\s*$)",
            )
            .expect("static pattern"),
            Regex::new(r"(?i)\bscript\s+([A-Za-z0-9_.\-]+)").expect("static pattern"),
        ]
    })
}

/// Pull a script file name out of a free-text instruction such as
/// "execute demo" or "执行脚本 demo.js", appending the extension if absent.
pub fn parse_script_name(input: &str, extension: &str) -> Option<String> {
    let input = input.trim();
    let bare = input.chars().all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c));

    let name = name_patterns()
        .iter()
        .find_map(|re| {
            let caps = re.captures(input)?;
            caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
        })
        .or_else(|| (bare && !input.is_empty()).then(|| input.to_string()))?;

    let suffix = format!(".{}", extension);
    if name.ends_with(&suffix) {
        Some(name)
    } else {
        Some(format!("{}{}", name, suffix))
    }
}

/// `execute_script`: run a skill script named in free text.
pub struct ScriptTool {
    runner: Arc<ScriptRunner>,
}

impl ScriptTool {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &str { "execute_script" }

    fn description(&self) -> &str {
        "Execute one of the current skill's scripts and return its output. \
         Input names the script, e.g. 'execute developmentAnalysis.js'."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Instruction naming the script to run, e.g. 'execute demo.js'"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        info!(agent = %ctx.agent, call_id = %ctx.call_id, "execute_script: {}", input);

        let name = match parse_script_name(input, self.runner.extension()) {
            Some(n) => n,
            None => return ToolResult::error(format!("could not find a script name in '{}'", input)),
        };

        match self.runner.run(&name).await {
            Ok(output) => ToolResult::text(format_output(&name, &output)),
            Err(e) => {
                warn!(script = %name, error = %e, "execute_script failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

fn format_output(name: &str, output: &ScriptOutput) -> String {
    let mut out = format!("## Script execution result\n\n**Script:** {}\n**Status:** success\n\n", name);
    out.push_str("### Output\n\n```\n");
    out.push_str(output.stdout.trim_end());
    out.push_str("\n```\n");
    if !output.stderr.trim().is_empty() {
        out.push_str("\n### Stderr\n\n```\n");
        out.push_str(output.stderr.trim_end());
        out.push_str("\n```\n");
    }
    out
}
