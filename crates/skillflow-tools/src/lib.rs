//! skillflow tools - the tool contract, the registry, and the script tools
//!
//! Each builtin tool lives in src/tools/. Analysis capabilities supplied by
//! the host are registered as [`FnTool`]s next to them.

pub mod registry;
pub mod tools;

pub use registry::{input_from_args, FnTool, Tool, ToolContext, ToolRegistry, ToolResult};
pub use tools::script::{parse_script_name, ScriptError, ScriptOutput, ScriptRunner, ScriptTool};
pub use tools::script_context::{ContextAction, ScriptContextTool, ScriptInfo};

use skillflow_core::ScriptConfig;
use std::path::Path;
use std::sync::Arc;

/// Registry with the script tools bound to one skill's scripts directory.
pub fn create_script_registry(scripts_dir: impl AsRef<Path>, config: &ScriptConfig) -> ToolRegistry {
    let runner = Arc::new(ScriptRunner::from_config(scripts_dir, config));
    let mut registry = ToolRegistry::new();
    registry.register(ScriptTool::new(runner.clone()));
    registry.register(ScriptContextTool::new(runner));
    registry
}
