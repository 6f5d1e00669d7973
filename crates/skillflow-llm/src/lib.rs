//! skillflow LLM - provider adapters with streaming support

pub mod compat;
pub mod provider;
pub mod scripted;
pub mod types;

pub use compat::OpenAiCompatProvider;
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use scripted::{ScriptedBehavior, ScriptedProvider};
pub use types::*;
