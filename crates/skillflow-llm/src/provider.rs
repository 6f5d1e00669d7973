//! LLM Provider trait

use crate::types::{AccumulatedToolCall, Completion, LlmRequest, StreamDelta};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// LLM Provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a completion response.
    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream>;

    /// Run a completion to the end and collect text and tool calls.
    async fn complete(&self, request: LlmRequest) -> LlmResult<Completion> {
        let stream = self.complete_stream(request).await?;
        collect_stream(stream).await
    }
}

/// Fold a delta stream into a [`Completion`].
///
/// Tool calls are accumulated by id, so interleaved argument fragments for
/// several calls end up on the right call. An error delta fails the whole
/// completion.
pub async fn collect_stream(mut stream: LlmStream) -> LlmResult<Completion> {
    let mut completion = Completion::default();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::Text(text) => completion.text.push_str(&text),
            StreamDelta::ToolCallStart { id, name } => {
                completion.tool_calls.push(AccumulatedToolCall { id, name, arguments: String::new() });
            }
            StreamDelta::ToolCallDelta { id, arguments } => {
                match completion.tool_calls.iter_mut().rev().find(|tc| tc.id == id) {
                    Some(tc) => tc.arguments.push_str(&arguments),
                    None => {
                        return Err(LlmError::InvalidResponse(format!(
                            "arguments for unknown tool call '{}'", id
                        )))
                    }
                }
            }
            StreamDelta::ToolCallEnd { .. } => {}
            StreamDelta::Done { stop_reason, usage } => {
                completion.stop_reason = stop_reason;
                completion.usage = usage;
            }
            StreamDelta::Error(e) => return Err(LlmError::StreamError(e)),
        }
    }

    Ok(completion)
}
