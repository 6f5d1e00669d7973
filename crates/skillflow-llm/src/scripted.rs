//! ScriptedProvider - deterministic model behavior for tests and dry runs
//!
//! Each call to `complete_stream` either pops the next queued behavior or
//! asks a responder closure, and streams it back as real deltas would arrive.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use async_stream::stream;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// What the scripted model does on one call.
#[derive(Clone, Debug)]
pub enum ScriptedBehavior {
    /// Return a text-only response
    Text(String),
    /// Return a single tool call with the given name and args
    ToolCall { name: String, args: Value },
    /// Return several tool calls in one response
    MultiToolCall(Vec<(String, Value)>),
    /// Fail the request
    Error(String),
}

impl ScriptedBehavior {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }

    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall { name: name.into(), args }
    }
}

type Responder = Box<dyn Fn(&LlmRequest) -> ScriptedBehavior + Send + Sync>;

pub struct ScriptedProvider {
    queue: Mutex<VecDeque<ScriptedBehavior>>,
    responder: Option<Responder>,
    default_behavior: ScriptedBehavior,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    /// A provider that always returns the same behavior.
    pub fn constant(behavior: ScriptedBehavior) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            default_behavior: behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider with a sequence of behaviors, consumed in order.
    pub fn sequence(behaviors: Vec<ScriptedBehavior>) -> Self {
        Self {
            queue: Mutex::new(behaviors.into()),
            responder: None,
            default_behavior: ScriptedBehavior::Text("(scripted: sequence exhausted)".into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose behavior is computed from each request.
    pub fn from_fn(f: impl Fn(&LlmRequest) -> ScriptedBehavior + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            default_behavior: ScriptedBehavior::Text(String::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of completions requested so far.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Every request received, in order.
    pub async fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_behavior(&self, request: &LlmRequest) -> ScriptedBehavior {
        self.requests.lock().await.push(request.clone());

        if let Some(behavior) = self.queue.lock().await.pop_front() {
            return behavior;
        }
        match &self.responder {
            Some(f) => f(request),
            None => self.default_behavior.clone(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str { "scripted" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let behavior = self.next_behavior(&request).await;

        let stream: LlmStream = match behavior {
            ScriptedBehavior::Error(e) => return Err(LlmError::RequestFailed(e)),
            ScriptedBehavior::Text(text) => Box::pin(text_stream(text)),
            ScriptedBehavior::ToolCall { name, args } => Box::pin(tool_stream(vec![(name, args)])),
            ScriptedBehavior::MultiToolCall(calls) => Box::pin(tool_stream(calls)),
        };
        Ok(stream)
    }
}

fn text_stream(text: String) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    stream! {
        // Stream text in chunks like a real model
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(20) {
            yield Ok(StreamDelta::Text(chunk.iter().collect()));
        }
        yield Ok(StreamDelta::Done { stop_reason: Some("stop".into()), usage: Some(Usage::default()) });
    }
}

fn tool_stream(calls: Vec<(String, Value)>) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    stream! {
        for (name, args) in calls {
            let id = format!("call_scripted_{}", uuid::Uuid::new_v4().simple());
            yield Ok(StreamDelta::ToolCallStart { id: id.clone(), name });
            yield Ok(StreamDelta::ToolCallDelta { id: id.clone(), arguments: args.to_string() });
            yield Ok(StreamDelta::ToolCallEnd { id });
        }
        yield Ok(StreamDelta::Done { stop_reason: Some("tool_calls".into()), usage: Some(Usage::default()) });
    }
}
