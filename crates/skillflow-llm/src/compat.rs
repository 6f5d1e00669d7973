//! OpenAI-compatible chat-completions provider with SSE streaming
//!
//! Works against any endpoint speaking the `/chat/completions` streaming
//! dialect. The default base URL is DashScope's compatible mode.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{ContentBlock, LlmContent, LlmMessage, LlmRequest, StreamDelta, Usage};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

const DEFAULT_API_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";

pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str { "openai-compat" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let body = build_body(&request);

        debug!(model = %request.model, messages = request.messages.len(), "chat completion request");

        let response = self.client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("completion error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited { retry_after_ms: 60000 },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let stream = parse_sse_stream(response.bytes_stream());
        Ok(Box::pin(stream))
    }
}

/// Request body in the chat-completions dialect.
pub(crate) fn build_body(request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": to_wire_messages(request.system.as_deref(), &request.messages),
        "stream": true,
        "stream_options": { "include_usage": true },
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
        body["tools"] = Value::Array(
            tools.iter().map(|t| json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })).collect(),
        );
    }
    body
}

/// Flatten block-structured messages into the chat-completions message list.
///
/// Assistant tool_use blocks become `tool_calls`; tool_result blocks become
/// one `role: tool` message each.
pub(crate) fn to_wire_messages(system: Option<&str>, messages: &[LlmMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(json!({ "role": "system", "content": system }));
    }

    for message in messages {
        let blocks = match &message.content {
            LlmContent::Text(text) => {
                out.push(json!({ "role": message.role, "content": text }));
                continue;
            }
            LlmContent::Blocks(blocks) => blocks,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push_str(t),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": input.to_string() },
                })),
                ContentBlock::ToolResult { tool_use_id, content, .. } => out.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                })),
            }
        }

        if !tool_calls.is_empty() {
            out.push(json!({
                "role": message.role,
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                "tool_calls": tool_calls,
            }));
        } else if !text.is_empty() {
            out.push(json!({ "role": message.role, "content": text }));
        }
    }
    out
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let events = bytes_stream.eventsource();
        tokio::pin!(events);

        let mut decoder = ChunkDecoder::default();

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    return;
                }
            };

            let data = event.data.trim();
            if data.is_empty() { continue; }
            if data == "[DONE]" { break; }

            match serde_json::from_str::<ChatChunk>(data) {
                Ok(chunk) => {
                    for delta in decoder.decode(chunk) {
                        yield Ok(delta);
                    }
                }
                Err(e) => {
                    yield Err(LlmError::InvalidResponse(format!("bad chunk: {}: {}", e, data)));
                    return;
                }
            }
        }

        for delta in decoder.finish() {
            yield Ok(delta);
        }
    }
}

/// Turns chat-completion chunks into [`StreamDelta`]s.
///
/// Tool calls arrive keyed by `index`; only the first fragment carries the
/// id and name. Calls are closed when a `finish_reason` shows up.
#[derive(Default)]
pub(crate) struct ChunkDecoder {
    open: BTreeMap<u32, String>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

impl ChunkDecoder {
    pub(crate) fn decode(&mut self, chunk: ChatChunk) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                deltas.push(StreamDelta::Text(text));
            }

            for call in choice.delta.tool_calls {
                let id = match self.open.get(&call.index) {
                    Some(id) => id.clone(),
                    None => {
                        let id = call.id.clone()
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                        let name = call.function.as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();
                        self.open.insert(call.index, id.clone());
                        deltas.push(StreamDelta::ToolCallStart { id: id.clone(), name });
                        id
                    }
                };
                if let Some(arguments) = call.function.and_then(|f| f.arguments).filter(|a| !a.is_empty()) {
                    deltas.push(StreamDelta::ToolCallDelta { id, arguments });
                }
            }

            if let Some(reason) = choice.finish_reason {
                deltas.extend(self.close_open());
                self.stop_reason = Some(reason);
            }
        }

        deltas
    }

    pub(crate) fn finish(&mut self) -> Vec<StreamDelta> {
        let mut deltas = self.close_open();
        deltas.push(StreamDelta::Done {
            stop_reason: self.stop_reason.take().or_else(|| Some("stop".into())),
            usage: self.usage.take(),
        });
        deltas
    }

    fn close_open(&mut self) -> Vec<StreamDelta> {
        std::mem::take(&mut self.open)
            .into_values()
            .map(|id| StreamDelta::ToolCallEnd { id })
            .collect()
    }
}

#[derive(Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LlmTool;

    fn chunk(v: Value) -> ChatChunk {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn decodes_text_and_finish() {
        let mut d = ChunkDecoder::default();
        let deltas = d.decode(chunk(json!({
            "choices": [{ "delta": { "content": "hel" }, "finish_reason": null }]
        })));
        assert!(matches!(&deltas[..], [StreamDelta::Text(t)] if t == "hel"));

        let deltas = d.decode(chunk(json!({
            "choices": [{ "delta": { "content": "lo" }, "finish_reason": "stop" }]
        })));
        assert_eq!(deltas.len(), 1);

        d.decode(chunk(json!({ "choices": [], "usage": { "prompt_tokens": 7, "completion_tokens": 2 } })));
        match d.finish().pop() {
            Some(StreamDelta::Done { stop_reason, usage }) => {
                assert_eq!(stop_reason.as_deref(), Some("stop"));
                assert_eq!(usage, Some(Usage { input_tokens: 7, output_tokens: 2 }));
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[test]
    fn decodes_fragmented_tool_call() {
        let mut d = ChunkDecoder::default();
        let first = d.decode(chunk(json!({
            "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "id": "call_a", "function": { "name": "execute_script", "arguments": "{\"in" } }
            ] } }]
        })));
        assert!(matches!(&first[0], StreamDelta::ToolCallStart { id, name } if id == "call_a" && name == "execute_script"));
        assert!(matches!(&first[1], StreamDelta::ToolCallDelta { arguments, .. } if arguments == "{\"in"));

        let second = d.decode(chunk(json!({
            "choices": [{ "delta": { "tool_calls": [
                { "index": 0, "function": { "arguments": "put\":\"x\"}" } }
            ] }, "finish_reason": "tool_calls" }]
        })));
        assert!(matches!(&second[0], StreamDelta::ToolCallDelta { id, .. } if id == "call_a"));
        assert!(matches!(&second[1], StreamDelta::ToolCallEnd { id } if id == "call_a"));
    }

    #[test]
    fn wire_messages_flatten_tool_blocks() {
        let messages = vec![
            LlmMessage::user("hi"),
            LlmMessage {
                role: "assistant".into(),
                content: LlmContent::Blocks(vec![ContentBlock::ToolUse {
                    id: "c1".into(),
                    name: "get_weather".into(),
                    input: json!({"input": "Hangzhou"}),
                }]),
            },
            LlmMessage {
                role: "user".into(),
                content: LlmContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "c1".into(),
                    content: "sunny".into(),
                    is_error: None,
                }]),
            },
        ];
        let wire = to_wire_messages(Some("be brief"), &messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "get_weather");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "c1");
    }

    #[test]
    fn body_includes_tools_as_functions() {
        let request = LlmRequest {
            tools: Some(vec![LlmTool {
                name: "t".into(),
                description: "d".into(),
                input_schema: json!({"type": "object"}),
            }]),
            temperature: Some(0.2),
            ..Default::default()
        };
        let body = build_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "t");
        assert!(body.get("max_tokens").is_some());
    }
}
