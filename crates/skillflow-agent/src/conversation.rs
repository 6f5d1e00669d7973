//! Message history of one agent conversation

use skillflow_llm::{ContentBlock, LlmContent, LlmMessage};

#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<LlmMessage>,
}

impl Conversation {
    pub fn new() -> Self { Self::default() }

    pub fn from_messages(messages: Vec<LlmMessage>) -> Self {
        Self { messages }
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(LlmMessage::user(content));
    }

    pub fn push_assistant_text(&mut self, content: &str) {
        self.messages.push(LlmMessage::assistant(content));
    }

    pub fn push_assistant_with_tools(&mut self, text: Option<&str>, tool_calls: Vec<ContentBlock>) {
        let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
        if let Some(t) = text.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::Text { text: t.to_string() });
        }
        blocks.extend(tool_calls);
        self.messages.push(LlmMessage { role: "assistant".into(), content: LlmContent::Blocks(blocks) });
    }

    /// Append a tool result. Results answering the same assistant turn share
    /// one user message.
    pub fn push_tool_result(&mut self, tool_use_id: &str, content: &str, is_error: bool) {
        let block = ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: content.to_string(),
            is_error: if is_error { Some(true) } else { None },
        };

        if let Some(LlmMessage { role, content: LlmContent::Blocks(blocks) }) = self.messages.last_mut() {
            if role.as_str() == "user" && blocks.iter().any(|b| matches!(b, ContentBlock::ToolResult { .. })) {
                blocks.push(block);
                return;
            }
        }
        self.messages.push(LlmMessage { role: "user".into(), content: LlmContent::Blocks(vec![block]) });
    }

    pub fn messages(&self) -> &[LlmMessage] { &self.messages }

    pub fn into_messages(self) -> Vec<LlmMessage> { self.messages }

    pub fn len(&self) -> usize { self.messages.len() }

    pub fn is_empty(&self) -> bool { self.messages.is_empty() }

    pub fn clear(&mut self) { self.messages.clear(); }
}
