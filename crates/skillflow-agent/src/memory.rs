//! Conversation memory keyed by session

use crate::SessionKey;
use dashmap::DashMap;
use skillflow_llm::LlmMessage;

/// Storage for conversation history between `call`s on the same session.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Prior messages of the session; empty when the session is new.
    async fn load(&self, session: &SessionKey) -> Vec<LlmMessage>;

    async fn save(&self, session: &SessionKey, messages: Vec<LlmMessage>);

    async fn clear(&self, session: &SessionKey);
}

/// Volatile store, lost when the process exits.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<SessionKey, Vec<LlmMessage>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self { Self::default() }

    pub fn list(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, session: &SessionKey) -> Vec<LlmMessage> {
        self.sessions.get(session).map(|m| m.clone()).unwrap_or_default()
    }

    async fn save(&self, session: &SessionKey, messages: Vec<LlmMessage>) {
        self.sessions.insert(session.clone(), messages);
    }

    async fn clear(&self, session: &SessionKey) {
        self.sessions.remove(session);
    }
}
