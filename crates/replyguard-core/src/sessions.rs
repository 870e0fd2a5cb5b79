//! Continuation tokens handed back by the reply generator, remembered per
//! conversation so a later escalation continues the same generator session.
//! Kept apart from the conversation map: the two share no invariant.

use std::collections::HashMap;

use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct SessionTokens {
    tokens: RwLock<HashMap<String, String>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, conversation_id: &str) -> Option<String> {
        self.tokens.read().await.get(conversation_id).cloned()
    }

    pub async fn remember(&self, conversation_id: &str, token: String) {
        self.tokens
            .write()
            .await
            .insert(conversation_id.to_string(), token);
    }
}
