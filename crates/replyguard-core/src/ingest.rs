//! EventIngestor — the two ways state enters the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::clock::Clock;
use crate::store::ConversationStore;

/// An inbound customer message. A missing conversation id deserializes as
/// empty so it is rejected by validation rather than by the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerMessage {
    #[serde(alias = "convo_id", default)]
    pub conversation_id: String,
    pub customer_id: String,
    pub content: String,
}

/// A reply sent by a staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffReply {
    #[serde(alias = "convo_id", default)]
    pub conversation_id: String,
    pub staff_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("conversation id is required")]
    MissingConversationId,
}

pub struct EventIngestor {
    store: Arc<ConversationStore>,
    clock: Arc<dyn Clock>,
}

impl EventIngestor {
    pub fn new(store: Arc<ConversationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn customer_message(&self, msg: &CustomerMessage) -> Result<(), IngestError> {
        validate_conversation_id(&msg.conversation_id)?;
        let now = self.clock.now();
        self.store
            .upsert_on_customer_message(&msg.conversation_id, &msg.customer_id, &msg.content, now)
            .await;

        info!(
            conversation_id = %msg.conversation_id,
            customer_id = %msg.customer_id,
            "[customer] {}",
            truncate(&msg.content, 120)
        );
        Ok(())
    }

    pub async fn staff_reply(&self, msg: &StaffReply) -> Result<(), IngestError> {
        validate_conversation_id(&msg.conversation_id)?;
        let now = self.clock.now();
        self.store
            .upsert_on_staff_reply(&msg.conversation_id, now)
            .await;

        info!(
            conversation_id = %msg.conversation_id,
            staff_id = %msg.staff_id,
            "[staff] {}",
            truncate(&msg.content, 120)
        );
        Ok(())
    }
}

fn validate_conversation_id(conversation_id: &str) -> Result<(), IngestError> {
    if conversation_id.trim().is_empty() {
        return Err(IngestError::MissingConversationId);
    }
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
