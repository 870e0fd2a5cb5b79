//! EscalationHandler — what happens once a conversation is declared silent.
//!
//! Asks the reply generator for a stand-in answer, swaps in a fallback that
//! names the failure when that does not work out, and broadcasts the
//! customer reply plus an admin alert. Never returns an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::{AdminAlertData, CustomerReplyData, GuardEvent};
use crate::providers::{ReplyError, ReplyGenerator, ReplyRequest};
use crate::sessions::SessionTokens;

/// Everything the handler needs about the silent conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRequest {
    pub conversation_id: String,
    pub customer_id: String,
    pub last_message_text: String,
}

/// Outcome of one escalation, also published as a pair of [`GuardEvent`]s.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub escalation_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub customer_reply: String,
    pub admin_alert: String,
    /// false when `customer_reply` is the fallback
    pub generated: bool,
}

pub struct EscalationHandler {
    generator: Arc<dyn ReplyGenerator>,
    sessions: Arc<SessionTokens>,
    reply_timeout: Duration,
    timeout_threshold: Duration,
    event_tx: broadcast::Sender<GuardEvent>,
}

impl EscalationHandler {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        sessions: Arc<SessionTokens>,
        reply_timeout: Duration,
        timeout_threshold: Duration,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            generator,
            sessions,
            reply_timeout,
            timeout_threshold,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.event_tx.subscribe()
    }

    pub async fn handle(&self, request: EscalationRequest) -> Escalation {
        let escalation_id = Uuid::new_v4().to_string();
        warn!(
            escalation_id = %escalation_id,
            "Conversation {} (customer {}) timed out without a staff reply",
            request.conversation_id,
            request.customer_id
        );

        let (customer_reply, generated) = match self.generate_reply(&request).await {
            Ok(text) => (text, true),
            Err(e) => {
                error!(
                    "Reply generation failed for {}: {}",
                    request.conversation_id, e
                );
                (fallback_reply(&e), false)
            }
        };
        let admin_alert = admin_alert(
            &request.conversation_id,
            &request.customer_id,
            self.timeout_threshold,
        );

        let escalation = Escalation {
            escalation_id,
            conversation_id: request.conversation_id,
            customer_id: request.customer_id,
            customer_reply,
            admin_alert,
            generated,
        };
        self.publish(&escalation);
        escalation
    }

    async fn generate_reply(&self, request: &EscalationRequest) -> Result<String, ReplyError> {
        let reply_request = ReplyRequest {
            customer_id: request.customer_id.clone(),
            conversation_id: request.conversation_id.clone(),
            query_text: request.last_message_text.clone(),
            continuation_token: self.sessions.get(&request.conversation_id).await,
        };

        let response = tokio::time::timeout(
            self.reply_timeout,
            self.generator.generate(&reply_request),
        )
        .await
        .map_err(|_| ReplyError::Timeout(self.reply_timeout.as_secs()))??;

        if let Some(token) = response.continuation_token {
            self.sessions.remember(&request.conversation_id, token).await;
        }
        Ok(response.reply_text)
    }

    fn publish(&self, escalation: &Escalation) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let _ = self.event_tx.send(GuardEvent::CustomerReply(CustomerReplyData {
            escalation_id: escalation.escalation_id.clone(),
            conversation_id: escalation.conversation_id.clone(),
            customer_id: escalation.customer_id.clone(),
            text: escalation.customer_reply.clone(),
            generated: escalation.generated,
            timestamp: timestamp.clone(),
        }));
        let _ = self.event_tx.send(GuardEvent::AdminAlert(AdminAlertData {
            escalation_id: escalation.escalation_id.clone(),
            conversation_id: escalation.conversation_id.clone(),
            customer_id: escalation.customer_id.clone(),
            text: escalation.admin_alert.clone(),
            timestamp,
        }));
        info!(
            escalation_id = %escalation.escalation_id,
            generated = escalation.generated,
            "Escalation published for {}",
            escalation.conversation_id
        );
    }
}

/// Customer-facing text used when no generated reply is available. Carries the
/// failure reason so the gap is visible rather than silent.
pub fn fallback_reply(reason: &ReplyError) -> String {
    format!(
        "Hi, I'm the support assistant. Our staff are away right now, but your message \
         has been recorded and someone will get back to you soon. \
         (Automatic reply unavailable: {})",
        reason
    )
}

pub fn admin_alert(conversation_id: &str, customer_id: &str, threshold: Duration) -> String {
    format!(
        "Conversation {} (customer {}) has had no staff reply for over {}s. Please follow up.",
        conversation_id,
        customer_id,
        threshold.as_secs()
    )
}
