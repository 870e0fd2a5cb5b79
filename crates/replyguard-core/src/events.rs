//! GuardEvent enum — broadcast from the escalation handler to every subscriber
//! (log sink, admin WebSocket clients) via tokio::broadcast.

use serde::{Deserialize, Serialize};

/// Events emitted once per escalation. Delivery is fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GuardEvent {
    /// Stand-in reply for the customer whose message went unanswered
    #[serde(rename = "customer_reply")]
    CustomerReply(CustomerReplyData),

    /// Heads-up for administrators that a conversation timed out
    #[serde(rename = "admin_alert")]
    AdminAlert(AdminAlertData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerReplyData {
    pub escalation_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub text: String,
    /// false when `text` is the fallback rather than a generated reply
    pub generated: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAlertData {
    pub escalation_id: String,
    pub conversation_id: String,
    pub customer_id: String,
    pub text: String,
    pub timestamp: String,
}
