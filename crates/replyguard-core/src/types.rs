//! Core types — Conversation, WindowPhase, ConversationSummary.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ── Silence window ──

/// Where a conversation's current silence window stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPhase {
    /// No customer message yet.
    Idle,
    /// Latest customer message is waiting for a staff reply.
    Awaiting,
    /// The timeout fired for this window and nobody has replied since.
    Escalated,
    /// A staff reply closed the window.
    Answered,
}

impl std::fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowPhase::Idle => write!(f, "idle"),
            WindowPhase::Awaiting => write!(f, "awaiting"),
            WindowPhase::Escalated => write!(f, "escalated"),
            WindowPhase::Answered => write!(f, "answered"),
        }
    }
}

// ── Conversation ──

#[derive(Debug, Clone)]
pub struct Conversation {
    pub conversation_id: String,
    pub customer_id: Option<String>,
    pub last_customer_message_at: Option<Instant>,
    pub last_customer_message_text: String,
    pub last_staff_reply_at: Option<Instant>,
    pub phase: WindowPhase,
}

impl Conversation {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            customer_id: None,
            last_customer_message_at: None,
            last_customer_message_text: String::new(),
            last_staff_reply_at: None,
            phase: WindowPhase::Idle,
        }
    }

    /// A customer message is pending and no staff reply came after it.
    pub fn is_awaiting_reply(&self) -> bool {
        match (self.last_customer_message_at, self.last_staff_reply_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(customer), Some(staff)) => staff < customer,
        }
    }

    pub fn escalated(&self) -> bool {
        self.phase == WindowPhase::Escalated
    }

    /// Escalated or answered: the scanner has nothing left to do for this window.
    pub fn is_handled(&self) -> bool {
        matches!(self.phase, WindowPhase::Escalated | WindowPhase::Answered)
    }

    /// How long the latest customer message has gone without an answer.
    pub fn silent_for(&self, now: Instant) -> Option<Duration> {
        if !self.is_awaiting_reply() {
            return None;
        }
        self.last_customer_message_at
            .map(|at| now.saturating_duration_since(at))
    }

    /// A new customer message reopens the window, even after an escalation.
    /// A staff reply stamped at the same instant already counts as the answer.
    pub fn record_customer_message(&mut self, customer_id: &str, text: &str, now: Instant) {
        if self.customer_id.is_none() {
            self.customer_id = Some(customer_id.to_string());
        }
        self.last_customer_message_at = Some(now);
        self.last_customer_message_text = text.to_string();
        self.phase = if self.is_awaiting_reply() {
            WindowPhase::Awaiting
        } else {
            WindowPhase::Answered
        };
    }

    pub fn record_staff_reply(&mut self, now: Instant) {
        self.last_staff_reply_at = Some(now);
        self.phase = WindowPhase::Answered;
    }

    pub fn mark_escalated(&mut self) {
        self.phase = WindowPhase::Escalated;
    }

    pub fn summary(&self, now: Instant) -> ConversationSummary {
        ConversationSummary {
            conversation_id: self.conversation_id.clone(),
            customer_id: self.customer_id.clone(),
            phase: self.phase,
            awaiting_reply: self.is_awaiting_reply(),
            silent_for_seconds: self.silent_for(now).map(|d| d.as_secs()),
        }
    }
}

// ── Status listing ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub phase: WindowPhase,
    pub awaiting_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent_for_seconds: Option<u64>,
}
