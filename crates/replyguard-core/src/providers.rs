//! Reply generation — the external conversational service that writes the
//! stand-in answer when staff go quiet. Talks to a chat-messages style API
//! over reqwest.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Config;

/// Max chars of an error body kept in a `ReplyError::Status`.
const MAX_ERROR_BODY: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub customer_id: String,
    pub conversation_id: String,
    pub query_text: String,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyResponse {
    pub reply_text: String,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ReplyError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: &ReplyRequest) -> Result<ReplyResponse, ReplyError>;
}

// ── HTTP implementation ──

pub struct HttpReplyGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpReplyGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("API key required for the reply generator")?;

        let client = reqwest::Client::builder()
            .timeout(config.reply_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.reply_endpoint.clone(),
            api_key,
            timeout: config.reply_timeout(),
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ReplyError {
        if e.is_timeout() {
            ReplyError::Timeout(self.timeout.as_secs())
        } else if e.is_decode() {
            ReplyError::Malformed(e.to_string())
        } else {
            ReplyError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate(&self, request: &ReplyRequest) -> Result<ReplyResponse, ReplyError> {
        let body = build_request_body(request);

        debug!(
            "reply request: conversation={} has_token={}",
            request.conversation_id,
            request.continuation_token.is_some()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| unreadable_body(&e));
            error!(
                "Reply generator HTTP {}: {} | url={}",
                status,
                &body[..floor_char_boundary(&body, 500)],
                self.endpoint
            );
            return Err(ReplyError::Status {
                status: status.as_u16(),
                body: body[..floor_char_boundary(&body, MAX_ERROR_BODY)].to_string(),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        parse_reply(&data)
    }
}

/// Stand-in error body when the body itself could not be read.
fn unreadable_body(e: &dyn std::fmt::Display) -> String {
    format!("<error body unreadable: {}>", e)
}

// ── Wire format ──

/// Body for a blocking chat-messages call. An empty `conversation_id` asks the
/// service to open a new session.
fn build_request_body(request: &ReplyRequest) -> serde_json::Value {
    json!({
        "inputs": { "conversation_id": request.conversation_id },
        "query": request.query_text,
        "user": request.customer_id,
        "conversation_id": request.continuation_token.as_deref().unwrap_or(""),
        "response_mode": "blocking",
    })
}

fn parse_reply(data: &serde_json::Value) -> Result<ReplyResponse, ReplyError> {
    let reply_text = data
        .get("answer")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            let raw = data.to_string();
            ReplyError::Malformed(format!(
                "missing \"answer\" in {}",
                &raw[..floor_char_boundary(&raw, 500)]
            ))
        })?
        .to_string();

    let continuation_token = data
        .get("conversation_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(ReplyResponse {
        reply_text,
        continuation_token,
    })
}

/// Largest index <= `max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
