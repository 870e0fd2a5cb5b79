//! ConversationStore — the shared map every other component reads and writes.
//!
//! The outer `RwLock` only guards membership: it is held long enough to look up
//! or insert a per-conversation handle and never across an await on a
//! conversation. Each conversation sits behind its own `Mutex`, so ingestion for
//! one id never waits on a scan or escalation working on another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::types::{Conversation, ConversationSummary};

type Handle = Arc<Mutex<Conversation>>;

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Handle>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `conversation_id`, creating an idle conversation on first sight.
    async fn handle(&self, conversation_id: &str) -> Handle {
        if let Some(handle) = self.conversations.read().await.get(conversation_id) {
            return Arc::clone(handle);
        }
        let mut conversations = self.conversations.write().await;
        Arc::clone(
            conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(conversation_id)))),
        )
    }

    pub async fn upsert_on_customer_message(
        &self,
        conversation_id: &str,
        customer_id: &str,
        text: &str,
        now: Instant,
    ) {
        let handle = self.handle(conversation_id).await;
        handle
            .lock()
            .await
            .record_customer_message(customer_id, text, now);
    }

    pub async fn upsert_on_staff_reply(&self, conversation_id: &str, now: Instant) {
        let handle = self.handle(conversation_id).await;
        handle.lock().await.record_staff_reply(now);
    }

    /// Walk a point-in-time snapshot of every conversation. For each one where
    /// `predicate` holds, `action` runs against the same locked state, so the
    /// check and whatever `action` writes commit together. Outputs of `action`
    /// are collected and returned once the pass is over.
    pub async fn scan<P, A, T>(&self, predicate: P, mut action: A) -> Vec<T>
    where
        P: Fn(&Conversation) -> bool,
        A: FnMut(&mut Conversation) -> Option<T>,
    {
        let mut out = Vec::new();
        for handle in self.snapshot().await {
            let mut convo = handle.lock().await;
            if predicate(&*convo) {
                if let Some(result) = action(&mut *convo) {
                    out.push(result);
                }
            }
        }
        out
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        let handle = self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()?;
        let convo = handle.lock().await;
        Some(convo.clone())
    }

    /// Summaries of every conversation, ordered by id.
    pub async fn summaries(&self, now: Instant) -> Vec<ConversationSummary> {
        let mut list = Vec::new();
        for handle in self.snapshot().await {
            list.push(handle.lock().await.summary(now));
        }
        list.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        list
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<Handle> {
        self.conversations
            .read()
            .await
            .values()
            .map(Arc::clone)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowPhase;
    use std::time::Duration;

    #[tokio::test]
    async fn test_customer_message_creates_awaiting_conversation() {
        let store = ConversationStore::new();
        let now = Instant::now();
        store
            .upsert_on_customer_message("c1", "alice", "where is my order?", now)
            .await;

        let convo = store.get("c1").await.unwrap();
        assert_eq!(convo.customer_id.as_deref(), Some("alice"));
        assert_eq!(convo.last_customer_message_at, Some(now));
        assert_eq!(convo.last_customer_message_text, "where is my order?");
        assert_eq!(convo.phase, WindowPhase::Awaiting);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_staff_reply_first_creates_conversation() {
        let store = ConversationStore::new();
        store.upsert_on_staff_reply("c1", Instant::now()).await;

        let convo = store.get("c1").await.unwrap();
        assert!(convo.customer_id.is_none());
        assert!(convo.last_customer_message_at.is_none());
        assert!(!convo.is_awaiting_reply());
        assert!(!convo.escalated());
    }

    #[tokio::test]
    async fn test_repeated_staff_reply_only_moves_timestamp() {
        let store = ConversationStore::new();
        let t0 = Instant::now();
        store.upsert_on_customer_message("c1", "alice", "hi", t0).await;
        store.upsert_on_staff_reply("c1", t0 + Duration::from_secs(5)).await;
        let first = store.get("c1").await.unwrap();

        store.upsert_on_staff_reply("c1", t0 + Duration::from_secs(5)).await;
        let second = store.get("c1").await.unwrap();

        assert_eq!(first.phase, second.phase);
        assert_eq!(first.last_staff_reply_at, second.last_staff_reply_at);
        assert_eq!(first.last_customer_message_at, second.last_customer_message_at);
    }

    #[tokio::test]
    async fn test_scan_commits_action_under_predicate() {
        let store = ConversationStore::new();
        let now = Instant::now();
        store.upsert_on_customer_message("c1", "alice", "hi", now).await;
        store.upsert_on_customer_message("c2", "bob", "hey", now).await;
        store.upsert_on_staff_reply("c2", now).await;

        let hits = store
            .scan(
                |c| c.phase == WindowPhase::Awaiting,
                |c| {
                    c.mark_escalated();
                    Some(c.conversation_id.clone())
                },
            )
            .await;

        assert_eq!(hits, vec!["c1".to_string()]);
        assert!(store.get("c1").await.unwrap().escalated());
        assert!(!store.get("c2").await.unwrap().escalated());

        // Already marked, so a second pass finds nothing.
        let again = store
            .scan(|c| c.phase == WindowPhase::Awaiting, |c| Some(c.conversation_id.clone()))
            .await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_summaries_sorted_by_id() {
        let store = ConversationStore::new();
        let now = Instant::now();
        store.upsert_on_customer_message("b", "x", "1", now).await;
        store.upsert_on_customer_message("a", "y", "2", now).await;

        let ids: Vec<String> = store
            .summaries(now)
            .await
            .into_iter()
            .map(|s| s.conversation_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_for_many_ids() {
        let store = Arc::new(ConversationStore::new());
        let now = Instant::now();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                let id = format!("c{}", i % 10);
                store.upsert_on_customer_message(&id, "cust", "msg", now).await;
                store.upsert_on_staff_reply(&id, now).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(store.len().await, 10);
    }
}
