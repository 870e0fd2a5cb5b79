//! TimeoutScanner — the periodic sweep that turns silence into escalations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::escalation::{EscalationHandler, EscalationRequest};
use crate::store::ConversationStore;
use crate::types::Conversation;

pub struct TimeoutScanner {
    store: Arc<ConversationStore>,
    handler: Arc<EscalationHandler>,
    clock: Arc<dyn Clock>,
    timeout_threshold: Duration,
    scan_interval: Duration,
}

impl TimeoutScanner {
    pub fn new(
        store: Arc<ConversationStore>,
        handler: Arc<EscalationHandler>,
        clock: Arc<dyn Clock>,
        timeout_threshold: Duration,
        scan_interval: Duration,
    ) -> Self {
        Self {
            store,
            handler,
            clock,
            timeout_threshold,
            scan_interval,
        }
    }

    /// One full pass over the store. Every due conversation is marked escalated
    /// while its lock is held, then the escalations run concurrently and the pass
    /// waits for all of them. Returns how many escalations were started.
    pub async fn tick(&self) -> usize {
        let now = self.clock.now();
        let threshold = self.timeout_threshold;

        let due = self
            .store
            .scan(
                |convo| is_due(convo, now, threshold),
                |convo| {
                    convo.mark_escalated();
                    Some(EscalationRequest {
                        conversation_id: convo.conversation_id.clone(),
                        customer_id: convo
                            .customer_id
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                        last_message_text: convo.last_customer_message_text.clone(),
                    })
                },
            )
            .await;

        let started = due.len();
        if started == 0 {
            debug!("Scan found no silent conversations");
            return 0;
        }
        info!("Scan found {} silent conversation(s)", started);

        let mut tasks = JoinSet::new();
        for request in due {
            let handler = Arc::clone(&self.handler);
            tasks.spawn(async move { handler.handle(request).await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Escalation task failed: {}", e);
            }
        }

        started
    }

    /// Run ticks every `scan_interval` until `shutdown` flips to true. The first
    /// tick happens immediately. Shutdown is only observed between ticks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Timeout scanner started: threshold={}s interval={}s",
            self.timeout_threshold.as_secs(),
            self.scan_interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Timeout scanner stopped.");
    }
}

/// Awaiting a reply, not yet handled, and silent for longer than `threshold`.
fn is_due(convo: &Conversation, now: Instant, threshold: Duration) -> bool {
    if convo.last_customer_message_at.is_none() || convo.is_handled() {
        return false;
    }
    if !convo.is_awaiting_reply() {
        return false;
    }
    convo
        .silent_for(now)
        .is_some_and(|silence| silence > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};
    use crate::escalation::testing::{Script, ScriptedGenerator};
    use crate::events::GuardEvent;
    use crate::ingest::{CustomerMessage, EventIngestor, StaffReply};
    use crate::providers::ReplyError;
    use crate::sessions::SessionTokens;
    use crate::types::WindowPhase;

    const THRESHOLD: Duration = Duration::from_secs(30);
    const INTERVAL: Duration = Duration::from_secs(30);

    struct Harness {
        store: Arc<ConversationStore>,
        clock: Arc<ManualClock>,
        ingestor: EventIngestor,
        handler: Arc<EscalationHandler>,
        scanner: TimeoutScanner,
    }

    fn harness(generator: Arc<ScriptedGenerator>) -> Harness {
        let store = Arc::new(ConversationStore::new());
        let clock = Arc::new(ManualClock::new());
        let handler = Arc::new(EscalationHandler::new(
            generator,
            Arc::new(SessionTokens::new()),
            Duration::from_secs(30),
            THRESHOLD,
        ));
        let ingestor = EventIngestor::new(Arc::clone(&store), clock.clone());
        let scanner = TimeoutScanner::new(
            Arc::clone(&store),
            Arc::clone(&handler),
            clock.clone(),
            THRESHOLD,
            INTERVAL,
        );
        Harness {
            store,
            clock,
            ingestor,
            handler,
            scanner,
        }
    }

    fn customer(id: &str, text: &str) -> CustomerMessage {
        CustomerMessage {
            conversation_id: id.into(),
            customer_id: "alice".into(),
            content: text.into(),
        }
    }

    fn staff(id: &str) -> StaffReply {
        StaffReply {
            conversation_id: id.into(),
            staff_id: "bob".into(),
            content: "sorry for the wait".into(),
        }
    }

    async fn assert_invariant(store: &ConversationStore, id: &str) {
        let convo = store.get(id).await.unwrap();
        if convo.escalated() {
            assert!(convo.is_awaiting_reply(), "escalated without awaiting reply");
        }
    }

    #[tokio::test]
    async fn test_silent_conversation_escalates_once() {
        let generator = ScriptedGenerator::new(Script::Reply("Hang tight!", None));
        let h = harness(generator.clone());
        let mut rx = h.handler.subscribe();

        h.ingestor.customer_message(&customer("c1", "where is my order?")).await.unwrap();
        h.clock.set(Duration::from_secs(35));

        assert_eq!(h.scanner.tick().await, 1);
        assert_eq!(generator.calls(), 1);
        assert_eq!(
            generator.seen.lock().unwrap()[0].query_text,
            "where is my order?"
        );
        assert!(matches!(rx.recv().await.unwrap(), GuardEvent::CustomerReply(_)));
        assert!(matches!(rx.recv().await.unwrap(), GuardEvent::AdminAlert(_)));
        assert_invariant(&h.store, "c1").await;

        // Many more ticks in the same silence window never fire again.
        for step in 1..=5 {
            h.clock.set(Duration::from_secs(35 + step * 30));
            assert_eq!(h.scanner.tick().await, 0);
        }
        assert_eq!(generator.calls(), 1);
        assert!(h.store.get("c1").await.unwrap().escalated());
    }

    #[tokio::test]
    async fn test_staff_reply_before_threshold_prevents_escalation() {
        let generator = ScriptedGenerator::new(Script::Reply("unused", None));
        let h = harness(generator.clone());

        h.ingestor.customer_message(&customer("c1", "hello?")).await.unwrap();
        h.clock.set(Duration::from_secs(10));
        h.ingestor.staff_reply(&staff("c1")).await.unwrap();

        for secs in [35, 65, 300] {
            h.clock.set(Duration::from_secs(secs));
            assert_eq!(h.scanner.tick().await, 0);
            assert_invariant(&h.store, "c1").await;
        }
        assert_eq!(generator.calls(), 0);
        assert_eq!(h.store.get("c1").await.unwrap().phase, WindowPhase::Answered);
    }

    #[tokio::test]
    async fn test_not_due_until_threshold_exceeded() {
        let generator = ScriptedGenerator::new(Script::Reply("ok", None));
        let h = harness(generator.clone());

        h.ingestor.customer_message(&customer("c1", "hi")).await.unwrap();
        h.clock.set(THRESHOLD);
        assert_eq!(h.scanner.tick().await, 0);

        h.clock.set(THRESHOLD + Duration::from_secs(1));
        assert_eq!(h.scanner.tick().await, 1);
    }

    #[tokio::test]
    async fn test_new_message_reopens_eligibility() {
        let generator = ScriptedGenerator::new(Script::Reply("ok", None));
        let h = harness(generator.clone());

        h.ingestor.customer_message(&customer("c1", "first")).await.unwrap();
        h.clock.set(Duration::from_secs(35));
        assert_eq!(h.scanner.tick().await, 1);

        h.clock.set(Duration::from_secs(40));
        h.ingestor.customer_message(&customer("c1", "second")).await.unwrap();
        assert!(!h.store.get("c1").await.unwrap().escalated());

        h.clock.set(Duration::from_secs(65));
        assert_eq!(h.scanner.tick().await, 0);

        h.clock.set(Duration::from_secs(75));
        assert_eq!(h.scanner.tick().await, 1);
        assert_eq!(generator.calls(), 2);
        assert_eq!(generator.seen.lock().unwrap()[1].query_text, "second");
    }

    #[tokio::test]
    async fn test_staff_only_conversation_never_escalates() {
        let generator = ScriptedGenerator::new(Script::Reply("ok", None));
        let h = harness(generator.clone());

        h.ingestor.staff_reply(&staff("c1")).await.unwrap();
        h.clock.set(Duration::from_secs(600));
        assert_eq!(h.scanner.tick().await, 0);
        assert_invariant(&h.store, "c1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_timeout_still_marks_window() {
        let generator = ScriptedGenerator::new(Script::Hang);
        let h = harness(generator.clone());
        let mut rx = h.handler.subscribe();

        h.ingestor.customer_message(&customer("c1", "hello")).await.unwrap();
        h.clock.set(Duration::from_secs(35));
        assert_eq!(h.scanner.tick().await, 1);

        match rx.recv().await.unwrap() {
            GuardEvent::CustomerReply(data) => {
                assert!(!data.generated);
                assert!(data.text.contains("timed out"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(h.store.get("c1").await.unwrap().escalated());

        h.clock.set(Duration::from_secs(65));
        assert_eq!(h.scanner.tick().await, 0);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_block_other_conversations() {
        let generator = ScriptedGenerator::new(Script::Fail(ReplyError::Transport(
            "connection refused".into(),
        )));
        let h = harness(generator.clone());

        for id in ["c1", "c2", "c3"] {
            h.ingestor.customer_message(&customer(id, "help")).await.unwrap();
        }
        h.clock.set(Duration::from_secs(31));

        assert_eq!(h.scanner.tick().await, 3);
        assert_eq!(generator.calls(), 3);
        for id in ["c1", "c2", "c3"] {
            assert!(h.store.get(id).await.unwrap().escalated());
        }
    }

    #[tokio::test]
    async fn test_concurrent_ticks_do_not_double_fire() {
        let generator = ScriptedGenerator::new(Script::Reply("ok", None));
        let h = harness(generator.clone());

        for i in 0..20 {
            h.ingestor
                .customer_message(&customer(&format!("c{}", i), "help"))
                .await
                .unwrap();
        }
        h.clock.set(Duration::from_secs(40));

        let (a, b) = tokio::join!(h.scanner.tick(), h.scanner.tick());
        assert_eq!(a + b, 20);
        assert_eq!(generator.calls(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_on_interval_and_stops() {
        let generator = ScriptedGenerator::new(Script::Reply("ok", None));
        let store = Arc::new(ConversationStore::new());
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let handler = Arc::new(EscalationHandler::new(
            generator.clone(),
            Arc::new(SessionTokens::new()),
            Duration::from_secs(30),
            THRESHOLD,
        ));
        let ingestor = EventIngestor::new(Arc::clone(&store), Arc::clone(&clock));
        let scanner = Arc::new(TimeoutScanner::new(
            Arc::clone(&store),
            handler,
            clock,
            THRESHOLD,
            INTERVAL,
        ));

        ingestor.customer_message(&customer("c1", "hello")).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move { scanner.run(shutdown_rx).await })
        };

        // Ticks land at 0s, 30s (exactly at threshold, not due), 60s, 90s.
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(generator.calls(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
