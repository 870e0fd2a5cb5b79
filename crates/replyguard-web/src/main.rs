//! replyguard-web — Axum ingestion server + timeout scanner startup.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use replyguard_core::clock::{Clock, TokioClock};
use replyguard_core::config::Config;
use replyguard_core::escalation::EscalationHandler;
use replyguard_core::events::GuardEvent;
use replyguard_core::ingest::EventIngestor;
use replyguard_core::providers::HttpReplyGenerator;
use replyguard_core::scanner::TimeoutScanner;
use replyguard_core::sessions::SessionTokens;
use replyguard_core::store::ConversationStore;

use server::AppState;

/// Write every escalation to the log. Stands in for the notification layer.
async fn log_events(mut rx: broadcast::Receiver<GuardEvent>) {
    loop {
        match rx.recv().await {
            Ok(GuardEvent::CustomerReply(data)) => {
                info!(
                    escalation_id = %data.escalation_id,
                    generated = data.generated,
                    "[bot -> customer {}] {}",
                    data.customer_id,
                    data.text
                );
            }
            Ok(GuardEvent::AdminAlert(data)) => {
                warn!(
                    escalation_id = %data.escalation_id,
                    "[system -> admin] {}",
                    data.text
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event log lagged {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // No credential, no escalation path: refuse to start.
    let config = Config::load_from_dir(&project_root)?;

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let store = Arc::new(ConversationStore::new());
    let generator = Arc::new(HttpReplyGenerator::new(&config)?);
    let handler = Arc::new(EscalationHandler::new(
        generator,
        Arc::new(SessionTokens::new()),
        config.reply_timeout(),
        config.timeout_threshold(),
    ));
    let scanner = Arc::new(TimeoutScanner::new(
        Arc::clone(&store),
        Arc::clone(&handler),
        Arc::clone(&clock),
        config.timeout_threshold(),
        config.scan_interval(),
    ));

    tokio::spawn(log_events(handler.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner_task = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.run(shutdown_rx).await })
    };

    let state = Arc::new(AppState {
        ingestor: EventIngestor::new(Arc::clone(&store), Arc::clone(&clock)),
        store,
        clock,
        handler,
    });
    let app = server::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "Listening on {} (timeout {}s, scan every {}s)",
        addr, config.timeout_threshold_seconds, config.scan_interval_seconds
    );

    // Graceful shutdown on Ctrl+C
    let shutdown = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping scanner..."),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    if let Err(e) = scanner_task.await {
        error!("Scanner task ended abnormally: {}", e);
    }

    info!("Server stopped.");
    Ok(())
}
