//! Web server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use replyguard_core::clock::Clock;
use replyguard_core::escalation::EscalationHandler;
use replyguard_core::ingest::EventIngestor;
use replyguard_core::store::ConversationStore;

/// Shared application state.
pub struct AppState {
    pub ingestor: EventIngestor,
    pub store: Arc<ConversationStore>,
    pub clock: Arc<dyn Clock>,
    pub handler: Arc<EscalationHandler>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state)
}
