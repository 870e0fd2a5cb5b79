//! replyguard-core — conversation tracking and silence escalation, no transport.
//!
//! Customer messages and staff replies land in a shared [`store::ConversationStore`]
//! through the [`ingest::EventIngestor`]. A [`scanner::TimeoutScanner`] task sweeps
//! the store on a fixed interval and hands every conversation that has gone
//! unanswered past the threshold to the [`escalation::EscalationHandler`], which
//! asks the reply generator for a stand-in answer and broadcasts the results to
//! subscribers via tokio::broadcast.

pub mod clock;
pub mod config;
pub mod escalation;
pub mod events;
pub mod ingest;
pub mod providers;
pub mod scanner;
pub mod sessions;
pub mod store;
pub mod types;
