//! REST API for finished session records.
//!
//! Provides two GET endpoints:
//! - `/sessions` lists every session with its run summary
//! - `/sessions/{alias}/record` returns one session's rows, optionally windowed

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::sim::kpi::RunSummary;
use crate::sim::record::HistoricalRecord;

pub use types::{ErrorResponse, RecordQuery, RecordResponse, SessionEntry};

/// A finished session and its summary.
pub struct FinishedSession {
    pub record: HistoricalRecord,
    pub summary: RunSummary,
}

/// Immutable application state shared across all request handlers.
///
/// Constructed once after every session has finished and wrapped in
/// `Arc`; no locks are needed since all data is read-only.
pub struct AppState {
    /// Sessions in alias order.
    pub sessions: Vec<FinishedSession>,
}

impl AppState {
    /// Summarizes each record over its controlled `zone`.
    pub fn from_records(records: Vec<HistoricalRecord>, zone: &str) -> Self {
        let sessions = records
            .into_iter()
            .map(|record| FinishedSession {
                summary: RunSummary::from_record(&record, zone),
                record,
            })
            .collect();
        Self { sessions }
    }

    fn session(&self, alias: &str) -> Option<&FinishedSession> {
        self.sessions.iter().find(|s| s.record.alias == alias)
    }
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{alias}/record", get(handlers::get_record))
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `addr` - Socket address to bind to
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API server listening on http://{addr}");
    axum::serve(listener, app).await
}
