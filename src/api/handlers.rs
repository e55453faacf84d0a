//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{ErrorResponse, RecordQuery, RecordResponse, SessionEntry};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Lists every session with its run summary.
///
/// `GET /sessions` → 200 + `Vec<SessionEntry>` JSON
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionEntry>> {
    Json(state.sessions.iter().map(SessionEntry::from).collect())
}

/// Returns one session's rows, optionally limited to a step range.
///
/// `GET /sessions/{alias}/record` → 200 + every row
/// `GET /sessions/{alias}/record?from=N&to=M` → steps `N..M`
/// `GET /sessions/{alias}/record?from=10&to=5` → 400 + `ErrorResponse`
/// Unknown alias → 404 + `ErrorResponse`
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(alias): Path<String>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<RecordResponse>, ApiError> {
    let session = state
        .session(&alias)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown session \"{alias}\"")))?;

    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);
    if from > to {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("`from` ({from}) must be <= `to` ({to})"),
        ));
    }

    let record = &session.record;
    let rows = record
        .window(from, to)
        .iter()
        .map(|row| record.row_cells(row))
        .collect();

    Ok(Json(RecordResponse {
        alias,
        from: from.min(record.len()),
        columns: record.column_names(),
        rows,
    }))
}
