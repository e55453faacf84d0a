//! API response and query types.
//!
//! Record rows use the same column names as the CSV export.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::FinishedSession;
use crate::sim::kpi::RunSummary;
use crate::sim::record::Cell;

/// One entry of the session list.
#[derive(Debug, Serialize)]
pub struct SessionEntry {
    pub alias: String,
    pub model_name: String,
    pub time_start: NaiveDateTime,
    pub time_end: NaiveDateTime,
    /// Rows recorded.
    pub steps: usize,
    pub summary: RunSummary,
}

impl From<&FinishedSession> for SessionEntry {
    fn from(s: &FinishedSession) -> Self {
        Self {
            alias: s.record.alias.clone(),
            model_name: s.record.model_name.clone(),
            time_start: s.record.time_start,
            time_end: s.record.time_end,
            steps: s.record.len(),
            summary: s.summary.clone(),
        }
    }
}

/// A window of one session's record.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub alias: String,
    /// Step index of the first returned row.
    pub from: usize,
    pub columns: Vec<String>,
    /// Row-major cells aligned with `columns`; missing values are `null`.
    pub rows: Vec<Vec<Cell>>,
}

/// Optional step range for the record endpoint.
#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    /// First step (inclusive).
    pub from: Option<usize>,
    /// Last step (exclusive).
    pub to: Option<usize>,
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
