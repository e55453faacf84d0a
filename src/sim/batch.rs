//! Parallel execution of independent sessions.
//!
//! Sessions share no mutable state, so each one runs start-to-finish on its
//! own worker. Steps inside a session stay strictly sequential.

use log::{error, info};
use rayon::prelude::*;
use thiserror::Error;

use super::engine::SimulationEngine;
use super::record::HistoricalRecord;
use super::session::{Session, SessionError};
use crate::control::occupant::OccupantModel;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of one session in a batch.
#[derive(Debug)]
pub struct SessionOutcome {
    pub alias: String,
    pub result: Result<HistoricalRecord, SessionError>,
}

/// Starts, runs for `steps` steps, and finishes one session.
///
/// # Errors
///
/// Returns the first [`SessionError`] the session hits.
pub fn run_session<E: SimulationEngine, O: OccupantModel>(
    mut session: Session<E, O>,
    steps: usize,
) -> Result<HistoricalRecord, SessionError> {
    session.start()?;
    session.run(steps)?;
    session.finish()
}

/// Runs every session on a pool of at most `num_parallel` workers.
///
/// Outcomes are returned in input order. A failing session does not stop
/// the others.
///
/// # Errors
///
/// Returns [`BatchError::Pool`] if the worker pool cannot be created.
pub fn run_parallel<E, O>(
    sessions: Vec<Session<E, O>>,
    steps: usize,
    num_parallel: usize,
) -> Result<Vec<SessionOutcome>, BatchError>
where
    E: SimulationEngine + Send,
    O: OccupantModel + Send,
{
    let workers = num_parallel.clamp(1, sessions.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!("running {} sessions on {workers} workers", sessions.len());

    let outcomes: Vec<SessionOutcome> = pool.install(|| {
        sessions
            .into_par_iter()
            .map(|session| {
                let alias = session.alias().to_string();
                let result = run_session(session, steps);
                if let Err(e) = &result {
                    error!("{e}");
                }
                SessionOutcome { alias, result }
            })
            .collect()
    });
    Ok(outcomes)
}
