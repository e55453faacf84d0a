//! Scenario wiring: builds one session per model and runs them in parallel.

use log::info;
use thiserror::Error;

use crate::config::ScenarioConfig;
use crate::control::dispatcher::ControlDispatcher;
use crate::control::occupant::FrustrationOccupant;
use crate::error::ControlError;
use crate::sim::batch::{BatchError, SessionOutcome, run_parallel};
use crate::sim::loopback::LoopbackEngine;
use crate::sim::session::{Session, SessionSettings};

/// A session backed by the in-process engine and the built-in occupant.
pub type LoopbackSession = Session<LoopbackEngine, FrustrationOccupant>;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot build sessions: {0}")]
    Build(#[from] ControlError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Builds every session the scenario asks for.
///
/// The schedule file is read once and shared by all sessions. Session `i`
/// is aliased `{building.name}-{i}` and seeded with `seed + i`.
///
/// # Errors
///
/// Returns a [`ControlError`] if the control mode is unknown, the schedule
/// or experiment table cannot be read, or a model parameter is out of range.
///
/// # Panics
///
/// Panics if `building.conditioned_zones` is empty; run
/// [`ScenarioConfig::validate`] first.
pub fn build_sessions(config: &ScenarioConfig) -> Result<Vec<LoopbackSession>, ControlError> {
    let control_mode = config.control_mode()?;
    let schedule = config.schedule_upload()?;
    let manual = config.manual_setpoints();

    (0..config.simulation.num_models)
        .map(|i| {
            let dispatcher = ControlDispatcher::new(
                config.build_thermostat()?,
                config.build_occupant(i)?,
                config.inversion_policy()?,
            );
            let settings = SessionSettings {
                alias: config.session_alias(i),
                model_name: config.building.name.clone(),
                model_path: config.building.model_path.clone(),
                start: config.start_options(),
                time_step: config.time_step(),
                control_mode,
                manual,
                schedule: schedule.clone(),
                conditioned_zones: config.building.conditioned_zones.clone(),
                unconditioned_zones: config.building.unconditioned_zones.clone(),
            };
            Ok(Session::new(
                LoopbackEngine::new(config.loopback_settings(i)),
                dispatcher,
                settings,
            ))
        })
        .collect()
}

/// Builds and runs the scenario, one outcome per session in alias order.
///
/// # Errors
///
/// Returns [`RunError::Build`] if the sessions cannot be built and
/// [`RunError::Batch`] if the worker pool cannot start. Failures inside a
/// session are reported in its [`SessionOutcome`].
pub fn run_scenario(config: &ScenarioConfig) -> Result<Vec<SessionOutcome>, RunError> {
    let sessions = build_sessions(config)?;
    let steps = config.total_steps();
    info!(
        "scenario: {} session(s), {steps} steps of {} min, mode {}",
        sessions.len(),
        config.simulation.time_step_minutes,
        config.control.mode
    );
    Ok(run_parallel(sessions, steps, config.simulation.num_parallel)?)
}
