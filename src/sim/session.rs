//! Step loop for one building session.
//!
//! Each step retrieves the engine outputs, asks the dispatcher for setpoints,
//! writes them, advances the engine and appends exactly one row to the
//! session's [`HistoricalRecord`].

use std::path::PathBuf;

use chrono::TimeDelta;
use log::{debug, info, warn};
use thiserror::Error;

use super::clock::Clock;
use super::engine::{EngineError, SimulationEngine, SiteId, StartOptions};
use super::record::{Decision, HistoricalRecord, RecordRow};
use crate::control::dispatcher::{ControlDispatcher, ControlInformation, ControlMode, ManualSetpoints, ZoneState};
use crate::control::occupant::OccupantModel;
use crate::control::schedule_file::ScheduleUpload;
use crate::error::ControlError;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A decision error that invalidates the session's configuration.
    #[error("session {alias}: {source}")]
    Control {
        alias: String,
        #[source]
        source: ControlError,
    },

    /// The engine call failed; the caller decides whether to retry.
    #[error("session {alias}: {source}")]
    Engine {
        alias: String,
        #[source]
        source: EngineError,
    },

    #[error("session {0} was stepped before it was started")]
    NotStarted(String),
}

/// Everything a session needs besides its engine and dispatcher.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub alias: String,
    pub model_name: String,
    pub model_path: PathBuf,
    pub start: StartOptions,
    pub time_step: TimeDelta,
    pub control_mode: ControlMode,
    pub manual: ManualSetpoints,
    pub schedule: Option<ScheduleUpload>,
    /// The first conditioned zone drives control.
    pub conditioned_zones: Vec<String>,
    pub unconditioned_zones: Vec<String>,
}

/// One building: an engine site, its dispatcher and its history.
pub struct Session<E: SimulationEngine, O: OccupantModel> {
    engine: E,
    dispatcher: ControlDispatcher<O>,
    settings: SessionSettings,
    site: Option<SiteId>,
    record: HistoricalRecord,
}

impl<E: SimulationEngine, O: OccupantModel> Session<E, O> {
    /// Creates a session; call [`Session::start`] before stepping.
    ///
    /// # Panics
    ///
    /// Panics if `settings.conditioned_zones` is empty.
    pub fn new(engine: E, dispatcher: ControlDispatcher<O>, settings: SessionSettings) -> Self {
        assert!(
            !settings.conditioned_zones.is_empty(),
            "a session needs at least one conditioned zone"
        );
        let record = HistoricalRecord::new(
            settings.alias.clone(),
            settings.model_name.clone(),
            settings.start.time_start,
            settings.start.time_end,
            &settings.conditioned_zones,
            &settings.unconditioned_zones,
        );
        Self {
            engine,
            dispatcher,
            settings,
            site: None,
            record,
        }
    }

    pub fn alias(&self) -> &str {
        &self.settings.alias
    }

    pub fn record(&self) -> &HistoricalRecord {
        &self.record
    }

    pub fn dispatcher(&self) -> &ControlDispatcher<O> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn engine_err(&self, source: EngineError) -> SessionError {
        SessionError::Engine {
            alias: self.settings.alias.clone(),
            source,
        }
    }

    /// Submits the model and starts the engine site.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] if submit or start fails.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let site = self
            .engine
            .submit(&self.settings.model_path)
            .map_err(|e| self.engine_err(e))?;
        self.engine
            .start(&site, &self.settings.start)
            .map_err(|e| self.engine_err(e))?;
        info!(
            "[{}] started {} on {site} in mode \"{}\"",
            self.settings.alias, self.settings.model_name, self.settings.control_mode
        );
        self.site = Some(site);
        Ok(())
    }

    /// Runs one step and returns the appended row.
    ///
    /// A non-fatal decision error skips the setpoint write for this tick but
    /// the engine is still advanced and a row is still appended.
    ///
    /// # Errors
    ///
    /// * [`SessionError::Control`] - a fatal decision error
    /// * [`SessionError::Engine`] - any engine failure, including simulated
    ///   time moving backwards
    /// * [`SessionError::NotStarted`] - [`Session::start`] was not called
    pub fn step(&mut self) -> Result<&RecordRow, SessionError> {
        let Some(site) = self.site.clone() else {
            return Err(SessionError::NotStarted(self.settings.alias.clone()));
        };

        // 1. Retrieve
        let outputs = self.engine.get_outputs(&site).map_err(|e| self.engine_err(e))?;
        let now = self.engine.get_sim_time(&site).map_err(|e| self.engine_err(e))?;

        // 2. Decide
        let zone_name = &self.settings.conditioned_zones[0];
        let decision = ZoneState::from_snapshot(&outputs, zone_name).and_then(|zone| {
            self.dispatcher.compute_control(
                now,
                self.settings.control_mode,
                &self.settings.manual,
                self.settings.schedule.as_ref(),
                &zone,
            )
        });
        let (info, decision) = match decision {
            Ok((command, info)) if command.is_empty() => (info, Decision::NoCommand),
            Ok((command, info)) => {
                // 3. Apply
                self.engine
                    .set_inputs(&site, &command.to_inputs())
                    .map_err(|e| self.engine_err(e))?;
                (info, Decision::Applied(command))
            }
            Err(e) if e.is_fatal() => {
                return Err(SessionError::Control {
                    alias: self.settings.alias.clone(),
                    source: e,
                });
            }
            Err(e) => {
                warn!("[{}] {now}: decision skipped: {e}", self.settings.alias);
                (ControlInformation::default(), Decision::Skipped(e.to_string()))
            }
        };

        // 4. Advance
        self.engine
            .advance(std::slice::from_ref(&site))
            .map_err(|e| self.engine_err(e))?;

        // 5. Retrieve and record
        let outputs = self.engine.get_outputs(&site).map_err(|e| self.engine_err(e))?;
        let after = self.engine.get_sim_time(&site).map_err(|e| self.engine_err(e))?;
        if let Some(last) = self.record.rows().last() {
            if after < last.time {
                return Err(self.engine_err(EngineError::Protocol(format!(
                    "simulated time went backwards from {} to {after}",
                    last.time
                ))));
            }
        }
        debug!("[{}] {now} -> {after}", self.settings.alias);
        self.record.append(after, &outputs, info, decision);
        self.record
            .rows()
            .last()
            .ok_or_else(|| SessionError::NotStarted(self.settings.alias.clone()))
    }

    /// Runs `steps` steps.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first [`SessionError`].
    pub fn run(&mut self, steps: usize) -> Result<(), SessionError> {
        let mut clock = Clock::new(self.settings.start.time_start, self.settings.time_step, steps);
        clock.try_run(|_| self.step().map(|_| ()))
    }

    /// Stops the engine site and hands back the record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] if the stop call fails.
    pub fn finish(mut self) -> Result<HistoricalRecord, SessionError> {
        if let Some(site) = self.site.take() {
            self.engine.stop(&site).map_err(|e| self.engine_err(e))?;
        }
        info!(
            "[{}] finished after {} steps",
            self.settings.alias,
            self.record.len()
        );
        Ok(self.record)
    }
}
