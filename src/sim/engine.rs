//! Simulation engine protocol.
//!
//! The building-physics simulator is an external collaborator reached through
//! blocking request/response calls. [`SimulationEngine`] is the seam the step
//! loop is written against; every call is synchronous and none is retried here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Named sensor values returned by [`SimulationEngine::get_outputs`].
pub type OutputSnapshot = BTreeMap<String, f64>;

/// Named input values accepted by [`SimulationEngine::set_inputs`].
pub type InputMap = BTreeMap<String, f64>;

/// Identifier the engine assigns to a submitted model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteId(pub String);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of [`SimulationEngine::start`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub time_start: NaiveDateTime,
    pub time_end: NaiveDateTime,
    /// Simulated seconds per wall-clock second (ignored with an external clock).
    pub time_scale: u32,
    /// The caller advances the clock explicitly via [`SimulationEngine::advance`].
    pub external_clock: bool,
    pub realtime: bool,
    /// Block until the site reports it is running.
    pub wait: bool,
}

/// Failures of the engine protocol. These propagate to the step loop's caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown site {0}")]
    UnknownSite(SiteId),

    #[error("site {site} is not ready: {status}")]
    NotReady { site: SiteId, status: String },

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stepped building-physics simulator.
pub trait SimulationEngine {
    /// Uploads a model archive and returns the site it was assigned.
    fn submit(&mut self, archive: &Path) -> Result<SiteId, EngineError>;

    fn start(&mut self, site: &SiteId, options: &StartOptions) -> Result<(), EngineError>;

    /// Current value of every output point.
    fn get_outputs(&mut self, site: &SiteId) -> Result<OutputSnapshot, EngineError>;

    fn get_sim_time(&mut self, site: &SiteId) -> Result<NaiveDateTime, EngineError>;

    /// Writes input points; they stay in effect until overwritten.
    fn set_inputs(&mut self, site: &SiteId, inputs: &InputMap) -> Result<(), EngineError>;

    /// Advances every listed site by one timestep.
    fn advance(&mut self, sites: &[SiteId]) -> Result<(), EngineError>;

    fn stop(&mut self, site: &SiteId) -> Result<(), EngineError>;
}
