//! Error taxonomy for setpoint decisions.

use thiserror::Error;

/// Errors raised while deciding the setpoints for one timestep.
///
/// Every variant aborts only the current tick's decision, except
/// [`ControlError::InvalidSetpointOrdering`], which signals a corrupt
/// configuration and ends the session (see [`ControlError::is_fatal`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// A setpoint, deadband, or temperature was missing or not a finite number.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cooling minus deadband does not clear the heating setpoint.
    #[error(
        "invalid setpoint ordering: cooling ({cooling}) - deadband ({deadband}) must exceed heating ({heating})"
    )]
    InvalidSetpointOrdering {
        heating: f64,
        cooling: f64,
        deadband: f64,
    },

    /// An uploaded schedule or experiment table could not be read.
    #[error("schedule parse error: {0}")]
    ScheduleParse(String),

    /// The requested control mode name is not one of the supported modes.
    #[error("unsupported control mode \"{0}\"")]
    UnsupportedControlMode(String),
}

impl ControlError {
    /// Returns `true` when the error must terminate the session rather than
    /// just skip the current tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidSetpointOrdering { .. })
    }
}
