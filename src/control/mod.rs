//! Setpoint decision logic.

/// Deadband hysteresis controller.
pub mod deadband;
/// Per-tick control decisions for the five control modes.
pub mod dispatcher;
/// Occupant behavior boundary and the built-in frustration model.
pub mod occupant;
/// Uploaded CSV and spreadsheet setpoint schedules.
pub mod schedule_file;
/// Thermostat schedule state machine and experiment tables.
pub mod thermostat;

pub use deadband::{HvacMode, SetpointRequest, apply_deadband};
pub use dispatcher::{
    ControlDispatcher, ControlInformation, ControlMode, CoolingInversionPolicy, ManualSetpoints,
    SetpointCommand, ZoneState,
};
pub use occupant::{AgentOutput, EnvironmentReading, FrustrationOccupant, OccupantModel};
pub use thermostat::{TemperatureUnit, Thermostat, ThermostatMode, ThermostatSchedule};
