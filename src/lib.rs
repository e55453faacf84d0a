//! Setpoint-decision engine for building HVAC co-simulation.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
/// Deadband control, thermostat schedule, occupant boundary and dispatch.
pub mod control;
pub mod error;
pub mod io;
pub mod runner;
/// Engine protocol, step loop, records and run summaries.
pub mod sim;
