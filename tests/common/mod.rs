//! Shared test fixtures for integration tests.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use hvac_cosim::control::occupant::{AgentOutput, EnvironmentReading, OccupantModel};
use hvac_cosim::control::{
    ControlDispatcher, ControlMode, CoolingInversionPolicy, ManualSetpoints, TemperatureUnit,
    Thermostat,
};
use hvac_cosim::sim::engine::StartOptions;
use hvac_cosim::sim::loopback::{LoopbackEngine, LoopbackSettings};
use hvac_cosim::sim::session::{Session, SessionSettings};

pub const ZONE: &str = "LIVING ZONE";
pub const ATTIC: &str = "ATTIC ZONE";

/// 2019-07-01 00:00, the start of every fixture session.
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 7, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid timestamp")
}

/// Loopback plant with one conditioned and one unconditioned zone.
pub fn loopback(step_minutes: u32) -> LoopbackSettings {
    LoopbackSettings {
        time_step_minutes: step_minutes,
        conditioned_zones: vec![ZONE.to_string()],
        unconditioned_zones: vec![ATTIC.to_string()],
        ..LoopbackSettings::default()
    }
}

/// Session settings for a two-day window in `mode`.
pub fn session_settings(mode: ControlMode, step_minutes: u32) -> SessionSettings {
    SessionSettings {
        alias: "house-0".to_string(),
        model_name: "house".to_string(),
        model_path: PathBuf::from("house.zip"),
        start: StartOptions {
            time_start: t0(),
            time_end: t0() + TimeDelta::days(2),
            time_scale: 5,
            external_clock: true,
            realtime: false,
            wait: true,
        },
        time_step: TimeDelta::minutes(i64::from(step_minutes)),
        control_mode: mode,
        manual: ManualSetpoints::default(),
        schedule: None,
        conditioned_zones: vec![ZONE.to_string()],
        unconditioned_zones: vec![ATTIC.to_string()],
    }
}

/// Started session with a default-schedule Celsius thermostat.
pub fn started_session<O: OccupantModel>(
    plant: LoopbackSettings,
    occupant: O,
    policy: CoolingInversionPolicy,
    settings: SessionSettings,
) -> Session<LoopbackEngine, O> {
    let thermostat =
        Thermostat::with_default_schedule(TemperatureUnit::Celsius, 0.0).expect("valid thermostat");
    let mut session = Session::new(
        LoopbackEngine::new(plant),
        ControlDispatcher::new(thermostat, occupant, policy),
        settings,
    );
    session.start().expect("session starts");
    session
}

/// An occupant model with no agents.
pub struct NoOccupants;

impl OccupantModel for NoOccupants {
    fn step(&mut self, _reading: &EnvironmentReading) -> Vec<AgentOutput> {
        Vec::new()
    }
}

/// Plays back one agent output per step, repeating the last one.
pub struct Scripted {
    pub outputs: Vec<AgentOutput>,
    pub calls: usize,
}

impl Scripted {
    pub fn new(outputs: Vec<AgentOutput>) -> Self {
        Self { outputs, calls: 0 }
    }
}

impl OccupantModel for Scripted {
    fn step(&mut self, _reading: &EnvironmentReading) -> Vec<AgentOutput> {
        let i = self.calls.min(self.outputs.len().saturating_sub(1));
        self.calls += 1;
        self.outputs.get(i).copied().into_iter().collect()
    }
}

/// An agent asking for the given setpoints.
pub fn agent(heating: f64, cooling: f64, habitual_override: bool) -> AgentOutput {
    AgentOutput {
        heating_setpoint: heating,
        cooling_setpoint: cooling,
        motion: true,
        thermal_frustration: 1.5,
        comfort_delta: -0.5,
        habitual_override,
        discomfort_override: false,
    }
}
