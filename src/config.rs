//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Deserialize;

use crate::control::deadband::SetpointRequest;
use crate::control::dispatcher::{ControlMode, CoolingInversionPolicy, ManualSetpoints};
use crate::control::occupant::{FrustrationOccupant, OccupantSettings};
use crate::control::schedule_file::{ScheduleFormat, ScheduleUpload};
use crate::control::thermostat::{
    DefaultSchedule, ExperimentTable, TemperatureUnit, Thermostat, ThermostatSchedule,
};
use crate::error::ControlError;
use crate::sim::clock::Clock;
use crate::sim::engine::StartOptions;
use crate::sim::loopback::LoopbackSettings;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation window, stepping and parallelism.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Building model and zone layout.
    #[serde(default)]
    pub building: BuildingConfig,
    /// Control mode and its inputs.
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub thermostat: ThermostatConfig,
    #[serde(default)]
    pub occupant: OccupantConfig,
}

fn default_time_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 7, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

/// Simulation window, stepping and parallelism.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First simulated instant, e.g. `"2019-07-01T00:00:00"`.
    pub time_start: NaiveDateTime,
    /// End of the simulated window (must be after `time_start`).
    pub time_end: NaiveDateTime,
    /// Engine step length in minutes (must be > 0).
    pub time_step_minutes: u32,
    /// Steps to run per session; 0 runs the whole window.
    pub steps: usize,
    /// Engine speed-up factor (must be > 0).
    pub time_scale: u32,
    pub external_clock: bool,
    /// Independent building sessions to run (must be > 0).
    pub num_models: usize,
    /// Worker threads for the sessions (must be > 0).
    pub num_parallel: usize,
    /// Master random seed; session `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let time_start = default_time_start();
        Self {
            time_start,
            time_end: time_start + TimeDelta::days(1),
            time_step_minutes: 1,
            steps: 0,
            time_scale: 5,
            external_clock: true,
            num_models: 1,
            num_parallel: 1,
            seed: 42,
        }
    }
}

/// Building model and zone layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildingConfig {
    /// Model name, also the prefix of each session alias.
    pub name: String,
    pub model_path: PathBuf,
    /// Zones with HVAC; the first one drives control.
    pub conditioned_zones: Vec<String>,
    pub unconditioned_zones: Vec<String>,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            name: "house".to_string(),
            model_path: PathBuf::from("house.zip"),
            conditioned_zones: vec!["LIVING ZONE".to_string()],
            unconditioned_zones: vec!["ATTIC ZONE".to_string()],
        }
    }
}

/// Control mode and its inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// One of the five control mode names.
    pub mode: String,
    /// Setpoint schedule CSV, used by the schedule mode.
    pub schedule_file: Option<PathBuf>,
    /// `"raise_cooling"` or `"reject"`.
    pub cooling_inversion: String,
    /// Added above `heating + deadband` when cooling is raised.
    pub cooling_inversion_margin: f64,
    pub manual: ManualConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::ScheduleAndOccupantModel.name().to_string(),
            schedule_file: None,
            cooling_inversion: "raise_cooling".to_string(),
            cooling_inversion_margin: 2.0,
            manual: ManualConfig::default(),
        }
    }
}

/// Fixed setpoint requests for the manual mode.
///
/// A missing setpoint means no request for that channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualConfig {
    pub heating_setpoint: Option<f64>,
    pub heating_deadband_up: f64,
    pub heating_deadband_down: f64,
    pub cooling_setpoint: Option<f64>,
    pub cooling_deadband_up: f64,
    pub cooling_deadband_down: f64,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            heating_setpoint: None,
            heating_deadband_up: 0.0,
            heating_deadband_down: 0.0,
            cooling_setpoint: None,
            cooling_deadband_up: 0.0,
            cooling_deadband_down: 0.0,
        }
    }
}

/// Thermostat schedule parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermostatConfig {
    /// `"default"` or `"experiment"`.
    pub schedule: String,
    /// Output unit: `"c"` or `"f"`.
    pub units: String,
    /// Minimum gap between heating and cooling setpoints.
    pub deadband: f64,
    /// Experiment CSV, required by the experiment schedule.
    pub experiment_table: Option<PathBuf>,
    /// Experiments to run, in order; empty runs every table row.
    pub experiments: Vec<String>,
    pub days_per_experiment: u32,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            schedule: "default".to_string(),
            units: "c".to_string(),
            deadband: 0.0,
            experiment_table: None,
            experiments: Vec::new(),
            days_per_experiment: 1,
        }
    }
}

/// Thermal-frustration occupant parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OccupantConfig {
    pub num_occupants: usize,
    /// Preferred indoor temperature (°C).
    pub comfort_temperature: f64,
    /// Frustration memory (0.0-1.0).
    pub tft_alpha: f64,
    /// Weight of the current comfort delta.
    pub tft_beta: f64,
    pub threshold_upper: f64,
    pub threshold_lower: f64,
    /// Per-step habitual override chance (0.0-1.0).
    pub habitual_override_probability: f64,
    /// Per-step motion chance (0.0-1.0).
    pub motion_probability: f64,
}

impl Default for OccupantConfig {
    fn default() -> Self {
        let s = OccupantSettings::default();
        Self {
            num_occupants: s.num_occupants,
            comfort_temperature: s.comfort_temperature,
            tft_alpha: s.tft_alpha,
            tft_beta: s.tft_beta,
            threshold_upper: s.threshold_upper,
            threshold_lower: s.threshold_lower,
            habitual_override_probability: s.habitual_override_probability,
            motion_probability: s.motion_probability,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.time_step_minutes"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: thermostat schedule with occupant overrides.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            building: BuildingConfig::default(),
            control: ControlConfig::default(),
            thermostat: ThermostatConfig::default(),
            occupant: OccupantConfig::default(),
        }
    }

    /// Returns the manual-deadband preset: fixed requests held by the deadband controller.
    pub fn manual_deadband() -> Self {
        Self {
            control: ControlConfig {
                mode: ControlMode::ManualSetpoints.name().to_string(),
                manual: ManualConfig {
                    heating_setpoint: Some(20.0),
                    heating_deadband_up: 0.5,
                    heating_deadband_down: 0.5,
                    cooling_setpoint: Some(24.0),
                    cooling_deadband_up: 0.5,
                    cooling_deadband_down: 0.5,
                },
                ..ControlConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns the passthrough preset: the engine keeps its own setpoints.
    pub fn passthrough() -> Self {
        Self {
            control: ControlConfig {
                mode: ControlMode::Passthrough.name().to_string(),
                ..ControlConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "manual_deadband", "passthrough"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "manual_deadband" => Ok(Self::manual_deadband()),
            "passthrough" => Ok(Self::passthrough()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Files named by the
    /// configuration are not opened here.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.time_step_minutes == 0 {
            errors.push(ConfigError::new("simulation.time_step_minutes", "must be > 0"));
        }
        if s.time_end <= s.time_start {
            errors.push(ConfigError::new(
                "simulation.time_end",
                "must be after simulation.time_start",
            ));
        }
        if s.time_scale == 0 {
            errors.push(ConfigError::new("simulation.time_scale", "must be > 0"));
        }
        if s.num_models == 0 {
            errors.push(ConfigError::new("simulation.num_models", "must be > 0"));
        }
        if s.num_parallel == 0 {
            errors.push(ConfigError::new("simulation.num_parallel", "must be > 0"));
        }

        let b = &self.building;
        if b.name.trim().is_empty() {
            errors.push(ConfigError::new("building.name", "must not be empty"));
        }
        if b.conditioned_zones.is_empty() {
            errors.push(ConfigError::new(
                "building.conditioned_zones",
                "needs at least one zone",
            ));
        }
        if b
            .conditioned_zones
            .iter()
            .chain(&b.unconditioned_zones)
            .any(|z| z.trim().is_empty())
        {
            errors.push(ConfigError::new("building.zones", "zone names must not be empty"));
        }

        let c = &self.control;
        if let Err(e) = self.control_mode() {
            errors.push(ConfigError::new("control.mode", e.to_string()));
        }
        if let Some(path) = &c.schedule_file {
            if let Err(e) = ScheduleFormat::from_path(path) {
                errors.push(ConfigError::new("control.schedule_file", e.to_string()));
            }
        }
        if c.cooling_inversion != "raise_cooling" && c.cooling_inversion != "reject" {
            errors.push(ConfigError::new(
                "control.cooling_inversion",
                format!(
                    "must be \"raise_cooling\" or \"reject\", got \"{}\"",
                    c.cooling_inversion
                ),
            ));
        }
        if !(c.cooling_inversion_margin.is_finite() && c.cooling_inversion_margin > 0.0) {
            errors.push(ConfigError::new("control.cooling_inversion_margin", "must be > 0"));
        }
        let m = &c.manual;
        for (field, value) in [
            ("control.manual.heating_deadband_up", m.heating_deadband_up),
            ("control.manual.heating_deadband_down", m.heating_deadband_down),
            ("control.manual.cooling_deadband_up", m.cooling_deadband_up),
            ("control.manual.cooling_deadband_down", m.cooling_deadband_down),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(field, "must be >= 0"));
            }
        }

        let t = &self.thermostat;
        match t.schedule.as_str() {
            "default" => {}
            "experiment" => {
                if t.experiment_table.is_none() {
                    errors.push(ConfigError::new(
                        "thermostat.experiment_table",
                        "required by the experiment schedule",
                    ));
                }
                if t.days_per_experiment == 0 {
                    errors.push(ConfigError::new("thermostat.days_per_experiment", "must be > 0"));
                }
            }
            other => errors.push(ConfigError::new(
                "thermostat.schedule",
                format!("must be \"default\" or \"experiment\", got \"{other}\""),
            )),
        }
        if TemperatureUnit::parse(&t.units).is_none() {
            errors.push(ConfigError::new(
                "thermostat.units",
                format!("must be \"c\" or \"f\", got \"{}\"", t.units),
            ));
        }
        if !(t.deadband.is_finite() && t.deadband >= 0.0) {
            errors.push(ConfigError::new("thermostat.deadband", "must be >= 0"));
        }

        let o = &self.occupant;
        if !(0.0..=1.0).contains(&o.tft_alpha) {
            errors.push(ConfigError::new("occupant.tft_alpha", "must be in [0.0, 1.0]"));
        }
        if o.threshold_lower >= o.threshold_upper {
            errors.push(ConfigError::new(
                "occupant.threshold_lower",
                "must be < occupant.threshold_upper",
            ));
        }
        for (field, p) in [
            (
                "occupant.habitual_override_probability",
                o.habitual_override_probability,
            ),
            ("occupant.motion_probability", o.motion_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                errors.push(ConfigError::new(field, "must be in [0.0, 1.0]"));
            }
        }

        errors
    }

    /// Parses `control.mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnsupportedControlMode`] for an unknown name.
    pub fn control_mode(&self) -> Result<ControlMode, ControlError> {
        self.control.mode.parse()
    }

    /// Builds the cooling-inversion policy from `control.cooling_inversion`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] if the raise-cooling margin is
    /// not positive.
    pub fn inversion_policy(&self) -> Result<CoolingInversionPolicy, ControlError> {
        if self.control.cooling_inversion == "reject" {
            Ok(CoolingInversionPolicy::Reject)
        } else {
            CoolingInversionPolicy::raise_cooling(self.control.cooling_inversion_margin)
        }
    }

    pub fn manual_setpoints(&self) -> ManualSetpoints {
        let m = &self.control.manual;
        ManualSetpoints {
            heating: m
                .heating_setpoint
                .map(|v| SetpointRequest::new(v, m.heating_deadband_up, m.heating_deadband_down)),
            cooling: m
                .cooling_setpoint
                .map(|v| SetpointRequest::new(v, m.cooling_deadband_up, m.cooling_deadband_down)),
        }
    }

    /// Reads the configured schedule file, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] if the file cannot be read or
    /// its extension is not a known schedule format.
    pub fn schedule_upload(&self) -> Result<Option<ScheduleUpload>, ControlError> {
        self.control
            .schedule_file
            .as_deref()
            .map(ScheduleUpload::from_path)
            .transpose()
    }

    pub fn units(&self) -> Result<TemperatureUnit, ControlError> {
        TemperatureUnit::parse(&self.thermostat.units).ok_or_else(|| {
            ControlError::InvalidInput(format!("unknown temperature unit \"{}\"", self.thermostat.units))
        })
    }

    /// Builds the thermostat schedule, loading the experiment table if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlError`] if the table cannot be loaded, a listed
    /// experiment is missing, or the thermostat parameters are invalid.
    pub fn build_thermostat(&self) -> Result<Thermostat, ControlError> {
        let t = &self.thermostat;
        let schedule = match t.schedule.as_str() {
            "experiment" => {
                let path = t.experiment_table.as_deref().ok_or_else(|| {
                    ControlError::InvalidInput("experiment schedule needs an experiment table".into())
                })?;
                let table = ExperimentTable::from_path(path)?;
                let experiments = if t.experiments.is_empty() {
                    table.experiments().to_vec()
                } else {
                    table.select(&t.experiments)?
                };
                ThermostatSchedule::Experiment {
                    experiments,
                    days_per_experiment: t.days_per_experiment,
                }
            }
            _ => ThermostatSchedule::Default(DefaultSchedule::default()),
        };
        Thermostat::new(schedule, self.units()?, t.deadband)
    }

    pub fn occupant_settings(&self) -> OccupantSettings {
        let o = &self.occupant;
        OccupantSettings {
            num_occupants: o.num_occupants,
            comfort_temperature: o.comfort_temperature,
            tft_alpha: o.tft_alpha,
            tft_beta: o.tft_beta,
            threshold_upper: o.threshold_upper,
            threshold_lower: o.threshold_lower,
            habitual_override_probability: o.habitual_override_probability,
            motion_probability: o.motion_probability,
            ..OccupantSettings::default()
        }
    }

    /// Builds the occupant model of session `index`, seeded with `seed + index`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] for out-of-range occupant parameters.
    pub fn build_occupant(&self, index: usize) -> Result<FrustrationOccupant, ControlError> {
        FrustrationOccupant::new(self.occupant_settings(), self.session_seed(index))
    }

    pub fn time_step(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.simulation.time_step_minutes))
    }

    pub fn start_options(&self) -> StartOptions {
        let s = &self.simulation;
        StartOptions {
            time_start: s.time_start,
            time_end: s.time_end,
            time_scale: s.time_scale,
            external_clock: s.external_clock,
            realtime: false,
            wait: true,
        }
    }

    /// Steps each session runs: `simulation.steps`, or the whole window when 0.
    pub fn total_steps(&self) -> usize {
        let s = &self.simulation;
        if s.steps > 0 {
            s.steps
        } else {
            Clock::spanning(s.time_start, s.time_end, self.time_step()).total()
        }
    }

    /// Alias of session `index`, e.g. `house-0`.
    pub fn session_alias(&self, index: usize) -> String {
        format!("{}-{index}", self.building.name)
    }

    pub fn session_seed(&self, index: usize) -> u64 {
        self.simulation.seed.wrapping_add(index as u64)
    }

    /// Settings of the loopback engine backing session `index`.
    pub fn loopback_settings(&self, index: usize) -> LoopbackSettings {
        LoopbackSettings {
            time_step_minutes: self.simulation.time_step_minutes,
            conditioned_zones: self.building.conditioned_zones.clone(),
            unconditioned_zones: self.building.unconditioned_zones.clone(),
            seed: self.session_seed(index),
            ..LoopbackSettings::default()
        }
    }
}
