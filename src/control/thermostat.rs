//! Thermostat schedule state machine.
//!
//! A [`Thermostat`] owns one building's [`ThermostatState`] and advances it on
//! every [`Thermostat::update_output`] call. The caller always supplies the
//! current timestamp; nothing here reads the wall clock.
//!
//! Schedule tables are authored in Fahrenheit. Outputs are converted to the
//! configured [`TemperatureUnit`] (rounded to whole degrees for Celsius).

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use log::info;
use serde::Deserialize;

use crate::error::ControlError;

/// Time after which a manual override expires and the schedule resumes.
pub const MANUAL_OVERRIDE_TIMEOUT_HOURS: f64 = 3.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Unit the thermostat reports setpoints in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Parses `"c"`/`"celsius"` or `"f"`/`"fahrenheit"` (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" => Some(Self::Celsius),
            "f" | "fahrenheit" => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    /// Converts a Fahrenheit schedule value into this unit.
    ///
    /// Celsius values are rounded to the nearest whole degree.
    pub fn from_fahrenheit(self, value_f: f64) -> f64 {
        match self {
            Self::Celsius => fahrenheit_to_celsius(value_f).round(),
            Self::Fahrenheit => value_f,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Fahrenheit => "F",
        }
    }
}

/// `(F - 32) * 5 / 9`, unrounded.
pub fn fahrenheit_to_celsius(value_f: f64) -> f64 {
    (value_f - 32.0) * 5.0 / 9.0
}

/// Operating mode of the thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatMode {
    /// Following the regular or experiment schedule.
    Auto,
    /// Holding an occupant or user override until it expires.
    Manual,
    /// Cooling setpoint temporarily offset ahead of an event.
    Precool,
    /// Cooling setpoint temporarily offset during an event.
    Setback,
}

impl ThermostatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Precool => "precool",
            Self::Setback => "setback",
        }
    }
}

impl fmt::Display for ThermostatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day rule: `home` setpoints while awake, `sleep` setpoints otherwise.
///
/// Setpoints are in Fahrenheit.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSchedule {
    /// First awake hour (inclusive).
    pub awake_start_hour: u32,
    /// First sleep hour (inclusive).
    pub awake_end_hour: u32,
    pub home_heat_f: f64,
    pub home_cool_f: f64,
    pub sleep_heat_f: f64,
    pub sleep_cool_f: f64,
}

impl Default for DefaultSchedule {
    fn default() -> Self {
        Self {
            awake_start_hour: 6,
            awake_end_hour: 22,
            home_heat_f: 69.0,
            home_cool_f: 78.0,
            sleep_heat_f: 67.0,
            sleep_cool_f: 80.0,
        }
    }
}

impl DefaultSchedule {
    /// Returns `(label, heat_f, cool_f)` for the given hour of day.
    fn params_at(&self, hour: u32) -> (&'static str, f64, f64) {
        if hour >= self.awake_start_hour && hour < self.awake_end_hour {
            ("home", self.home_heat_f, self.home_cool_f)
        } else {
            ("sleep", self.sleep_heat_f, self.sleep_cool_f)
        }
    }
}

/// A time-boxed offset applied to the cooling setpoint (precool or setback).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedOffset {
    /// Hour of day the window opens (fractional hours allowed, `[0, 24)`).
    pub start_hour: f64,
    /// Window length in hours (`> 0`).
    pub duration_hours: f64,
    /// Degrees Fahrenheit added to the nominal cooling setpoint.
    pub offset_f: f64,
}

impl TimedOffset {
    fn start_second_of_day(&self) -> u32 {
        (self.start_hour * SECONDS_PER_HOUR).round() as u32
    }

    fn open(&self, now: NaiveDateTime) -> ActiveWindow {
        ActiveWindow {
            started: now,
            duration_hours: self.duration_hours,
        }
    }

    fn validate(&self, what: &str, experiment: &str) -> Result<(), ControlError> {
        if !(0.0..24.0).contains(&self.start_hour) {
            return Err(ControlError::InvalidInput(format!(
                "experiment \"{experiment}\": {what} start hour must be in [0, 24), got {}",
                self.start_hour
            )));
        }
        if !(self.duration_hours > 0.0) {
            return Err(ControlError::InvalidInput(format!(
                "experiment \"{experiment}\": {what} duration must be > 0, got {}",
                self.duration_hours
            )));
        }
        if !self.offset_f.is_finite() {
            return Err(ControlError::InvalidInput(format!(
                "experiment \"{experiment}\": {what} offset must be finite"
            )));
        }
        Ok(())
    }
}

/// A precool or setback window in progress.
///
/// Holds its own duration so the window closes on time even after the
/// experiment that opened it has rotated out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveWindow {
    pub started: NaiveDateTime,
    pub duration_hours: f64,
}

impl ActiveWindow {
    /// True on the first tick at or past `started + duration_hours`.
    fn has_elapsed(&self, now: NaiveDateTime) -> bool {
        let elapsed = now.signed_duration_since(self.started).num_seconds() as f64;
        elapsed >= self.duration_hours * SECONDS_PER_HOUR
    }
}

/// One named experiment: fixed nominal setpoints plus optional windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub name: String,
    pub setpoint_heat_f: f64,
    pub setpoint_cool_f: f64,
    pub precool: Option<TimedOffset>,
    pub setback: Option<TimedOffset>,
}

/// Raw experiment-table row. Empty cells deserialize to `None`.
#[derive(Debug, Deserialize)]
struct ExperimentRow {
    #[serde(alias = "name", alias = "Experiment")]
    experiment: String,
    setpoint_cool: f64,
    setpoint_heat: f64,
    sb_offset: Option<f64>,
    sb_start: Option<f64>,
    sb_duration: Option<f64>,
    pc_deg: Option<f64>,
    pc_dur: Option<f64>,
    pc_start: Option<f64>,
}

impl ExperimentRow {
    fn into_experiment(self, line: usize) -> Result<Experiment, ControlError> {
        let window = |what: &str,
                      start: Option<f64>,
                      dur: Option<f64>,
                      offset: Option<f64>|
         -> Result<Option<TimedOffset>, ControlError> {
            match (start, dur, offset) {
                (None, None, None) => Ok(None),
                (Some(start_hour), Some(duration_hours), Some(offset_f)) => Ok(Some(TimedOffset {
                    start_hour,
                    duration_hours,
                    offset_f,
                })),
                _ => Err(ControlError::ScheduleParse(format!(
                    "experiment table line {line}: {what} window for \"{}\" is incomplete",
                    self.experiment
                ))),
            }
        };
        let precool = window("precool", self.pc_start, self.pc_dur, self.pc_deg)?;
        let setback = window("setback", self.sb_start, self.sb_duration, self.sb_offset)?;
        Ok(Experiment {
            name: self.experiment.trim().to_string(),
            setpoint_heat_f: self.setpoint_heat,
            setpoint_cool_f: self.setpoint_cool,
            precool,
            setback,
        })
    }
}

/// Experiments loaded from a CSV table, one row per experiment name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentTable {
    experiments: Vec<Experiment>,
}

impl ExperimentTable {
    /// Reads an experiment table from CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] on malformed rows or
    /// incomplete precool/setback windows.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ControlError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut experiments = Vec::new();
        for (i, row) in rdr.deserialize::<ExperimentRow>().enumerate() {
            // header is line 1
            let line = i + 2;
            let row = row.map_err(|e| {
                ControlError::ScheduleParse(format!("experiment table line {line}: {e}"))
            })?;
            experiments.push(row.into_experiment(line)?);
        }
        Ok(Self { experiments })
    }

    /// Reads an experiment table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] if the file cannot be opened or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ControlError> {
        let file = File::open(path).map_err(|e| {
            ControlError::ScheduleParse(format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    /// Picks experiments by name, in the requested order.
    ///
    /// An empty `names` slice selects every row in table order.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] for a name the table lacks.
    pub fn select(&self, names: &[String]) -> Result<Vec<Experiment>, ControlError> {
        if names.is_empty() {
            return Ok(self.experiments.clone());
        }
        names
            .iter()
            .map(|name| {
                self.experiments
                    .iter()
                    .find(|e| e.name == *name)
                    .cloned()
                    .ok_or_else(|| {
                        ControlError::InvalidInput(format!(
                            "experiment \"{name}\" not found in experiment table"
                        ))
                    })
            })
            .collect()
    }
}

/// Which schedule drives the nominal setpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum ThermostatSchedule {
    /// Time-of-day home/sleep rule.
    Default(DefaultSchedule),
    /// Rotating experiments, each held for `days_per_experiment` days.
    Experiment {
        experiments: Vec<Experiment>,
        days_per_experiment: u32,
    },
}

/// Mutable state owned by one [`Thermostat`].
///
/// Only the thermostat's transition methods change it; callers get a shared
/// reference through [`Thermostat::state`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatState {
    pub mode: ThermostatMode,
    pub schedule_label: String,
    /// Heating setpoint in the configured output unit.
    pub heating_setpoint: f64,
    /// Cooling setpoint in the configured output unit.
    pub cooling_setpoint: f64,
    pub last_manual_override: Option<NaiveDateTime>,
    pub precool: Option<ActiveWindow>,
    pub setback: Option<ActiveWindow>,
    pub experiment_index: usize,
    pub days_elapsed_in_experiment: u32,
    current_date: NaiveDate,
}

/// What the thermostat emits after each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatOutput {
    pub mode: ThermostatMode,
    pub schedule: String,
    pub cooling_setpoint: f64,
    pub heating_setpoint: f64,
}

/// Thermostat schedule state machine for one simulated building.
#[derive(Debug, Clone)]
pub struct Thermostat {
    schedule: ThermostatSchedule,
    units: TemperatureUnit,
    deadband: f64,
    state: Option<ThermostatState>,
}

impl Thermostat {
    /// Creates a thermostat; its state is computed on the first update.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] if the deadband is negative, an
    /// experiment schedule is empty, `days_per_experiment` is zero, or a
    /// precool/setback window is out of range.
    pub fn new(
        schedule: ThermostatSchedule,
        units: TemperatureUnit,
        deadband: f64,
    ) -> Result<Self, ControlError> {
        if !(deadband.is_finite() && deadband >= 0.0) {
            return Err(ControlError::InvalidInput(format!(
                "thermostat deadband must be a finite number >= 0, got {deadband}"
            )));
        }
        if let ThermostatSchedule::Experiment {
            experiments,
            days_per_experiment,
        } = &schedule
        {
            if experiments.is_empty() {
                return Err(ControlError::InvalidInput(
                    "experiment schedule needs at least one experiment".into(),
                ));
            }
            if *days_per_experiment == 0 {
                return Err(ControlError::InvalidInput(
                    "days per experiment must be > 0".into(),
                ));
            }
            for exp in experiments {
                if let Some(pc) = &exp.precool {
                    pc.validate("precool", &exp.name)?;
                }
                if let Some(sb) = &exp.setback {
                    sb.validate("setback", &exp.name)?;
                }
            }
        }
        Ok(Self {
            schedule,
            units,
            deadband,
            state: None,
        })
    }

    /// Thermostat following the default home/sleep schedule.
    pub fn with_default_schedule(units: TemperatureUnit, deadband: f64) -> Result<Self, ControlError> {
        Self::new(
            ThermostatSchedule::Default(DefaultSchedule::default()),
            units,
            deadband,
        )
    }

    /// Returns the current state, or `None` before the first update.
    pub fn state(&self) -> Option<&ThermostatState> {
        self.state.as_ref()
    }

    pub fn units(&self) -> TemperatureUnit {
        self.units
    }

    pub fn deadband(&self) -> f64 {
        self.deadband
    }

    /// Advances the state machine to `now` and returns the resulting setpoints.
    ///
    /// Rules are evaluated in a fixed order so a later rule can override an
    /// earlier one within the same tick: manual-override expiry, precool
    /// start, precool end, setback start, setback end. Day rollover (and
    /// experiment rotation) is applied before the rules.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidSetpointOrdering`] if the resulting
    /// setpoints violate `cooling - deadband >= heating`.
    pub fn update_output(&mut self, now: NaiveDateTime) -> Result<ThermostatOutput, ControlError> {
        self.ensure_initialized(now);
        self.roll_day(now);

        let experiment = self.current_experiment().cloned();
        let units = self.units;
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return Ok(self.output()),
        };

        // 1. End manual override
        if state.mode == ThermostatMode::Manual {
            if let Some(started) = state.last_manual_override {
                let elapsed = now.signed_duration_since(started).num_seconds() as f64;
                if elapsed >= MANUAL_OVERRIDE_TIMEOUT_HOURS * SECONDS_PER_HOUR {
                    info!("manual override from {started} expired at {now}");
                    state.mode = ThermostatMode::Auto;
                    state.last_manual_override = None;
                }
            }
        }

        let second_of_day = now.time().num_seconds_from_midnight();
        let opening = |window: Option<TimedOffset>| {
            window.filter(|w| second_of_day == w.start_second_of_day())
        };

        // 2. Start precool
        if let Some(exp) = &experiment {
            if let Some(pc) = opening(exp.precool) {
                info!("precool starts at {now} ({})", exp.name);
                state.mode = ThermostatMode::Precool;
                state.cooling_setpoint = units.from_fahrenheit(exp.setpoint_cool_f + pc.offset_f);
                state.precool = Some(pc.open(now));
                state.last_manual_override = None;
            }
        }

        // 3. End precool
        if let Some(window) = state.precool {
            if state.mode == ThermostatMode::Precool && window.has_elapsed(now) {
                info!("precool from {} ends at {now}", window.started);
                state.mode = ThermostatMode::Auto;
                state.precool = None;
            }
        }

        // 4. Start setback
        if let Some(exp) = &experiment {
            if let Some(sb) = opening(exp.setback) {
                info!("setback starts at {now} ({})", exp.name);
                state.mode = ThermostatMode::Setback;
                state.cooling_setpoint = units.from_fahrenheit(exp.setpoint_cool_f + sb.offset_f);
                state.setback = Some(sb.open(now));
                state.last_manual_override = None;
            }
        }

        // 5. End setback
        if let Some(window) = state.setback {
            if state.mode == ThermostatMode::Setback && window.has_elapsed(now) {
                info!("setback from {} ends at {now}", window.started);
                state.mode = ThermostatMode::Auto;
                state.setback = None;
            }
        }

        if state.mode == ThermostatMode::Auto {
            self.apply_nominal(now);
        }
        self.check_ordering()?;
        Ok(self.output())
    }

    /// Switches to manual mode with the given setpoints.
    ///
    /// Cancels any active precool or setback and starts the override timer
    /// that [`Thermostat::update_output`] later expires.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] for non-finite setpoints and
    /// [`ControlError::InvalidSetpointOrdering`] unless
    /// `cooling - deadband > heating`.
    pub fn manual_override(
        &mut self,
        heating_setpoint: f64,
        cooling_setpoint: f64,
        now: NaiveDateTime,
    ) -> Result<ThermostatOutput, ControlError> {
        if !(heating_setpoint.is_finite() && cooling_setpoint.is_finite()) {
            return Err(ControlError::InvalidInput(format!(
                "override setpoints must be finite, got heating={heating_setpoint} cooling={cooling_setpoint}"
            )));
        }
        if cooling_setpoint - self.deadband <= heating_setpoint {
            return Err(ControlError::InvalidSetpointOrdering {
                heating: heating_setpoint,
                cooling: cooling_setpoint,
                deadband: self.deadband,
            });
        }

        self.ensure_initialized(now);
        self.roll_day(now);
        let units = self.units;
        if let Some(state) = self.state.as_mut() {
            state.mode = ThermostatMode::Manual;
            state.heating_setpoint = heating_setpoint;
            state.cooling_setpoint = cooling_setpoint;
            state.precool = None;
            state.setback = None;
            state.last_manual_override = Some(now);
            info!(
                "manual override at {now}: heating={heating_setpoint}{u} cooling={cooling_setpoint}{u}",
                u = units.symbol()
            );
        }
        Ok(self.output())
    }

    fn ensure_initialized(&mut self, now: NaiveDateTime) {
        if self.state.is_some() {
            return;
        }
        let (label, heat, cool) = self.nominal_at(now, 0);
        self.state = Some(ThermostatState {
            mode: ThermostatMode::Auto,
            schedule_label: label,
            heating_setpoint: heat,
            cooling_setpoint: cool,
            last_manual_override: None,
            precool: None,
            setback: None,
            experiment_index: 0,
            days_elapsed_in_experiment: 0,
            current_date: now.date(),
        });
    }

    /// Counts elapsed days at midnight and rotates experiments.
    fn roll_day(&mut self, now: NaiveDateTime) {
        let rotation = match &self.schedule {
            ThermostatSchedule::Experiment {
                experiments,
                days_per_experiment,
            } => Some((experiments.len(), *days_per_experiment)),
            ThermostatSchedule::Default(_) => None,
        };
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let today = now.date();
        if today <= state.current_date {
            return;
        }
        let days = today.signed_duration_since(state.current_date).num_days();
        state.current_date = today;

        let Some((count, per_exp)) = rotation else {
            return;
        };
        state.days_elapsed_in_experiment = state
            .days_elapsed_in_experiment
            .saturating_add(u32::try_from(days).unwrap_or(u32::MAX));
        while state.days_elapsed_in_experiment >= per_exp {
            state.days_elapsed_in_experiment -= per_exp;
            state.experiment_index = (state.experiment_index + 1) % count;
            info!(
                "rotating to experiment #{} on {today}",
                state.experiment_index
            );
        }
    }

    fn current_experiment(&self) -> Option<&Experiment> {
        match &self.schedule {
            ThermostatSchedule::Experiment { experiments, .. } => {
                let index = self.state.as_ref().map_or(0, |s| s.experiment_index);
                experiments.get(index)
            }
            ThermostatSchedule::Default(_) => None,
        }
    }

    /// Nominal `(label, heating, cooling)` in output units.
    fn nominal_at(&self, now: NaiveDateTime, experiment_index: usize) -> (String, f64, f64) {
        let (label, heat_f, cool_f) = match &self.schedule {
            ThermostatSchedule::Default(rule) => {
                let (label, heat, cool) = rule.params_at(now.hour());
                (label.to_string(), heat, cool)
            }
            ThermostatSchedule::Experiment { experiments, .. } => {
                let exp = &experiments[experiment_index % experiments.len()];
                (exp.name.clone(), exp.setpoint_heat_f, exp.setpoint_cool_f)
            }
        };
        (
            label,
            self.units.from_fahrenheit(heat_f),
            self.units.from_fahrenheit(cool_f),
        )
    }

    fn apply_nominal(&mut self, now: NaiveDateTime) {
        let index = self.state.as_ref().map_or(0, |s| s.experiment_index);
        let (label, heat, cool) = self.nominal_at(now, index);
        if let Some(state) = self.state.as_mut() {
            state.schedule_label = label;
            state.heating_setpoint = heat;
            state.cooling_setpoint = cool;
        }
    }

    fn check_ordering(&self) -> Result<(), ControlError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        if state.cooling_setpoint - self.deadband < state.heating_setpoint {
            return Err(ControlError::InvalidSetpointOrdering {
                heating: state.heating_setpoint,
                cooling: state.cooling_setpoint,
                deadband: self.deadband,
            });
        }
        Ok(())
    }

    fn output(&self) -> ThermostatOutput {
        match &self.state {
            Some(s) => ThermostatOutput {
                mode: s.mode,
                schedule: s.schedule_label.clone(),
                cooling_setpoint: s.cooling_setpoint,
                heating_setpoint: s.heating_setpoint,
            },
            None => ThermostatOutput {
                mode: ThermostatMode::Auto,
                schedule: String::new(),
                cooling_setpoint: f64::NAN,
                heating_setpoint: f64::NAN,
            },
        }
    }
}
