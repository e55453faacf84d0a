//! Control dispatcher: one setpoint decision per timestep.
//!
//! [`ControlDispatcher::compute_control`] turns a [`ZoneState`] into a
//! [`SetpointCommand`] for the engine plus a [`ControlInformation`] record
//! explaining how the setpoints were chosen.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, warn};

use super::deadband::{HvacMode, SetpointRequest, apply_deadband};
use super::occupant::{AgentOutput, EnvironmentReading, OccupantModel};
use super::schedule_file::{ScheduleUpload, SetpointSchedule};
use super::thermostat::{Thermostat, ThermostatMode};
use crate::error::ControlError;
use crate::sim::engine::{InputMap, OutputSnapshot};
use crate::sim::keys;

/// Building readings the dispatcher decides on. Produced fresh every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    pub heating_setpoint_base: f64,
    pub cooling_setpoint_base: f64,
    pub outdoor_drybulb_temperature: f64,
    pub heating_runtime_fraction: f64,
    pub cooling_runtime_fraction: f64,
    pub zone_mean_temperature: Option<f64>,
    pub zone_relative_humidity: Option<f64>,
}

impl ZoneState {
    /// Extracts the controlled zone's state from an engine snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] if a building-level point is
    /// missing. Zone temperature and humidity are optional.
    pub fn from_snapshot(snapshot: &OutputSnapshot, zone: &str) -> Result<Self, ControlError> {
        let required = |key: &str| {
            snapshot.get(key).copied().ok_or_else(|| {
                ControlError::InvalidInput(format!("engine output \"{key}\" is missing"))
            })
        };
        Ok(Self {
            heating_setpoint_base: required(keys::HEATING_SETPOINT)?,
            cooling_setpoint_base: required(keys::COOLING_SETPOINT)?,
            outdoor_drybulb_temperature: required(keys::OUTDOOR_AIR_DRYBULB_TEMPERATURE)?,
            heating_runtime_fraction: required(keys::HEATING_COIL_RUNTIME_FRACTION)?,
            cooling_runtime_fraction: required(keys::COOLING_COIL_RUNTIME_FRACTION)?,
            zone_mean_temperature: snapshot.get(&keys::zone_air_temperature(zone)).copied(),
            zone_relative_humidity: snapshot.get(&keys::zone_humidity(zone)).copied(),
        })
    }

    fn environment_reading(&self, timestamp: NaiveDateTime) -> EnvironmentReading {
        EnvironmentReading {
            timestamp,
            indoor_temperature: self.zone_mean_temperature,
            cooling_setpoint: self.cooling_setpoint_base,
            heating_setpoint: self.heating_setpoint_base,
            relative_humidity: self.zone_relative_humidity,
            outdoor_temperature: self.outdoor_drybulb_temperature,
            motion: None,
            heating_equipment_on: self.heating_runtime_fraction != 0.0,
            cooling_equipment_on: self.cooling_runtime_fraction != 0.0,
        }
    }
}

/// The five control strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// No command; the engine keeps its last applied setpoints.
    Passthrough,
    /// Caller-supplied setpoints through the deadband controller.
    ManualSetpoints,
    /// Uploaded schedule rows through the deadband controller.
    Schedule,
    /// Occupant agents' setpoints sent as-is.
    OccupantModel,
    /// Thermostat schedule, overridden by occupant agents.
    ScheduleAndOccupantModel,
}

impl ControlMode {
    pub const ALL: [ControlMode; 5] = [
        Self::Passthrough,
        Self::ManualSetpoints,
        Self::Schedule,
        Self::OccupantModel,
        Self::ScheduleAndOccupantModel,
    ];

    /// Human-readable label, as shown in run logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Passthrough => "Pass through",
            Self::ManualSetpoints => "Manual setpoint",
            Self::Schedule => "Scheduled setpoint",
            Self::OccupantModel => "Occupant model",
            Self::ScheduleAndOccupantModel => "Schedule and occupant model",
        }
    }

    /// Snake-case name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::ManualSetpoints => "manual_setpoints",
            Self::Schedule => "schedule",
            Self::OccupantModel => "occupant_model",
            Self::ScheduleAndOccupantModel => "schedule_and_occupant_model",
        }
    }

    pub fn uses_occupant_model(self) -> bool {
        matches!(self, Self::OccupantModel | Self::ScheduleAndOccupantModel)
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ControlMode {
    type Err = ControlError;

    /// Accepts the label or the snake-case name, ignoring case and
    /// treating spaces, dashes and underscores alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalize = |v: &str| {
            v.trim()
                .to_ascii_lowercase()
                .replace([' ', '-'], "_")
        };
        let wanted = normalize(s);
        let aliases = |mode: ControlMode| -> &'static [&'static str] {
            match mode {
                ControlMode::Passthrough => &["pass_through"],
                ControlMode::ManualSetpoints => &["manual_setpoint", "setpoints", "manual"],
                ControlMode::Schedule => &["scheduled_setpoint", "scheduled_setpoints"],
                ControlMode::OccupantModel => &["occupant"],
                ControlMode::ScheduleAndOccupantModel => &[],
            }
        };
        Self::ALL
            .into_iter()
            .find(|&mode| {
                normalize(mode.name()) == wanted
                    || normalize(mode.label()) == wanted
                    || aliases(mode).contains(&wanted.as_str())
            })
            .ok_or_else(|| ControlError::UnsupportedControlMode(s.to_string()))
    }
}

/// Manually entered setpoints. A `None` side is left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualSetpoints {
    pub heating: Option<SetpointRequest>,
    pub cooling: Option<SetpointRequest>,
}

/// Setpoints to write to the engine. An empty command writes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointCommand {
    pub heating: Option<f64>,
    pub cooling: Option<f64>,
}

impl SetpointCommand {
    pub fn is_empty(&self) -> bool {
        self.heating.is_none() && self.cooling.is_none()
    }

    /// Engine input points for this command.
    pub fn to_inputs(&self) -> InputMap {
        let mut inputs = InputMap::new();
        if let Some(h) = self.heating {
            inputs.insert(keys::HEATING_SETPOINT.to_string(), h);
        }
        if let Some(c) = self.cooling {
            inputs.insert(keys::COOLING_SETPOINT.to_string(), c);
        }
        inputs
    }
}

/// Record of an occupant request whose cooling setpoint was raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointAnomaly {
    pub heating: f64,
    pub requested_cooling: f64,
    pub applied_cooling: f64,
}

/// Annotation of one decision: what was requested and why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlInformation {
    pub heating_setpoint_new: Option<f64>,
    pub heating_deadband_up: Option<f64>,
    pub heating_deadband_down: Option<f64>,
    pub cooling_setpoint_new: Option<f64>,
    pub cooling_deadband_up: Option<f64>,
    pub cooling_deadband_down: Option<f64>,
    pub thermostat_schedule: Option<String>,
    pub thermostat_mode: Option<ThermostatMode>,
    pub occupant_motion: bool,
    pub occupant_thermal_frustration: f64,
    pub occupant_comfort_delta: f64,
    pub occupant_habitual_override: bool,
    pub occupant_discomfort_override: bool,
    /// Set when [`CoolingInversionPolicy::RaiseCooling`] altered a request.
    pub anomaly: Option<SetpointAnomaly>,
}

impl ControlInformation {
    fn record_heating(&mut self, request: &SetpointRequest) {
        self.heating_setpoint_new = Some(request.new_value);
        self.heating_deadband_up = Some(request.deadband_up);
        self.heating_deadband_down = Some(request.deadband_down);
    }

    fn record_cooling(&mut self, request: &SetpointRequest) {
        self.cooling_setpoint_new = Some(request.new_value);
        self.cooling_deadband_up = Some(request.deadband_up);
        self.cooling_deadband_down = Some(request.deadband_down);
    }

    fn record_agent(&mut self, agent: &AgentOutput) {
        self.occupant_motion = agent.motion;
        self.occupant_thermal_frustration = agent.thermal_frustration;
        self.occupant_comfort_delta = agent.comfort_delta;
        self.occupant_habitual_override = agent.habitual_override;
        self.occupant_discomfort_override = agent.discomfort_override;
    }
}

/// What to do when an occupant asks for a cooling setpoint that does not
/// clear heating plus the thermostat deadband.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoolingInversionPolicy {
    /// Fail the session with [`ControlError::InvalidSetpointOrdering`].
    Reject,
    /// Set cooling to `heating + deadband + margin`, log a warning and
    /// record a [`SetpointAnomaly`]. `margin` must be positive, otherwise the
    /// raised cooling setpoint would still fail the thermostat's ordering
    /// check; build it with [`CoolingInversionPolicy::raise_cooling`].
    RaiseCooling { margin: f64 },
}

impl Default for CoolingInversionPolicy {
    fn default() -> Self {
        Self::RaiseCooling { margin: 2.0 }
    }
}

impl CoolingInversionPolicy {
    /// Recovery policy with the given margin.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] unless `margin` is a finite
    /// number > 0.
    pub fn raise_cooling(margin: f64) -> Result<Self, ControlError> {
        if !(margin.is_finite() && margin > 0.0) {
            return Err(ControlError::InvalidInput(format!(
                "cooling inversion margin must be a finite number > 0, got {margin}"
            )));
        }
        Ok(Self::RaiseCooling { margin })
    }

    /// Returns the cooling setpoint to use and the anomaly, if one was recovered.
    fn resolve(
        self,
        heating: f64,
        cooling: f64,
        deadband: f64,
    ) -> Result<(f64, Option<SetpointAnomaly>), ControlError> {
        if cooling - deadband > heating {
            return Ok((cooling, None));
        }
        match self {
            Self::Reject => Err(ControlError::InvalidSetpointOrdering {
                heating,
                cooling,
                deadband,
            }),
            Self::RaiseCooling { margin } => {
                Self::raise_cooling(margin)?;
                let applied = heating + deadband + margin;
                warn!(
                    "occupant requested cooling {cooling} with heating {heating}; raising cooling to {applied}"
                );
                Ok((
                    applied,
                    Some(SetpointAnomaly {
                        heating,
                        requested_cooling: cooling,
                        applied_cooling: applied,
                    }),
                ))
            }
        }
    }
}

/// Per-session decision maker.
///
/// Owns the session's thermostat and occupant model; neither is shared with
/// other sessions.
pub struct ControlDispatcher<O: OccupantModel> {
    thermostat: Thermostat,
    occupant: O,
    inversion_policy: CoolingInversionPolicy,
    parsed_schedule: Option<(Vec<u8>, SetpointSchedule)>,
}

impl<O: OccupantModel> ControlDispatcher<O> {
    pub fn new(thermostat: Thermostat, occupant: O, inversion_policy: CoolingInversionPolicy) -> Self {
        Self {
            thermostat,
            occupant,
            inversion_policy,
            parsed_schedule: None,
        }
    }

    pub fn thermostat(&self) -> &Thermostat {
        &self.thermostat
    }

    pub fn occupant(&self) -> &O {
        &self.occupant
    }

    /// Decides the setpoints for one tick.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - Simulated time of the decision
    /// * `mode` - Active control strategy
    /// * `manual` - Setpoints used by [`ControlMode::ManualSetpoints`]
    /// * `schedule` - Upload used by [`ControlMode::Schedule`]
    /// * `zone` - Current building readings
    ///
    /// # Errors
    ///
    /// * [`ControlError::InvalidInput`] - zone temperature missing where the
    ///   deadband controller needs it
    /// * [`ControlError::ScheduleParse`] - schedule missing or unreadable
    /// * [`ControlError::InvalidSetpointOrdering`] - thermostat or occupant
    ///   setpoints out of order (fatal)
    ///
    /// On error nothing has been written to the engine.
    pub fn compute_control(
        &mut self,
        timestamp: NaiveDateTime,
        mode: ControlMode,
        manual: &ManualSetpoints,
        schedule: Option<&ScheduleUpload>,
        zone: &ZoneState,
    ) -> Result<(SetpointCommand, ControlInformation), ControlError> {
        let mut info = ControlInformation::default();
        let mut command = SetpointCommand::default();

        match mode {
            ControlMode::Passthrough => {}

            ControlMode::ManualSetpoints => {
                if let Some(req) = &manual.heating {
                    info.record_heating(req);
                }
                if let Some(req) = &manual.cooling {
                    info.record_cooling(req);
                }
                command = deadband_command(zone, manual.heating.as_ref(), manual.cooling.as_ref())?;
            }

            ControlMode::Schedule => {
                let upload = schedule.ok_or_else(|| {
                    ControlError::ScheduleParse("no schedule uploaded".into())
                })?;
                let parsed = self.schedule_for(upload)?;
                if let Some(row) = parsed.lookup(timestamp) {
                    if let Some(req) = &row.heating {
                        info.record_heating(req);
                    }
                    if let Some(req) = &row.cooling {
                        info.record_cooling(req);
                    }
                    command = deadband_command(zone, row.heating.as_ref(), row.cooling.as_ref())?;
                }
            }

            ControlMode::OccupantModel => {
                let agents = self.occupant.step(&zone.environment_reading(timestamp));
                // later agents overwrite earlier ones
                for agent in &agents {
                    command.heating = Some(agent.heating_setpoint);
                    command.cooling = Some(agent.cooling_setpoint);
                    info.heating_setpoint_new = Some(agent.heating_setpoint);
                    info.cooling_setpoint_new = Some(agent.cooling_setpoint);
                    info.record_agent(agent);
                }
            }

            ControlMode::ScheduleAndOccupantModel => {
                let agents = self.occupant.step(&zone.environment_reading(timestamp));
                if let Some(last) = agents.last() {
                    info.record_agent(last);
                }
                let overriding = agents
                    .iter()
                    .rev()
                    .find(|a| a.habitual_override || a.discomfort_override);

                let output = match overriding {
                    Some(agent) => {
                        let (cooling, anomaly) = self.inversion_policy.resolve(
                            agent.heating_setpoint,
                            agent.cooling_setpoint,
                            self.thermostat.deadband(),
                        )?;
                        info.anomaly = anomaly;
                        self.thermostat
                            .manual_override(agent.heating_setpoint, cooling, timestamp)?
                    }
                    None => self.thermostat.update_output(timestamp)?,
                };

                command.heating = Some(output.heating_setpoint);
                command.cooling = Some(output.cooling_setpoint);
                info.heating_setpoint_new = Some(output.heating_setpoint);
                info.cooling_setpoint_new = Some(output.cooling_setpoint);
                info.thermostat_schedule = Some(output.schedule);
                info.thermostat_mode = Some(output.mode);
            }
        }

        debug!(
            "[{timestamp}] {mode}: zone={:?} rh={:?} -> heating={:?} cooling={:?}",
            zone.zone_mean_temperature, zone.zone_relative_humidity, command.heating, command.cooling
        );
        Ok((command, info))
    }

    /// Parses `upload`, reusing the previous parse when the bytes are unchanged.
    fn schedule_for(&mut self, upload: &ScheduleUpload) -> Result<&SetpointSchedule, ControlError> {
        let stale = match &self.parsed_schedule {
            Some((bytes, _)) => *bytes != upload.contents,
            None => true,
        };
        if stale {
            let parsed = SetpointSchedule::parse(upload)?;
            self.parsed_schedule = Some((upload.contents.clone(), parsed));
        }
        match &self.parsed_schedule {
            Some((_, parsed)) => Ok(parsed),
            None => Err(ControlError::ScheduleParse("schedule cache is empty".into())),
        }
    }
}

/// Runs the deadband controller for each requested side.
fn deadband_command(
    zone: &ZoneState,
    heating: Option<&SetpointRequest>,
    cooling: Option<&SetpointRequest>,
) -> Result<SetpointCommand, ControlError> {
    let heating = heating
        .map(|req| {
            apply_deadband(
                HvacMode::Heating,
                zone.zone_mean_temperature,
                zone.heating_setpoint_base,
                req,
            )
        })
        .transpose()?;
    let cooling = cooling
        .map(|req| {
            apply_deadband(
                HvacMode::Cooling,
                zone.zone_mean_temperature,
                zone.cooling_setpoint_base,
                req,
            )
        })
        .transpose()?;
    Ok(SetpointCommand { heating, cooling })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::thermostat::TemperatureUnit;
    use chrono::NaiveDate;

    /// Occupant model returning a fixed script of agent outputs.
    struct Scripted(Vec<AgentOutput>);

    impl OccupantModel for Scripted {
        fn step(&mut self, _reading: &EnvironmentReading) -> Vec<AgentOutput> {
            self.0.clone()
        }
    }

    fn agent(heating: f64, cooling: f64, discomfort: bool) -> AgentOutput {
        AgentOutput {
            heating_setpoint: heating,
            cooling_setpoint: cooling,
            motion: true,
            thermal_frustration: 12.5,
            comfort_delta: 1.5,
            habitual_override: false,
            discomfort_override: discomfort,
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 7, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid timestamp")
    }

    fn zone(temp: Option<f64>) -> ZoneState {
        ZoneState {
            heating_setpoint_base: 20.0,
            cooling_setpoint_base: 25.0,
            outdoor_drybulb_temperature: 30.0,
            heating_runtime_fraction: 0.0,
            cooling_runtime_fraction: 0.4,
            zone_mean_temperature: temp,
            zone_relative_humidity: Some(45.0),
        }
    }

    fn dispatcher(agents: Vec<AgentOutput>, policy: CoolingInversionPolicy) -> ControlDispatcher<Scripted> {
        let thermostat = Thermostat::with_default_schedule(TemperatureUnit::Celsius, 0.0)
            .expect("valid thermostat");
        ControlDispatcher::new(thermostat, Scripted(agents), policy)
    }

    fn run(
        d: &mut ControlDispatcher<Scripted>,
        mode: ControlMode,
        manual: &ManualSetpoints,
        schedule: Option<&ScheduleUpload>,
        z: &ZoneState,
    ) -> Result<(SetpointCommand, ControlInformation), ControlError> {
        d.compute_control(at(12, 0), mode, manual, schedule, z)
    }

    #[test]
    fn passthrough_emits_nothing() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let (cmd, info) = run(
            &mut d,
            ControlMode::Passthrough,
            &ManualSetpoints::default(),
            None,
            &zone(Some(22.0)),
        )
        .expect("decision");
        assert!(cmd.is_empty());
        assert!(cmd.to_inputs().is_empty());
        assert_eq!(info, ControlInformation::default());
    }

    #[test]
    fn manual_setpoints_go_through_deadband() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let manual = ManualSetpoints {
            heating: Some(SetpointRequest::new(21.0, 1.0, 1.0)),
            cooling: None,
        };
        let (cmd, info) = run(
            &mut d,
            ControlMode::ManualSetpoints,
            &manual,
            None,
            &zone(Some(19.5)),
        )
        .expect("decision");
        assert_eq!(cmd.heating, Some(22.0));
        assert_eq!(cmd.cooling, None);
        assert_eq!(info.heating_setpoint_new, Some(21.0));
        assert_eq!(info.heating_deadband_up, Some(1.0));
        assert_eq!(info.cooling_setpoint_new, None);
        let inputs = cmd.to_inputs();
        assert_eq!(inputs.get(keys::HEATING_SETPOINT), Some(&22.0));
        assert!(!inputs.contains_key(keys::COOLING_SETPOINT));
    }

    #[test]
    fn manual_without_zone_temperature_fails() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let manual = ManualSetpoints {
            heating: Some(SetpointRequest::new(21.0, 1.0, 1.0)),
            cooling: None,
        };
        let err = run(&mut d, ControlMode::ManualSetpoints, &manual, None, &zone(None));
        assert!(matches!(err, Err(ControlError::InvalidInput(_))));
    }

    #[test]
    fn schedule_mode_uses_matching_row() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let upload = ScheduleUpload::csv(
            "datetime,Heating Setpoint (New),Heating Deadband Up,Heating Deadband Down,Cooling Setpoint (New),Cooling Deadband Up,Cooling Deadband Down\n\
             7/1  12:00:00,21,1,1,24,1,1\n",
        );
        let (cmd, info) = run(
            &mut d,
            ControlMode::Schedule,
            &ManualSetpoints::default(),
            Some(&upload),
            &zone(Some(25.5)),
        )
        .expect("decision");
        // hot zone: heating coasts, cooling engages
        assert_eq!(cmd.heating, Some(20.0));
        assert_eq!(cmd.cooling, Some(23.0));
        assert_eq!(info.cooling_setpoint_new, Some(24.0));

        let (cmd, _) = d
            .compute_control(
                at(12, 15),
                ControlMode::Schedule,
                &ManualSetpoints::default(),
                Some(&upload),
                &zone(Some(25.5)),
            )
            .expect("decision");
        assert!(cmd.is_empty());
    }

    #[test]
    fn schedule_mode_without_upload_is_parse_error() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let err = run(
            &mut d,
            ControlMode::Schedule,
            &ManualSetpoints::default(),
            None,
            &zone(Some(22.0)),
        );
        assert!(matches!(err, Err(ControlError::ScheduleParse(_))));
    }

    #[test]
    fn occupant_mode_bypasses_deadband_and_last_agent_wins() {
        let mut d = dispatcher(
            vec![agent(19.0, 27.0, false), agent(20.5, 24.5, false)],
            CoolingInversionPolicy::default(),
        );
        let (cmd, info) = run(
            &mut d,
            ControlMode::OccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(None),
        )
        .expect("decision");
        assert_eq!(cmd.heating, Some(20.5));
        assert_eq!(cmd.cooling, Some(24.5));
        assert_eq!(info.heating_setpoint_new, Some(20.5));
    }

    #[test]
    fn combined_mode_follows_thermostat_without_override() {
        let mut d = dispatcher(vec![agent(19.0, 27.0, false)], CoolingInversionPolicy::default());
        let (cmd, info) = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .expect("decision");
        assert_eq!(cmd.heating, Some(21.0));
        assert_eq!(cmd.cooling, Some(26.0));
        assert_eq!(info.thermostat_mode, Some(ThermostatMode::Auto));
        assert_eq!(info.thermostat_schedule.as_deref(), Some("home"));
        assert_eq!(info.occupant_thermal_frustration, 12.5);
        assert!(info.occupant_motion);
    }

    #[test]
    fn combined_mode_with_no_agents_still_updates_thermostat() {
        let mut d = dispatcher(vec![], CoolingInversionPolicy::default());
        let (cmd, info) = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .expect("decision");
        assert_eq!(cmd.heating, Some(21.0));
        assert!(!info.occupant_motion);
        assert_eq!(info.occupant_thermal_frustration, 0.0);
    }

    #[test]
    fn combined_mode_override_goes_manual() {
        let mut d = dispatcher(vec![agent(22.0, 24.0, true)], CoolingInversionPolicy::default());
        let (cmd, info) = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .expect("decision");
        assert_eq!(cmd.heating, Some(22.0));
        assert_eq!(cmd.cooling, Some(24.0));
        assert_eq!(info.thermostat_mode, Some(ThermostatMode::Manual));
        assert!(info.occupant_discomfort_override);
        assert!(info.anomaly.is_none());
    }

    #[test]
    fn inverted_occupant_request_is_raised_and_reported() {
        let mut d = dispatcher(vec![agent(23.0, 22.0, true)], CoolingInversionPolicy::default());
        let (cmd, info) = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .expect("decision");
        assert_eq!(cmd.cooling, Some(25.0));
        assert_eq!(
            info.anomaly,
            Some(SetpointAnomaly {
                heating: 23.0,
                requested_cooling: 22.0,
                applied_cooling: 25.0,
            })
        );
    }

    #[test]
    fn inverted_occupant_request_is_fatal_under_reject() {
        let mut d = dispatcher(vec![agent(23.0, 22.0, true)], CoolingInversionPolicy::Reject);
        let err = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        );
        assert!(err.is_err_and(|e| e.is_fatal()));
    }

    #[test]
    fn raise_cooling_needs_positive_margin() {
        assert_eq!(
            CoolingInversionPolicy::raise_cooling(0.5),
            Ok(CoolingInversionPolicy::RaiseCooling { margin: 0.5 })
        );
        for margin in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                CoolingInversionPolicy::raise_cooling(margin),
                Err(ControlError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn zero_margin_inversion_never_ends_the_session() {
        let policy = CoolingInversionPolicy::RaiseCooling { margin: 0.0 };
        let mut d = dispatcher(vec![agent(23.0, 22.0, true)], policy);
        let err = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::InvalidInput(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn small_margin_inversion_is_accepted_by_thermostat() {
        let policy = CoolingInversionPolicy::raise_cooling(0.1).expect("policy");
        let mut d = dispatcher(vec![agent(23.0, 22.0, true)], policy);
        let (cmd, info) = run(
            &mut d,
            ControlMode::ScheduleAndOccupantModel,
            &ManualSetpoints::default(),
            None,
            &zone(Some(23.0)),
        )
        .expect("decision");
        assert_eq!(cmd.cooling, Some(23.1));
        assert_eq!(info.thermostat_mode, Some(ThermostatMode::Manual));
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("Pass through".parse::<ControlMode>(), Ok(ControlMode::Passthrough));
        assert_eq!("manual_setpoints".parse::<ControlMode>(), Ok(ControlMode::ManualSetpoints));
        assert_eq!("Scheduled setpoint".parse::<ControlMode>(), Ok(ControlMode::Schedule));
        assert_eq!("occupant-model".parse::<ControlMode>(), Ok(ControlMode::OccupantModel));
        assert_eq!(
            "Schedule and occupant model".parse::<ControlMode>(),
            Ok(ControlMode::ScheduleAndOccupantModel)
        );
        assert_eq!(
            "model predictive".parse::<ControlMode>(),
            Err(ControlError::UnsupportedControlMode("model predictive".into()))
        );
    }

    #[test]
    fn zone_state_requires_building_points() {
        let mut snapshot = OutputSnapshot::new();
        snapshot.insert(keys::HEATING_SETPOINT.into(), 20.0);
        assert!(ZoneState::from_snapshot(&snapshot, "LIVING ZONE").is_err());

        snapshot.insert(keys::COOLING_SETPOINT.into(), 25.0);
        snapshot.insert(keys::OUTDOOR_AIR_DRYBULB_TEMPERATURE.into(), 30.0);
        snapshot.insert(keys::HEATING_COIL_RUNTIME_FRACTION.into(), 0.0);
        snapshot.insert(keys::COOLING_COIL_RUNTIME_FRACTION.into(), 0.5);
        snapshot.insert(keys::zone_air_temperature("LIVING ZONE"), 23.5);
        let z = ZoneState::from_snapshot(&snapshot, "LIVING ZONE").expect("zone state");
        assert_eq!(z.zone_mean_temperature, Some(23.5));
        assert_eq!(z.zone_relative_humidity, None);
        let reading = z.environment_reading(at(12, 0));
        assert!(reading.cooling_equipment_on);
        assert!(!reading.heating_equipment_on);
    }
}
