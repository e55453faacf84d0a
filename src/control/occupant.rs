//! Occupant behavior model boundary and a built-in thermal-frustration model.

use chrono::NaiveDateTime;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::ControlError;

/// Environment handed to the occupant model once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentReading {
    pub timestamp: NaiveDateTime,
    pub indoor_temperature: Option<f64>,
    pub cooling_setpoint: f64,
    pub heating_setpoint: f64,
    pub relative_humidity: Option<f64>,
    pub outdoor_temperature: f64,
    /// Observed motion, if a sensor provides it.
    pub motion: Option<bool>,
    pub heating_equipment_on: bool,
    pub cooling_equipment_on: bool,
}

/// One agent's result for a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentOutput {
    pub heating_setpoint: f64,
    pub cooling_setpoint: f64,
    pub motion: bool,
    pub thermal_frustration: f64,
    pub comfort_delta: f64,
    pub habitual_override: bool,
    pub discomfort_override: bool,
}

/// A stateful occupant model stepped at most once per tick.
///
/// Implementations are owned by a single session and never shared.
pub trait OccupantModel {
    /// Advances every agent by one tick and returns their results in agent order.
    fn step(&mut self, reading: &EnvironmentReading) -> Vec<AgentOutput>;
}

/// Parameters of [`FrustrationOccupant`].
#[derive(Debug, Clone, PartialEq)]
pub struct OccupantSettings {
    pub num_occupants: usize,
    /// Preferred indoor temperature, in the thermostat's output unit.
    pub comfort_temperature: f64,
    /// Decay applied to the previous frustration value.
    pub tft_alpha: f64,
    /// Weight of the current comfort delta.
    pub tft_beta: f64,
    /// Frustration at or above which the occupant lowers cooling.
    pub threshold_upper: f64,
    /// Frustration at or below which the occupant raises heating.
    pub threshold_lower: f64,
    /// Per-tick chance of re-asserting the preferred band out of habit.
    pub habitual_override_probability: f64,
    /// Per-tick chance of reporting motion when no sensor reading exists.
    pub motion_probability: f64,
    /// Half-width of the preferred band around `comfort_temperature`.
    pub preferred_band: f64,
}

impl Default for OccupantSettings {
    fn default() -> Self {
        Self {
            num_occupants: 1,
            comfort_temperature: 24.0,
            tft_alpha: 0.9,
            tft_beta: 1.0,
            threshold_upper: 50.0,
            threshold_lower: -50.0,
            habitual_override_probability: 0.01,
            motion_probability: 0.8,
            preferred_band: 2.0,
        }
    }
}

/// Thermal-frustration occupant model.
///
/// Each agent integrates its discomfort as
/// `frustration = alpha * frustration + beta * (T_in - comfort)`. Crossing the
/// upper threshold lowers the desired cooling setpoint by one degree, crossing
/// the lower threshold raises the desired heating setpoint by one degree; both
/// count as a discomfort override and reset the agent's frustration.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use hvac_cosim::control::occupant::{
///     EnvironmentReading, FrustrationOccupant, OccupantModel, OccupantSettings,
/// };
///
/// let mut model = FrustrationOccupant::new(OccupantSettings::default(), 7).unwrap();
/// let reading = EnvironmentReading {
///     timestamp: NaiveDate::from_ymd_opt(2019, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
///     indoor_temperature: Some(24.0),
///     cooling_setpoint: 26.0,
///     heating_setpoint: 21.0,
///     relative_humidity: Some(45.0),
///     outdoor_temperature: 30.0,
///     motion: None,
///     heating_equipment_on: false,
///     cooling_equipment_on: true,
/// };
/// let agents = model.step(&reading);
/// assert_eq!(agents.len(), 1);
/// assert_eq!(agents[0].comfort_delta, 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct FrustrationOccupant {
    settings: OccupantSettings,
    frustration: Vec<f64>,
    rng: StdRng,
}

impl FrustrationOccupant {
    /// Creates the model with every agent at zero frustration.
    ///
    /// # Arguments
    ///
    /// * `settings` - Model parameters
    /// * `seed` - Seed for habitual-override and motion draws
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] if a probability lies outside
    /// `[0, 1]` or the thresholds are not ordered `lower < upper`.
    pub fn new(settings: OccupantSettings, seed: u64) -> Result<Self, ControlError> {
        for (name, p) in [
            ("habitual override probability", settings.habitual_override_probability),
            ("motion probability", settings.motion_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ControlError::InvalidInput(format!(
                    "{name} must be in [0, 1], got {p}"
                )));
            }
        }
        if !(settings.threshold_lower < settings.threshold_upper) {
            return Err(ControlError::InvalidInput(format!(
                "frustration thresholds must satisfy lower < upper, got {} and {}",
                settings.threshold_lower, settings.threshold_upper
            )));
        }
        Ok(Self {
            frustration: vec![0.0; settings.num_occupants],
            settings,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn settings(&self) -> &OccupantSettings {
        &self.settings
    }

    /// Current frustration per agent.
    pub fn frustration(&self) -> &[f64] {
        &self.frustration
    }
}

impl OccupantModel for FrustrationOccupant {
    fn step(&mut self, reading: &EnvironmentReading) -> Vec<AgentOutput> {
        let s = &self.settings;
        let mut outputs = Vec::with_capacity(self.frustration.len());

        for frustration in &mut self.frustration {
            let comfort_delta = reading
                .indoor_temperature
                .map_or(0.0, |t| t - s.comfort_temperature);
            *frustration = s.tft_alpha * *frustration + s.tft_beta * comfort_delta;

            let mut heating = reading.heating_setpoint;
            let mut cooling = reading.cooling_setpoint;
            let mut discomfort_override = false;
            if *frustration >= s.threshold_upper {
                cooling -= 1.0;
                discomfort_override = true;
            } else if *frustration <= s.threshold_lower {
                heating += 1.0;
                discomfort_override = true;
            }
            let reported_frustration = *frustration;
            if discomfort_override {
                *frustration = 0.0;
            }

            let habitual_override =
                !discomfort_override && self.rng.random_bool(s.habitual_override_probability);
            if habitual_override {
                heating = s.comfort_temperature - s.preferred_band;
                cooling = s.comfort_temperature + s.preferred_band;
            }

            let motion = match reading.motion {
                Some(observed) => observed,
                None => self.rng.random_bool(s.motion_probability),
            };

            outputs.push(AgentOutput {
                heating_setpoint: heating,
                cooling_setpoint: cooling,
                motion,
                thermal_frustration: reported_frustration,
                comfort_delta,
                habitual_override,
                discomfort_override,
            });
        }
        outputs
    }
}
