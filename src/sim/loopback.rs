//! In-process stand-in for the simulation engine.
//!
//! [`LoopbackEngine`] speaks the [`SimulationEngine`] protocol without an
//! external service: each site is a single-node zone that drifts toward a
//! sinusoidal outdoor temperature and is pushed back by idealized heating and
//! cooling coils. It exists so the step loop can run end to end in the CLI
//! demo and in tests; it is not a building model.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::engine::{
    EngineError, InputMap, OutputSnapshot, SimulationEngine, SiteId, StartOptions,
};
use super::keys;

/// Tunables of the loopback plant.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackSettings {
    /// Simulated minutes per `advance` call.
    pub time_step_minutes: u32,
    pub conditioned_zones: Vec<String>,
    pub unconditioned_zones: Vec<String>,
    /// Daily mean outdoor dry-bulb (°C).
    pub outdoor_mean: f64,
    /// Half the daily outdoor swing (°C).
    pub outdoor_amplitude: f64,
    /// Standard deviation of outdoor noise (°C).
    pub noise_std: f64,
    pub initial_zone_temperature: f64,
    pub initial_heating_setpoint: f64,
    pub initial_cooling_setpoint: f64,
    pub seed: u64,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            time_step_minutes: 1,
            conditioned_zones: vec!["LIVING ZONE".to_string()],
            unconditioned_zones: Vec::new(),
            outdoor_mean: 24.0,
            outdoor_amplitude: 8.0,
            noise_std: 0.2,
            initial_zone_temperature: 22.0,
            initial_heating_setpoint: 20.0,
            initial_cooling_setpoint: 25.0,
            seed: 42,
        }
    }
}

// zone coupling to outdoor air, 1/h
const CONDITIONED_COUPLING: f64 = 0.3;
const UNCONDITIONED_COUPLING: f64 = 0.8;
// coil authority at full runtime, °C/h
const COIL_RATE: f64 = 4.0;
const HEATING_POWER_W: f64 = 5_000.0;
const COOLING_POWER_W: f64 = 3_500.0;
const FAN_POWER_W: f64 = 300.0;
const FAN_MASS_FLOW: f64 = 0.5;
const AIR_DENSITY: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteStatus {
    Submitted,
    Running,
    Stopped,
}

impl SiteStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
struct Site {
    status: SiteStatus,
    time: NaiveDateTime,
    heating_setpoint: f64,
    cooling_setpoint: f64,
    conditioned: Vec<f64>,
    unconditioned: Vec<f64>,
    outputs: OutputSnapshot,
}

/// Deterministic in-process engine.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use chrono::NaiveDate;
/// use hvac_cosim::sim::engine::{SimulationEngine, StartOptions};
/// use hvac_cosim::sim::loopback::{LoopbackEngine, LoopbackSettings};
///
/// let mut engine = LoopbackEngine::new(LoopbackSettings::default());
/// let site = engine.submit(Path::new("house.zip")).unwrap();
/// let t0 = NaiveDate::from_ymd_opt(2019, 7, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// engine
///     .start(&site, &StartOptions {
///         time_start: t0,
///         time_end: t0 + chrono::TimeDelta::days(1),
///         time_scale: 5,
///         external_clock: true,
///         realtime: false,
///         wait: true,
///     })
///     .unwrap();
/// engine.advance(&[site.clone()]).unwrap();
/// assert_eq!(engine.get_sim_time(&site).unwrap(), t0 + chrono::TimeDelta::minutes(1));
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackEngine {
    settings: LoopbackSettings,
    sites: BTreeMap<SiteId, Site>,
    next_id: usize,
    rng: StdRng,
}

impl LoopbackEngine {
    /// Creates an engine with no sites.
    pub fn new(settings: LoopbackSettings) -> Self {
        let rng = StdRng::seed_from_u64(settings.seed);
        Self {
            settings,
            sites: BTreeMap::new(),
            next_id: 0,
            rng,
        }
    }

    fn site(&self, id: &SiteId) -> Result<&Site, EngineError> {
        self.sites
            .get(id)
            .ok_or_else(|| EngineError::UnknownSite(id.clone()))
    }

    fn running_site_mut(&mut self, id: &SiteId) -> Result<&mut Site, EngineError> {
        let site = self
            .sites
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownSite(id.clone()))?;
        if site.status != SiteStatus::Running {
            return Err(EngineError::NotReady {
                site: id.clone(),
                status: site.status.as_str().to_string(),
            });
        }
        Ok(site)
    }

    fn gaussian(&mut self) -> f64 {
        if self.settings.noise_std <= 0.0 {
            return 0.0;
        }
        let u1: f64 = self.rng.random::<f64>().clamp(1e-12, 1.0);
        let u2: f64 = self.rng.random::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * self.settings.noise_std
    }

    fn outdoor_at(&mut self, time: NaiveDateTime) -> f64 {
        let hour = f64::from(time.num_seconds_from_midnight()) / 3600.0;
        // warmest at 15:00
        let angle = 2.0 * PI * (hour - 9.0) / 24.0;
        self.settings.outdoor_mean + self.settings.outdoor_amplitude * angle.sin() + self.gaussian()
    }

    /// Integrates one step and refreshes the site's output snapshot.
    fn integrate(&mut self, id: &SiteId, dt_hours: f64) -> Result<(), EngineError> {
        let time = self.site(id)?.time;
        let outdoor = self.outdoor_at(time);
        let zones = self.settings.conditioned_zones.clone();
        let attics = self.settings.unconditioned_zones.clone();
        let site = self.running_site_mut(id)?;

        let (heat_sp, cool_sp) = (site.heating_setpoint, site.cooling_setpoint);
        let mut heat_rt = 0.0;
        let mut cool_rt = 0.0;
        for (i, temp) in site.conditioned.iter_mut().enumerate() {
            *temp += CONDITIONED_COUPLING * dt_hours * (outdoor - *temp);
            let h = (heat_sp - *temp).clamp(0.0, 1.0);
            let c = (*temp - cool_sp).clamp(0.0, 1.0);
            *temp += (h - c) * COIL_RATE * dt_hours;
            // first zone carries the thermostat
            if i == 0 {
                heat_rt = h;
                cool_rt = c;
            }
        }
        for temp in &mut site.unconditioned {
            *temp += UNCONDITIONED_COUPLING * dt_hours * (outdoor - *temp);
        }

        let fan_rt = heat_rt.max(cool_rt);
        let dt_s = dt_hours * 3600.0;
        let supply = site.conditioned.first().copied().unwrap_or(outdoor);

        let out = &mut site.outputs;
        out.clear();
        out.insert(keys::HEATING_SETPOINT.into(), heat_sp);
        out.insert(keys::COOLING_SETPOINT.into(), cool_sp);
        out.insert(keys::OUTDOOR_AIR_DRYBULB_TEMPERATURE.into(), outdoor);
        out.insert(keys::HEATING_COIL_RUNTIME_FRACTION.into(), heat_rt);
        out.insert(keys::COOLING_COIL_RUNTIME_FRACTION.into(), cool_rt);
        out.insert(keys::SUPPLY_FAN_AIR_MASS_FLOW_RATE.into(), fan_rt * FAN_MASS_FLOW);
        out.insert(
            keys::SYSTEM_NODE_TEMPERATURE.into(),
            supply + 15.0 * heat_rt - 10.0 * cool_rt,
        );
        out.insert(
            keys::SYSTEM_NODE_VOLUME_FLOW_RATE.into(),
            fan_rt * FAN_MASS_FLOW / AIR_DENSITY,
        );
        out.insert(keys::ENERGY_METERS[0].into(), cool_rt * COOLING_POWER_W * dt_s);
        out.insert(keys::ENERGY_METERS[1].into(), fan_rt * FAN_POWER_W * dt_s);
        out.insert(keys::ENERGY_METERS[2].into(), 0.0);
        out.insert(keys::ENERGY_METERS[3].into(), heat_rt * HEATING_POWER_W * dt_s);
        for (zone, temp) in zones.iter().zip(&site.conditioned) {
            out.insert(keys::zone_air_temperature(zone), *temp);
            out.insert(keys::zone_humidity(zone), humidity_at(*temp));
            let active = if *temp < (heat_sp + cool_sp) / 2.0 {
                heat_sp
            } else {
                cool_sp
            };
            out.insert(keys::zone_temperature_setpoint(zone), active);
        }
        for (zone, temp) in attics.iter().zip(&site.unconditioned) {
            out.insert(keys::zone_air_temperature(zone), *temp);
            out.insert(keys::zone_humidity(zone), humidity_at(*temp));
        }
        Ok(())
    }
}

/// Relative humidity falling as the air warms.
fn humidity_at(temp: f64) -> f64 {
    (60.0 - 1.5 * (temp - 20.0)).clamp(20.0, 90.0)
}

impl SimulationEngine for LoopbackEngine {
    fn submit(&mut self, archive: &Path) -> Result<SiteId, EngineError> {
        let id = SiteId(format!("loopback-{}", self.next_id));
        self.next_id += 1;
        let s = &self.settings;
        self.sites.insert(
            id.clone(),
            Site {
                status: SiteStatus::Submitted,
                time: NaiveDateTime::default(),
                heating_setpoint: s.initial_heating_setpoint,
                cooling_setpoint: s.initial_cooling_setpoint,
                conditioned: vec![s.initial_zone_temperature; s.conditioned_zones.len()],
                unconditioned: vec![s.initial_zone_temperature; s.unconditioned_zones.len()],
                outputs: OutputSnapshot::new(),
            },
        );
        info!("submitted {} as {id}", archive.display());
        Ok(id)
    }

    fn start(&mut self, site: &SiteId, options: &StartOptions) -> Result<(), EngineError> {
        let entry = self
            .sites
            .get_mut(site)
            .ok_or_else(|| EngineError::UnknownSite(site.clone()))?;
        if entry.status != SiteStatus::Submitted {
            return Err(EngineError::NotReady {
                site: site.clone(),
                status: entry.status.as_str().to_string(),
            });
        }
        if options.time_end <= options.time_start {
            return Err(EngineError::Protocol(format!(
                "time_end {} is not after time_start {}",
                options.time_end, options.time_start
            )));
        }
        entry.status = SiteStatus::Running;
        entry.time = options.time_start;
        info!("started {site} at {}", options.time_start);
        // outputs are available before the first advance
        self.integrate(site, 0.0)
    }

    fn get_outputs(&mut self, site: &SiteId) -> Result<OutputSnapshot, EngineError> {
        Ok(self.running_site_mut(site)?.outputs.clone())
    }

    fn get_sim_time(&mut self, site: &SiteId) -> Result<NaiveDateTime, EngineError> {
        Ok(self.running_site_mut(site)?.time)
    }

    fn set_inputs(&mut self, site: &SiteId, inputs: &InputMap) -> Result<(), EngineError> {
        let entry = self.running_site_mut(site)?;
        for (key, value) in inputs {
            match key.as_str() {
                keys::HEATING_SETPOINT => entry.heating_setpoint = *value,
                keys::COOLING_SETPOINT => entry.cooling_setpoint = *value,
                other => {
                    return Err(EngineError::Protocol(format!(
                        "site {site} has no input point \"{other}\""
                    )));
                }
            }
        }
        Ok(())
    }

    fn advance(&mut self, sites: &[SiteId]) -> Result<(), EngineError> {
        let minutes = i64::from(self.settings.time_step_minutes);
        let dt_hours = minutes as f64 / 60.0;
        for id in sites {
            let site = self.running_site_mut(id)?;
            site.time += TimeDelta::minutes(minutes);
            self.integrate(id, dt_hours)?;
        }
        Ok(())
    }

    fn stop(&mut self, site: &SiteId) -> Result<(), EngineError> {
        let entry = self.running_site_mut(site)?;
        entry.status = SiteStatus::Stopped;
        info!("stopped {site}");
        Ok(())
    }
}
