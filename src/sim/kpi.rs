//! Post-hoc run summary computed from a session record.

use std::fmt;

use serde::Serialize;

use super::keys;
use super::record::{Decision, HistoricalRecord};
use crate::control::thermostat::ThermostatMode;

/// Aggregate indicators for one finished session.
///
/// Computed from the [`HistoricalRecord`] so the summary always agrees with
/// the exported rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    /// Mean controlled-zone temperature over steps that reported one.
    pub zone_temperature_mean: Option<f64>,
    pub zone_temperature_min: Option<f64>,
    pub zone_temperature_max: Option<f64>,
    pub heating_runtime_mean: f64,
    pub cooling_runtime_mean: f64,
    pub habitual_overrides: usize,
    pub discomfort_overrides: usize,
    /// Steps spent in each thermostat mode: auto, manual, precool, setback.
    pub thermostat_mode_steps: [usize; 4],
    pub skipped_decisions: usize,
    pub recovered_anomalies: usize,
}

impl RunSummary {
    /// Computes the summary.
    ///
    /// # Arguments
    ///
    /// * `record` - Complete session record
    /// * `zone` - Controlled zone whose temperature is summarized
    pub fn from_record(record: &HistoricalRecord, zone: &str) -> Self {
        let column = |key: &str| record.sensor_columns().iter().position(|c| c.key == key);
        let temp_idx = column(&keys::zone_air_temperature(zone));
        let heat_idx = column(keys::HEATING_COIL_RUNTIME_FRACTION);
        let cool_idx = column(keys::COOLING_COIL_RUNTIME_FRACTION);

        let mut temp_sum = 0.0;
        let mut temp_n = 0_usize;
        let mut temp_min = f64::INFINITY;
        let mut temp_max = f64::NEG_INFINITY;
        let mut heat_sum = 0.0;
        let mut cool_sum = 0.0;
        let mut habitual = 0;
        let mut discomfort = 0;
        let mut modes = [0_usize; 4];
        let mut skipped = 0;
        let mut anomalies = 0;

        for row in record.rows() {
            let value = |idx: Option<usize>| idx.and_then(|i| row.sensors.get(i).copied().flatten());
            if let Some(t) = value(temp_idx) {
                temp_sum += t;
                temp_n += 1;
                temp_min = temp_min.min(t);
                temp_max = temp_max.max(t);
            }
            heat_sum += value(heat_idx).unwrap_or(0.0);
            cool_sum += value(cool_idx).unwrap_or(0.0);

            let info = &row.info;
            habitual += usize::from(info.occupant_habitual_override);
            discomfort += usize::from(info.occupant_discomfort_override);
            if let Some(mode) = info.thermostat_mode {
                let slot = match mode {
                    ThermostatMode::Auto => 0,
                    ThermostatMode::Manual => 1,
                    ThermostatMode::Precool => 2,
                    ThermostatMode::Setback => 3,
                };
                modes[slot] += 1;
            }
            if matches!(row.decision, Decision::Skipped(_)) {
                skipped += 1;
            }
            if info.anomaly.is_some() {
                anomalies += 1;
            }
        }

        let n = record.len().max(1) as f64;
        let has_temp = temp_n > 0;
        Self {
            steps: record.len(),
            zone_temperature_mean: has_temp.then(|| temp_sum / temp_n as f64),
            zone_temperature_min: has_temp.then_some(temp_min),
            zone_temperature_max: has_temp.then_some(temp_max),
            heating_runtime_mean: heat_sum / n,
            cooling_runtime_mean: cool_sum / n,
            habitual_overrides: habitual,
            discomfort_overrides: discomfort,
            thermostat_mode_steps: modes,
            skipped_decisions: skipped,
            recovered_anomalies: anomalies,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let temp = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |t| format!("{t:.2}"));
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(
            f,
            "Zone temperature:      mean {} (min {}, max {})",
            temp(self.zone_temperature_mean),
            temp(self.zone_temperature_min),
            temp(self.zone_temperature_max)
        )?;
        writeln!(f, "Heating runtime:       {:.1}%", 100.0 * self.heating_runtime_mean)?;
        writeln!(f, "Cooling runtime:       {:.1}%", 100.0 * self.cooling_runtime_mean)?;
        writeln!(
            f,
            "Occupant overrides:    {} habitual, {} discomfort",
            self.habitual_overrides, self.discomfort_overrides
        )?;
        let [auto, manual, precool, setback] = self.thermostat_mode_steps;
        writeln!(
            f,
            "Thermostat modes:      auto {auto}, manual {manual}, precool {precool}, setback {setback}"
        )?;
        writeln!(f, "Skipped decisions:     {}", self.skipped_decisions)?;
        write!(f, "Raised cooling:        {}", self.recovered_anomalies)
    }
}
