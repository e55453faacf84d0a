//! Append-only per-session history.
//!
//! Every step of a session appends exactly one [`RecordRow`]: the engine
//! outputs observed after the step plus the [`ControlInformation`] that
//! produced it. Rows are kept in chronological order and never edited.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::engine::OutputSnapshot;
use super::keys;
use crate::control::dispatcher::{ControlInformation, SetpointCommand};

/// One typed cell of a record column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Flag(bool),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::Empty, Self::Number)
    }
}

/// Outcome of the control decision for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A command was written to the engine.
    Applied(SetpointCommand),
    /// The decision produced no command.
    NoCommand,
    /// The decision failed and the tick was skipped.
    Skipped(String),
}

impl Decision {
    fn label(&self) -> String {
        match self {
            Self::Applied(_) => "applied".into(),
            Self::NoCommand => "none".into(),
            Self::Skipped(reason) => format!("skipped: {reason}"),
        }
    }
}

/// A tracked engine point and the column it is recorded under.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorColumn {
    pub key: String,
    pub label: String,
}

impl SensorColumn {
    fn same(key: &str) -> Self {
        Self {
            key: key.to_string(),
            label: key.to_string(),
        }
    }
}

/// One appended step.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub step: usize,
    pub time: NaiveDateTime,
    /// Values aligned with [`HistoricalRecord::sensor_columns`]; `None` when
    /// the engine did not report the point.
    pub sensors: Vec<Option<f64>>,
    pub info: ControlInformation,
    pub decision: Decision,
}

const INFO_COLUMNS: [&str; 15] = [
    "Heating Setpoint (New)",
    "Heating Deadband Up",
    "Heating Deadband Down",
    "Cooling Setpoint (New)",
    "Cooling Deadband Up",
    "Cooling Deadband Down",
    "Thermostat Schedule",
    "Thermostat Mode",
    "Occupant Motion",
    "Occupant Thermal Frustration",
    "Occupant Comfort Delta",
    "Occupant Habitual Override",
    "Occupant Discomfort Override",
    "Cooling Setpoint (Raised)",
    "Decision",
];

/// Chronological history of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRecord {
    pub alias: String,
    pub model_name: String,
    pub time_start: NaiveDateTime,
    pub time_end: NaiveDateTime,
    sensor_columns: Vec<SensorColumn>,
    rows: Vec<RecordRow>,
}

impl HistoricalRecord {
    /// Creates an empty record tracking the standard points for the given zones.
    ///
    /// # Arguments
    ///
    /// * `alias` - Session alias the record is keyed by
    /// * `model_name` - Building model name
    /// * `time_start` / `time_end` - Requested simulation window
    /// * `conditioned_zones` - Zones echoed with temperature, humidity and setpoint
    /// * `unconditioned_zones` - Zones echoed with temperature and humidity
    pub fn new(
        alias: impl Into<String>,
        model_name: impl Into<String>,
        time_start: NaiveDateTime,
        time_end: NaiveDateTime,
        conditioned_zones: &[String],
        unconditioned_zones: &[String],
    ) -> Self {
        let mut cols = vec![
            SensorColumn::same(keys::SYSTEM_NODE_TEMPERATURE),
            SensorColumn::same(keys::OUTDOOR_AIR_DRYBULB_TEMPERATURE),
            SensorColumn::same(keys::HEATING_SETPOINT),
            SensorColumn::same(keys::COOLING_SETPOINT),
        ];
        for zone in conditioned_zones {
            cols.push(zone_column(zone, &keys::zone_air_temperature(zone), "Air Temperature", "CONDITIONED"));
            cols.push(zone_column(zone, &keys::zone_humidity(zone), "Humidity", "CONDITIONED"));
            cols.push(zone_column(
                zone,
                &keys::zone_temperature_setpoint(zone),
                "Temperature Setpoint",
                "CONDITIONED",
            ));
        }
        for zone in unconditioned_zones {
            cols.push(zone_column(zone, &keys::zone_air_temperature(zone), "Air Temperature", "UNCONDITIONED"));
            cols.push(zone_column(zone, &keys::zone_humidity(zone), "Humidity", "UNCONDITIONED"));
        }
        cols.extend(
            [
                keys::HEATING_COIL_RUNTIME_FRACTION,
                keys::COOLING_COIL_RUNTIME_FRACTION,
                keys::SUPPLY_FAN_AIR_MASS_FLOW_RATE,
                keys::SYSTEM_NODE_VOLUME_FLOW_RATE,
            ]
            .into_iter()
            .chain(keys::ENERGY_METERS)
            .map(SensorColumn::same),
        );

        Self {
            alias: alias.into(),
            model_name: model_name.into(),
            time_start,
            time_end,
            sensor_columns: cols,
            rows: Vec::new(),
        }
    }

    pub fn sensor_columns(&self) -> &[SensorColumn] {
        &self.sensor_columns
    }

    pub fn rows(&self) -> &[RecordRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends one step.
    ///
    /// # Panics
    ///
    /// Panics if `time` is earlier than the last appended row's time.
    pub fn append(
        &mut self,
        time: NaiveDateTime,
        outputs: &OutputSnapshot,
        info: ControlInformation,
        decision: Decision,
    ) {
        if let Some(last) = self.rows.last() {
            assert!(time >= last.time, "record rows must be appended in time order");
        }
        let sensors = self
            .sensor_columns
            .iter()
            .map(|c| outputs.get(&c.key).copied())
            .collect();
        self.rows.push(RecordRow {
            step: self.rows.len(),
            time,
            sensors,
            info,
            decision,
        });
    }

    /// Column headers, in the order of [`HistoricalRecord::row_cells`].
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once("Time".to_string())
            .chain(self.sensor_columns.iter().map(|c| c.label.clone()))
            .chain(INFO_COLUMNS.iter().map(|s| s.to_string()))
            .collect()
    }

    /// Cells of one row, aligned with [`HistoricalRecord::column_names`].
    pub fn row_cells(&self, row: &RecordRow) -> Vec<Cell> {
        let info = &row.info;
        let mut cells = Vec::with_capacity(1 + row.sensors.len() + INFO_COLUMNS.len());
        cells.push(Cell::Text(row.time.format("%Y-%m-%d %H:%M:%S").to_string()));
        cells.extend(row.sensors.iter().map(|v| Cell::from(*v)));
        cells.extend([
            info.heating_setpoint_new.into(),
            info.heating_deadband_up.into(),
            info.heating_deadband_down.into(),
            info.cooling_setpoint_new.into(),
            info.cooling_deadband_up.into(),
            info.cooling_deadband_down.into(),
            info.thermostat_schedule
                .clone()
                .map_or(Cell::Empty, Cell::Text),
            info.thermostat_mode
                .map_or(Cell::Empty, |m| Cell::Text(m.to_string())),
            Cell::Flag(info.occupant_motion),
            Cell::Number(info.occupant_thermal_frustration),
            Cell::Number(info.occupant_comfort_delta),
            Cell::Flag(info.occupant_habitual_override),
            Cell::Flag(info.occupant_discomfort_override),
            info.anomaly.map(|a| a.applied_cooling).into(),
            Cell::Text(row.decision.label()),
        ]);
        cells
    }

    /// Column-major view: every column has exactly [`HistoricalRecord::len`] cells.
    pub fn to_columns(&self) -> Vec<(String, Vec<Cell>)> {
        let names = self.column_names();
        let mut columns: Vec<(String, Vec<Cell>)> = names
            .into_iter()
            .map(|n| (n, Vec::with_capacity(self.rows.len())))
            .collect();
        for row in &self.rows {
            for (col, cell) in columns.iter_mut().zip(self.row_cells(row)) {
                col.1.push(cell);
            }
        }
        columns
    }

    /// Rows whose step index lies in `[from, to)`.
    pub fn window(&self, from: usize, to: usize) -> &[RecordRow] {
        let end = to.min(self.rows.len());
        let start = from.min(end);
        &self.rows[start..end]
    }
}

fn zone_column(zone: &str, key: &str, quantity: &str, kind: &str) -> SensorColumn {
    SensorColumn {
        key: key.to_string(),
        label: format!("{zone}::{quantity} ({kind})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 1, 1)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
    }

    fn record() -> HistoricalRecord {
        HistoricalRecord::new(
            "house-0",
            "demo",
            t(0),
            t(23),
            &["LIVING ZONE".to_string()],
            &["ATTIC".to_string()],
        )
    }

    #[test]
    fn columns_cover_zones_and_meters() {
        let r = record();
        let names = r.column_names();
        assert_eq!(names[0], "Time");
        assert!(names.contains(&"LIVING ZONE::Air Temperature (CONDITIONED)".to_string()));
        assert!(names.contains(&"LIVING ZONE::Temperature Setpoint (CONDITIONED)".to_string()));
        assert!(names.contains(&"ATTIC::Humidity (UNCONDITIONED)".to_string()));
        assert!(!names.contains(&"ATTIC::Temperature Setpoint (UNCONDITIONED)".to_string()));
        assert!(names.contains(&"Fan Electricity Energy".to_string()));
        assert!(names.contains(&"Decision".to_string()));
    }

    #[test]
    fn missing_outputs_are_empty_cells() {
        let mut r = record();
        let mut out = OutputSnapshot::new();
        out.insert(keys::zone_air_temperature("LIVING ZONE"), 22.5);
        r.append(t(1), &out, ControlInformation::default(), Decision::NoCommand);

        let names = r.column_names();
        let cells = r.row_cells(&r.rows()[0]);
        assert_eq!(names.len(), cells.len());
        let idx = |name: &str| names.iter().position(|n| n == name).expect("column");
        assert_eq!(cells[idx("LIVING ZONE::Air Temperature (CONDITIONED)")], Cell::Number(22.5));
        assert_eq!(cells[idx("ATTIC::Air Temperature (UNCONDITIONED)")], Cell::Empty);
        assert_eq!(cells[idx("Decision")], Cell::Text("none".into()));
    }

    #[test]
    fn every_column_has_one_cell_per_row() {
        let mut r = record();
        for h in 0..5 {
            r.append(t(h), &OutputSnapshot::new(), ControlInformation::default(), Decision::NoCommand);
        }
        let cols = r.to_columns();
        assert_eq!(cols.len(), r.column_names().len());
        assert!(cols.iter().all(|(_, cells)| cells.len() == 5));
        assert_eq!(r.rows()[4].step, 4);
    }

    #[test]
    #[should_panic(expected = "time order")]
    fn rejects_out_of_order_rows() {
        let mut r = record();
        r.append(t(2), &OutputSnapshot::new(), ControlInformation::default(), Decision::NoCommand);
        r.append(t(1), &OutputSnapshot::new(), ControlInformation::default(), Decision::NoCommand);
    }

    #[test]
    fn window_clamps_to_bounds() {
        let mut r = record();
        for h in 0..3 {
            r.append(t(h), &OutputSnapshot::new(), ControlInformation::default(), Decision::NoCommand);
        }
        assert_eq!(r.window(1, 10).len(), 2);
        assert_eq!(r.window(5, 10).len(), 0);
        assert_eq!(r.window(2, 1).len(), 0);
    }

    #[test]
    fn cell_display() {
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::Number(21.5).to_string(), "21.5");
        assert_eq!(Cell::Flag(true).to_string(), "true");
    }
}
