//! Uploaded setpoint schedules.
//!
//! A schedule is a table with a `datetime` column (`M/D/Y  H:MM:SS`, year
//! optional) and six setpoint columns, uploaded as CSV or as the first sheet
//! of an `.xls`/`.xlsx` workbook. Rows are matched against the simulated
//! time on month, day, hour and minute; see [`SetpointSchedule::lookup`].

use std::fs;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::Deserialize;

use super::deadband::SetpointRequest;
use crate::error::ControlError;

/// Year assumed for rows whose `datetime` omits it. A leap year, so `2/29`
/// rows parse.
pub const DEFAULT_SCHEDULE_YEAR: i32 = 2000;

const COLUMNS: [&str; 7] = [
    "datetime",
    "Heating Setpoint (New)",
    "Heating Deadband Up",
    "Heating Deadband Down",
    "Cooling Setpoint (New)",
    "Cooling Deadband Up",
    "Cooling Deadband Down",
];

/// Declared format of an uploaded schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFormat {
    Csv,
    Spreadsheet,
}

impl ScheduleFormat {
    /// Resolves a MIME content type.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] for unrecognized types.
    pub fn from_content_type(content_type: &str) -> Result<Self, ControlError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" | "text/plain" => Ok(Self::Csv),
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Ok(Self::Spreadsheet)
            }
            other => Err(ControlError::ScheduleParse(format!(
                "unsupported schedule content type \"{other}\""
            ))),
        }
    }

    /// Resolves a file extension (`csv`, `xls`, `xlsx`).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] for missing or unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, ControlError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xls" | "xlsx") => Ok(Self::Spreadsheet),
            _ => Err(ControlError::ScheduleParse(format!(
                "cannot tell schedule format of \"{}\" (expected .csv, .xls or .xlsx)",
                path.display()
            ))),
        }
    }
}

/// Raw schedule bytes plus their declared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleUpload {
    pub format: ScheduleFormat,
    pub contents: Vec<u8>,
}

impl ScheduleUpload {
    pub fn csv(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            format: ScheduleFormat::Csv,
            contents: contents.into(),
        }
    }

    /// Reads a schedule file, taking the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] if the extension is unknown or
    /// the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, ControlError> {
        let format = ScheduleFormat::from_path(path)?;
        let contents = fs::read(path).map_err(|e| {
            ControlError::ScheduleParse(format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Ok(Self { format, contents })
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    datetime: String,
    #[serde(rename = "Heating Setpoint (New)")]
    heating_new: String,
    #[serde(rename = "Heating Deadband Up")]
    heating_up: String,
    #[serde(rename = "Heating Deadband Down")]
    heating_down: String,
    #[serde(rename = "Cooling Setpoint (New)")]
    cooling_new: String,
    #[serde(rename = "Cooling Deadband Up")]
    cooling_up: String,
    #[serde(rename = "Cooling Deadband Down")]
    cooling_down: String,
}

/// One parsed schedule row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    /// Row time after hour-24 normalization.
    pub at: NaiveDateTime,
    pub heating: Option<SetpointRequest>,
    pub cooling: Option<SetpointRequest>,
}

/// A parsed setpoint schedule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetpointSchedule {
    rows: Vec<ScheduleRow>,
}

impl SetpointSchedule {
    /// Parses an uploaded schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ScheduleParse`] for unreadable workbooks,
    /// missing columns, malformed `datetime` cells, or non-numeric deadbands.
    pub fn parse(upload: &ScheduleUpload) -> Result<Self, ControlError> {
        match upload.format {
            ScheduleFormat::Csv => Self::from_csv(&upload.contents),
            ScheduleFormat::Spreadsheet => Self::from_spreadsheet(&upload.contents),
        }
    }

    fn from_csv(contents: &[u8]) -> Result<Self, ControlError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(contents);
        let mut rows = Vec::new();
        for (i, raw) in rdr.deserialize::<RawRow>().enumerate() {
            let line = i + 2;
            let raw = raw.map_err(|e| ControlError::ScheduleParse(format!("line {line}: {e}")))?;
            let at = parse_schedule_datetime(&raw.datetime)
                .map_err(|e| ControlError::ScheduleParse(format!("line {line}: {e}")))?;
            rows.push(schedule_row(
                line,
                at,
                [
                    raw.heating_new.as_str(),
                    raw.heating_up.as_str(),
                    raw.heating_down.as_str(),
                    raw.cooling_new.as_str(),
                    raw.cooling_up.as_str(),
                    raw.cooling_down.as_str(),
                ],
            )?);
        }
        Ok(Self { rows })
    }

    /// Reads the first worksheet. Date cells and Excel serial numbers in the
    /// `datetime` column are accepted next to `M/D/Y  H:MM:SS` text.
    fn from_spreadsheet(contents: &[u8]) -> Result<Self, ControlError> {
        let sheet_err = |e: String| ControlError::ScheduleParse(format!("spreadsheet: {e}"));
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(contents))
            .map_err(|e| sheet_err(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| sheet_err("workbook has no worksheets".into()))?
            .map_err(|e| sheet_err(e.to_string()))?;

        let mut sheet_rows = range.rows();
        let header: Vec<String> = sheet_rows
            .next()
            .ok_or_else(|| sheet_err("worksheet is empty".into()))?
            .iter()
            .map(cell_text)
            .collect();
        let mut index = [0_usize; 7];
        for (slot, name) in index.iter_mut().zip(COLUMNS) {
            *slot = header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| sheet_err(format!("missing column \"{name}\"")))?;
        }

        let mut rows = Vec::new();
        for (i, cells) in sheet_rows.enumerate() {
            let line = i + 2;
            let cell = |col: usize| cells.get(index[col]).unwrap_or(&Data::Empty);
            let at = cell_datetime(cell(0))
                .map_err(|e| ControlError::ScheduleParse(format!("row {line}: {e}")))?;
            let text: Vec<String> = (1..7).map(|col| cell_text(cell(col))).collect();
            rows.push(schedule_row(
                line,
                at,
                [
                    text[0].as_str(),
                    text[1].as_str(),
                    text[2].as_str(),
                    text[3].as_str(),
                    text[4].as_str(),
                    text[5].as_str(),
                ],
            )?);
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds the row for `now`.
    ///
    /// A row matching month, day, hour, minute and year wins immediately.
    /// Otherwise the last row matching everything but the year is used.
    /// Returns `None` when nothing matches.
    pub fn lookup(&self, now: NaiveDateTime) -> Option<&ScheduleRow> {
        let mut fallback = None;
        for row in &self.rows {
            let at = row.at;
            if at.month() == now.month()
                && at.day() == now.day()
                && at.hour() == now.hour()
                && at.minute() == now.minute()
            {
                if at.year() == now.year() {
                    return Some(row);
                }
                fallback = Some(row);
            }
        }
        fallback
    }
}

fn schedule_row(
    line: usize,
    at: NaiveDateTime,
    [heat, heat_up, heat_down, cool, cool_up, cool_down]: [&str; 6],
) -> Result<ScheduleRow, ControlError> {
    let heating = SetpointRequest::parse(heat, heat_up, heat_down)
        .map_err(|e| ControlError::ScheduleParse(format!("line {line}: heating {e}")))?;
    let cooling = SetpointRequest::parse(cool, cool_up, cool_down)
        .map_err(|e| ControlError::ScheduleParse(format!("line {line}: cooling {e}")))?;
    Ok(ScheduleRow {
        at,
        heating,
        cooling,
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        other => other.to_string(),
    }
}

fn cell_datetime(cell: &Data) -> Result<NaiveDateTime, String> {
    match cell {
        Data::String(s) => parse_schedule_datetime(s),
        Data::Float(v) => from_excel_serial(*v),
        Data::DateTime(dt) => from_excel_serial(dt.as_f64()),
        other => Err(format!("datetime cell {other:?} is neither text nor a date")),
    }
}

/// Converts a 1900-system Excel serial date (days since 1899-12-30) to a
/// timestamp rounded to the second.
fn from_excel_serial(serial: f64) -> Result<NaiveDateTime, String> {
    if !(serial.is_finite() && serial >= 0.0) {
        return Err(format!("{serial} is not an Excel date"));
    }
    let seconds = (serial * 86_400.0).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|epoch| epoch.checked_add_signed(TimeDelta::seconds(seconds)))
        .ok_or_else(|| format!("{serial} is out of the calendar range"))
}

/// Parses `M/D[/Y]  H:MM[:SS]`. Hour `24` becomes hour 0 of the next day.
pub fn parse_schedule_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let mut parts = raw.split_whitespace();
    let (Some(date), Some(time), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("datetime \"{raw}\" is not \"M/D/Y  H:MM:SS\""));
    };

    let num = |s: &str| -> Result<u32, String> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| format!("datetime \"{raw}\" has a non-numeric field \"{s}\""))
    };

    let date_fields: Vec<&str> = date.split('/').collect();
    let (month, day, year) = match date_fields[..] {
        [m, d] => (num(m)?, num(d)?, DEFAULT_SCHEDULE_YEAR),
        [m, d, y] => {
            let y = i32::try_from(num(y)?).map_err(|_| format!("year out of range in \"{raw}\""))?;
            (num(m)?, num(d)?, y)
        }
        _ => return Err(format!("datetime \"{raw}\" has a malformed date")),
    };

    let time_fields: Vec<&str> = time.split(':').collect();
    let (hour, minute, second) = match time_fields[..] {
        [h, m] => (num(h)?, num(m)?, 0),
        [h, m, s] => (num(h)?, num(m)?, num(s)?),
        _ => return Err(format!("datetime \"{raw}\" has a malformed time")),
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("datetime \"{raw}\" is not a calendar date"))?;
    let (date, hour) = if hour == 24 {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| format!("datetime \"{raw}\" overflows the calendar"))?;
        (next, 0)
    } else {
        (date, hour)
    };
    date.and_hms_opt(hour, minute, second)
        .ok_or_else(|| format!("datetime \"{raw}\" is not a valid time of day"))
}
