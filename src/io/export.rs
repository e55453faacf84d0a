//! CSV export for session records.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::record::HistoricalRecord;

/// Exports a session record to a CSV file at the given path.
///
/// Writes the record's column names as the header followed by one data row
/// per step. Empty cells stand for values the engine did not report.
///
/// # Arguments
///
/// * `record` - Complete session record
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(record: &HistoricalRecord, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(record, buf)
}

/// Writes a session record as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(record: &HistoricalRecord, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(record.column_names())?;
    for row in record.rows() {
        wtr.write_record(record.row_cells(row).iter().map(ToString::to_string))?;
    }

    wtr.flush()?;
    Ok(())
}

/// File name for one session's export inside a directory, e.g. `house-0.csv`.
pub fn session_file_name(alias: &str) -> String {
    let safe: String = alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.csv")
}
