//! # Log Reader
//!
//! Parses a log file back into [`LogRecord`]s.
//!
//! The `FIELDS` header line is the authoritative column layout of a file.
//! Older files may carry a different order or subset of columns than the
//! current writer; values are matched by name, and columns this program does
//! not know are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, error, warn};

use super::LOG_MAGIC;
use crate::error::{Result, TelemetryError};

/// Parsed log header
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    /// Format version from the `VERSION v{N}` line
    pub version: u32,
    /// Column names from the `FIELDS` line, in file order
    pub fields: Vec<String>,
}

/// One data line of a log file
///
/// Every field except `timestamp` is optional since historical files may not
/// carry it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub timestamp: f64,
    pub speed: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub trip_distance: Option<f64>,
    pub amper_hours: Option<f64>,
    pub motor_temp: Option<f64>,
    pub pedal_rpm: Option<f64>,
    pub human_torque: Option<f64>,
    pub human_watts: Option<f64>,
    pub throttle_input: Option<f64>,
    pub throttle_output: Option<f64>,
    pub mode: Option<f64>,
}

impl LogRecord {
    /// Build a record from `(column, value)` pairs
    ///
    /// Unknown columns are skipped. Returns `None` without a timestamp.
    pub fn from_columns<'a, I>(columns: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut timestamp = None;
        let mut record = LogRecord::default();

        for (name, value) in columns {
            match name {
                "timestamp" => timestamp = Some(value),
                "speed" => record.speed = Some(value),
                "voltage" => record.voltage = Some(value),
                "current" => record.current = Some(value),
                "trip_distance" => record.trip_distance = Some(value),
                "amper_hours" => record.amper_hours = Some(value),
                "motor_temp" => record.motor_temp = Some(value),
                "pedal_rpm" => record.pedal_rpm = Some(value),
                "human_torque" => record.human_torque = Some(value),
                "human_watts" => record.human_watts = Some(value),
                "throttle_input" => record.throttle_input = Some(value),
                "throttle_output" => record.throttle_output = Some(value),
                "mode" => record.mode = Some(value),
                _ => {}
            }
        }

        record.timestamp = timestamp?;
        Some(record)
    }
}

/// Validate the three header lines of a log file
///
/// # Errors
///
/// Returns [`TelemetryError::MalformedLog`] if:
/// - The first line is not `GREYBIKE LOG`
/// - The version line is not `VERSION v{N}`
/// - The fields line is not `FIELDS {csv}` or lacks `timestamp`
pub fn parse_header(magic: &str, version: &str, fields: &str) -> Result<LogHeader> {
    if magic.trim_end() != LOG_MAGIC {
        return Err(TelemetryError::MalformedLog(format!(
            "Invalid magic line: {:?}",
            magic.trim_end()
        )));
    }

    let version = version
        .trim()
        .strip_prefix("VERSION")
        .map(str::trim_start)
        .and_then(|v| v.strip_prefix('v'))
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| {
            TelemetryError::MalformedLog(format!("Invalid version line: {:?}", version.trim()))
        })?;

    let fields: Vec<String> = fields
        .trim_end()
        .strip_prefix("FIELDS ")
        .ok_or_else(|| {
            TelemetryError::MalformedLog(format!("Invalid fields line: {:?}", fields.trim_end()))
        })?
        .split(',')
        .map(|f| f.trim().to_string())
        .collect();

    if !fields.iter().any(|f| f == "timestamp") {
        return Err(TelemetryError::MalformedLog(
            "Schema has no timestamp column".to_string(),
        ));
    }

    Ok(LogHeader { version, fields })
}

/// Sequential reader over one log file
#[derive(Debug)]
pub struct LogReader<R> {
    header: LogHeader,
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl LogReader<BufReader<File>> {
    /// Open a log file and parse its header
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use greybike::telemetry::LogReader;
    ///
    /// let reader = LogReader::open("logs/2024-07-21T02:04:30.147284.log")?;
    /// for record in reader.records() {
    ///     println!("{} km/h", record.speed.unwrap_or(0.0));
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> LogReader<R> {
    /// Parse the header from any buffered source
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let mut header_lines = Vec::with_capacity(3);
        for _ in 0..3 {
            match lines.next() {
                Some(line) => header_lines.push(line?),
                None => {
                    return Err(TelemetryError::MalformedLog(
                        "File ends before the header is complete".to_string(),
                    ))
                }
            }
        }

        let header = parse_header(&header_lines[0], &header_lines[1], &header_lines[2])?;
        debug!("Log file version {}, {} fields", header.version, header.fields.len());

        Ok(Self {
            header,
            lines,
            line_number: 3,
        })
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Lazily stream the data lines as records
    ///
    /// Malformed lines are logged and skipped. A read error ends the stream.
    pub fn records(self) -> LogRecords<R> {
        LogRecords { reader: self }
    }

    fn parse_line(&self, line: &str) -> std::result::Result<LogRecord, String> {
        let values: Vec<&str> = line.split(',').collect();
        if values.len() != self.header.fields.len() {
            return Err(format!(
                "expected {} values, got {}",
                self.header.fields.len(),
                values.len()
            ));
        }

        let mut columns = Vec::with_capacity(values.len());
        for (field, value) in self.header.fields.iter().zip(values) {
            let parsed = value
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("non-numeric value {:?} for {}", value, field))?;
            if !parsed.is_finite() {
                return Err(format!("non-finite value {:?} for {}", value, field));
            }
            columns.push((field.as_str(), parsed));
        }

        LogRecord::from_columns(columns).ok_or_else(|| "missing timestamp".to_string())
    }
}

/// Iterator returned by [`LogReader::records`]
#[derive(Debug)]
pub struct LogRecords<R> {
    reader: LogReader<R>,
}

impl<R: BufRead> Iterator for LogRecords<R> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        loop {
            let line = match self.reader.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    error!(
                        "Failed to read log line {}: {}",
                        self.reader.line_number + 1,
                        e
                    );
                    return None;
                }
            };
            self.reader.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            match self.reader.parse_line(&line) {
                Ok(record) => return Some(record),
                Err(reason) => {
                    warn!(
                        "Skipping malformed log line {}: {}",
                        self.reader.line_number, reason
                    );
                }
            }
        }
    }
}
