//! # Telemetry Log Module
//!
//! Versioned, self-describing text logs of motor telemetry.
//!
//! This module handles:
//! - Writing the 3-line header and one CSV line per record
//! - Rotating files at a record-count ceiling or on demand
//! - Reading a log back against the schema declared in its own header
//! - Aggregating a time window of a log into ride statistics
//!
//! ## File Format
//!
//! ```text
//! GREYBIKE LOG
//! VERSION v1
//! FIELDS timestamp,speed,voltage,current,...
//! 1721509472.15,23.4,51.2,8.1,...
//! ```

pub mod aggregate;
pub mod reader;
pub mod writer;

pub use aggregate::{aggregate, aggregate_records, AggregatedLogData};
pub use reader::{parse_header, LogHeader, LogReader, LogRecord};
pub use writer::{list_log_files, LogWriter};

/// First header line of every log file
pub const LOG_MAGIC: &str = "GREYBIKE LOG";

/// Format version written by this program
pub const LOG_VERSION: u32 = 1;

/// Extension of log files
pub const LOG_EXTENSION: &str = "log";

/// Default record ceiling per file (about one hour at 10 records/second)
pub const DEFAULT_MAX_RECORDS_PER_FILE: usize = 36_000;

/// Fields written by this program, in column order
pub const LOG_FIELDS: &[&str] = &[
    "timestamp",
    "speed",
    "voltage",
    "current",
    "trip_distance",
    "amper_hours",
    "motor_temp",
    "pedal_rpm",
    "human_torque",
    "human_watts",
    "throttle_input",
    "throttle_output",
    "mode",
];

/// Render the 3-line header for the current format version
pub fn log_header() -> String {
    format!(
        "{}\nVERSION v{}\nFIELDS {}\n",
        LOG_MAGIC,
        LOG_VERSION,
        LOG_FIELDS.join(",")
    )
}
