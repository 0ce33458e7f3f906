//! # Cycle Analyst Source
//!
//! Parses the Cycle Analyst V3 serial telemetry stream.
//!
//! The controller prints one line per sample with 14 tab-separated values:
//!
//! ```text
//! Ah  V  A  Speed  Dist  Temp  RPM  HW  Nm  ThI  ThO  AuxA  AuxD  Flags
//! ```
//!
//! The first character of `Flags` is the active mode and a `B` anywhere in
//! it means the brake lever is pulled.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;
use tracing::warn;

use super::serial::LineReader;
use super::Source;
use crate::error::{Result, TelemetryError};
use crate::record::{now_timestamp, MotorTelemetry};

/// Values per Cycle Analyst telemetry line
pub const CA_LINE_VALUES_COUNT: usize = 14;

/// Default Cycle Analyst serial speed
pub const CA_BAUD_RATE: u32 = 9600;

/// Parse one telemetry line, stamped with the current time
///
/// # Errors
///
/// Returns [`TelemetryError::Parse`] on a wrong value count, a non-numeric
/// value or a missing mode digit
pub fn parse_line(line: &str) -> Result<MotorTelemetry> {
    let values: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if values.len() != CA_LINE_VALUES_COUNT {
        return Err(TelemetryError::Parse(format!(
            "Incorrect number of values in serial line: {} expected {}",
            values.len(),
            CA_LINE_VALUES_COUNT
        )));
    }

    let mut numbers = [0.0f64; CA_LINE_VALUES_COUNT - 1];
    for (i, value) in values[..CA_LINE_VALUES_COUNT - 1].iter().enumerate() {
        numbers[i] = value
            .trim()
            .parse()
            .map_err(|_| TelemetryError::Parse(format!("Invalid value {:?} at column {}", value, i)))?;
    }

    let flags = values[13].trim().to_string();
    let mode = flags
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| TelemetryError::Parse(format!("Invalid flags {:?}", flags)))? as i32;

    Ok(MotorTelemetry {
        timestamp: now_timestamp(),
        amper_hours: numbers[0],
        voltage: numbers[1],
        current: numbers[2],
        speed: numbers[3],
        trip_distance: numbers[4],
        motor_temp: numbers[5],
        pedal_rpm: numbers[6],
        human_watts: numbers[7],
        human_torque: numbers[8],
        throttle_input: numbers[9],
        throttle_output: numbers[10],
        aux_a: numbers[11],
        aux_d: numbers[12],
        mode,
        is_brake_pressed: MotorTelemetry::brake_from_flags(&flags),
        flags,
    })
}

/// Cycle Analyst telemetry read from a serial stream
#[derive(Debug)]
pub struct CycleAnalystSource<R> {
    lines: LineReader<R>,
}

impl<R: AsyncBufRead + Unpin + Send> CycleAnalystSource<R> {
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            lines: LineReader::new(reader, read_timeout),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Source for CycleAnalystSource<R> {
    type Record = MotorTelemetry;

    fn name(&self) -> &str {
        "cycle_analyst"
    }

    async fn read(&mut self) -> anyhow::Result<Option<MotorTelemetry>> {
        let Some(line) = self.lines.read_line().await? else {
            return Ok(None);
        };

        match parse_line(&line) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Dropping Cycle Analyst line: {}", e);
                Ok(None)
            }
        }
    }
}
