//! # Serial Line Input
//!
//! Opening serial ports and reading newline-terminated lines with a timeout.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};

/// Open a serial port with 8N1 settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
///
/// # Errors
///
/// Returns [`TelemetryError::Serial`] if the port cannot be opened
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(port)
}

/// Line reader that gives up after a timeout without losing partial lines
///
/// Bytes read before a timeout stay buffered and complete the line on the
/// next call.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    timeout: Duration,
}

impl<R: AsyncBufRead + Unpin + Send> LineReader<R> {
    pub fn new(reader: R, timeout: Duration) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            timeout,
        }
    }

    /// Read one line without its terminator
    ///
    /// Returns `Ok(None)` if no complete line arrived within the timeout.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure, end of stream or invalid UTF-8
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let read = tokio::time::timeout(self.timeout, self.reader.read_until(b'\n', &mut self.buf)).await;

        let n = match read {
            Ok(result) => result?,
            Err(_) => {
                debug!("No complete line within {:?}", self.timeout);
                return Ok(None);
            }
        };

        if n == 0 && self.buf.is_empty() {
            return Err(TelemetryError::Serial("Stream closed".to_string()));
        }

        let bytes = std::mem::take(&mut self.buf);
        let line = String::from_utf8(bytes)
            .map_err(|e| TelemetryError::Parse(format!("Invalid UTF-8 in line: {}", e)))?;
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
