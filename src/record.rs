//! # Record Model
//!
//! Immutable, timestamped telemetry samples. One type per sensor class.
//!
//! Records are plain values: a producer builds one, pushes it into a
//! [`RecencyBuffer`](crate::buffer::RecencyBuffer) and never touches it again.
//! A newer reading replaces an older one, nothing is mutated in place.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as seconds since the Unix epoch
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Message categories understood by UI subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    System,
    Ca,
    Gnss,
    Event,
    Electric,
}

impl MessageType {
    /// Wire name of the message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::System => "system",
            MessageType::Ca => "ca",
            MessageType::Gnss => "gnss",
            MessageType::Event => "event",
            MessageType::Electric => "electric",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common capability of every telemetry record
pub trait Record: Clone + Serialize + Send + Sync + 'static {
    /// Message type used when broadcasting this record
    const MESSAGE_TYPE: MessageType;

    /// Creation time in seconds since the Unix epoch
    fn timestamp(&self) -> f64;

    /// Message type used when broadcasting this record
    fn message_type(&self) -> MessageType {
        Self::MESSAGE_TYPE
    }
}

/// Telemetry from the Cycle Analyst V3 serial output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorTelemetry {
    pub timestamp: f64,
    pub amper_hours: f64,
    pub voltage: f64,
    pub current: f64,
    pub speed: f64,
    pub trip_distance: f64,
    pub motor_temp: f64,
    pub pedal_rpm: f64,
    pub human_watts: f64,
    pub human_torque: f64,
    pub throttle_input: f64,
    pub throttle_output: f64,
    pub aux_a: f64,
    pub aux_d: f64,
    pub mode: i32,
    pub flags: String,
    pub is_brake_pressed: bool,
}

impl MotorTelemetry {
    /// Derive the brake state from the raw Cycle Analyst flags
    pub fn brake_from_flags(flags: &str) -> bool {
        flags.contains('B')
    }
}

impl Record for MotorTelemetry {
    const MESSAGE_TYPE: MessageType = MessageType::Ca;

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Position fix from the onboard GNSS receiver
///
/// Latitude and longitude are unsigned magnitudes in the NMEA `ddmm.mmmm`
/// form. The N/S and E/W hemisphere indicators are not kept, so a southern
/// or western fix is positive too.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnssFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level in meters
    pub altitude: Option<f64>,
    /// Ground speed in km/h
    pub speed: Option<f64>,
    /// Horizontal dilution of precision, lower is better
    pub hdop: Option<f64>,
    /// Satellites used in fix
    pub sat_num: Option<u32>,
}

impl GnssFix {
    /// Create a fix with only a position, stamped now
    pub fn position(latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp: now_timestamp(),
            latitude,
            longitude,
            altitude: None,
            speed: None,
            hdop: None,
            sat_num: None,
        }
    }
}

impl Record for GnssFix {
    const MESSAGE_TYPE: MessageType = MessageType::Gnss;

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Electrical reading for the battery and auxiliary electronics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectricalReading {
    pub timestamp: f64,
    pub current: f64,
    pub voltage: f64,
    pub temp: Option<f64>,
}

impl ElectricalReading {
    pub fn new(current: f64, voltage: f64, temp: Option<f64>) -> Self {
        Self {
            timestamp: now_timestamp(),
            current,
            voltage,
            temp,
        }
    }
}

impl Record for ElectricalReading {
    const MESSAGE_TYPE: MessageType = MessageType::Electric;

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Host system metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemReading {
    pub timestamp: f64,
    /// CPU temperature in Celsius
    pub cpu_temp: Option<f64>,
    /// Memory usage percentage
    pub memory_usage: f64,
    /// CPU usage percentage
    pub cpu_usage: f64,
}

impl SystemReading {
    pub fn new(cpu_temp: Option<f64>, memory_usage: f64, cpu_usage: f64) -> Self {
        Self {
            timestamp: now_timestamp(),
            cpu_temp,
            memory_usage,
            cpu_usage,
        }
    }
}

impl Record for SystemReading {
    const MESSAGE_TYPE: MessageType = MessageType::System;

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}
