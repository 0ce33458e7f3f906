//! # Sensor Sources
//!
//! Producers feeding the recency buffers.
//!
//! This module handles:
//! - Cycle Analyst V3 serial telemetry (tab-separated lines)
//! - GNSS receiver NMEA sentences
//! - Host system metrics from procfs/sysfs
//! - Simulated random-walk producers for running without hardware
//!
//! Every source yields at most one record per call and never blocks longer
//! than its read timeout. "No data right now" is `Ok(None)`, not an error.

use async_trait::async_trait;

use crate::record::Record;

pub mod cycle_analyst;
pub mod gnss;
pub mod serial;
pub mod simulated;
pub mod system;

pub use cycle_analyst::CycleAnalystSource;
pub use gnss::GnssSource;
pub use simulated::{SimulatedElectric, SimulatedGnss, SimulatedMotor, SimulatedSystem};
pub use system::SystemSource;

/// A producer of one record class
#[async_trait]
pub trait Source: Send {
    type Record: Record;

    /// Short name used in logs
    fn name(&self) -> &str;

    /// Produce the next record, or `None` if nothing new is available
    async fn read(&mut self) -> anyhow::Result<Option<Self::Record>>;
}
