//! # Greybike Library
//!
//! Telemetry buffering, periodic scheduling and log aggregation for an
//! e-bike data logger.
//!
//! Sensor sources push readings into per-class [`buffer::RecencyBuffer`]s.
//! Periodic jobs run by the [`scheduler::Scheduler`] append the freshest
//! motor telemetry to a [`telemetry::LogWriter`] and fan readings out through
//! the [`broadcast::BroadcastHub`]. Recorded logs are summarized with
//! [`telemetry::aggregate`].

pub mod app;
pub mod broadcast;
pub mod buffer;
pub mod config;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod sources;
pub mod telemetry;
