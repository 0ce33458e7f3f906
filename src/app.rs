//! # Application State and Jobs
//!
//! The shared state handed to every scheduled job, and the jobs themselves:
//!
//! - one producer job per source, pushing into that class's buffer
//! - a log job appending the freshest Cycle Analyst record to the log file
//! - one broadcast job per class, sending the freshest record to subscribers
//!
//! Locks are taken for a single statement and never held across `.await`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::io::BufReader;
use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastHub;
use crate::buffer::RecencyBuffer;
use crate::config::Config;
use crate::error::{Result, TelemetryError};
use crate::record::{ElectricalReading, GnssFix, MessageType, MotorTelemetry, Record, SystemReading};
use crate::scheduler::Scheduler;
use crate::sources::{
    serial, CycleAnalystSource, GnssSource, SimulatedElectric, SimulatedGnss, SimulatedMotor,
    SimulatedSystem, Source, SystemSource,
};
use crate::telemetry::{self, AggregatedLogData, LogWriter};

/// Lock a mutex, recovering the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide state shared by all jobs
#[derive(Debug)]
pub struct AppState {
    pub ca_records: Mutex<RecencyBuffer<MotorTelemetry>>,
    pub gnss_records: Mutex<RecencyBuffer<GnssFix>>,
    pub electric_records: Mutex<RecencyBuffer<ElectricalReading>>,
    pub system_records: Mutex<RecencyBuffer<SystemReading>>,
    pub log: Mutex<LogWriter>,
    pub hub: BroadcastHub,
    log_dir: PathBuf,
}

impl AppState {
    /// Create buffers and hub, and open the first log file
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let log_dir = PathBuf::from(&config.log.log_dir);
        let log = LogWriter::open(&log_dir, config.log.max_records_per_file)?;

        Ok(Self {
            ca_records: Mutex::new(RecencyBuffer::new(config.buffers.ca)),
            gnss_records: Mutex::new(RecencyBuffer::new(config.buffers.gnss)),
            electric_records: Mutex::new(RecencyBuffer::new(config.buffers.electric)),
            system_records: Mutex::new(RecencyBuffer::new(config.buffers.system)),
            log: Mutex::new(log),
            hub: BroadcastHub::new(config.broadcast.max_subscribers),
            log_dir,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start a new log file on demand and notify subscribers
    pub fn rotate_log(&self) -> Result<String> {
        let file_name = {
            let mut log = lock(&self.log);
            log.rotate()?;
            log.file_name().to_string()
        };
        self.hub.broadcast(MessageType::Event, json!({ "log_rotated": file_name }));
        Ok(file_name)
    }

    /// Log files created by this process, oldest first
    pub fn known_log_files(&self) -> Vec<String> {
        lock(&self.log).known_files().to_vec()
    }

    /// Aggregate a log file from the log directory
    ///
    /// # Errors
    ///
    /// Returns error if `file_name` is not a plain file name, the file cannot
    /// be read or its header is malformed
    pub fn aggregate_log(&self, file_name: &str, start: f64, end: f64) -> Result<AggregatedLogData> {
        let is_plain = Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
        if !is_plain {
            return Err(TelemetryError::InvalidLogName(file_name.to_string()));
        }
        telemetry::aggregate(self.log_dir.join(file_name), start, end)
    }
}

/// Record classes that have a buffer in [`AppState`]
pub trait BufferedRecord: Record {
    fn buffer(state: &AppState) -> &Mutex<RecencyBuffer<Self>>;
}

impl BufferedRecord for MotorTelemetry {
    fn buffer(state: &AppState) -> &Mutex<RecencyBuffer<Self>> {
        &state.ca_records
    }
}

impl BufferedRecord for GnssFix {
    fn buffer(state: &AppState) -> &Mutex<RecencyBuffer<Self>> {
        &state.gnss_records
    }
}

impl BufferedRecord for ElectricalReading {
    fn buffer(state: &AppState) -> &Mutex<RecencyBuffer<Self>> {
        &state.electric_records
    }
}

impl BufferedRecord for SystemReading {
    fn buffer(state: &AppState) -> &Mutex<RecencyBuffer<Self>> {
        &state.system_records
    }
}

/// Latest record of a class, if fresh for `window`
pub fn latest_fresh<T: BufferedRecord>(state: &AppState, window: Duration) -> Option<T> {
    lock(T::buffer(state)).latest(Some(window)).cloned()
}

/// Boxed producer of one record class
pub type BoxedSource<T> = Box<dyn Source<Record = T>>;

/// The producers available to this process
#[derive(Default)]
pub struct Sources {
    pub ca: Option<BoxedSource<MotorTelemetry>>,
    pub gnss: Option<BoxedSource<GnssFix>>,
    pub electric: Option<BoxedSource<ElectricalReading>>,
    pub system: Option<BoxedSource<SystemReading>>,
}

impl Sources {
    /// Random-walk producers for every class
    pub fn simulated() -> Self {
        Self {
            ca: Some(Box::new(SimulatedMotor::new())),
            gnss: Some(Box::new(SimulatedGnss::new())),
            electric: Some(Box::new(SimulatedElectric::new())),
            system: Some(Box::new(SimulatedSystem::new())),
        }
    }

    /// Build producers from configuration
    ///
    /// A serial port that cannot be opened is logged and its source left out;
    /// the remaining sources still run.
    pub fn from_config(config: &Config) -> Self {
        if config.sources.simulate {
            info!("Using simulated sources");
            return Self::simulated();
        }

        let mut sources = Self {
            system: Some(Box::new(SystemSource::default())),
            ..Self::default()
        };

        if let Some(port) = &config.sources.ca_port {
            match serial::open_port(port, config.sources.ca_baud_rate) {
                Ok(stream) => {
                    sources.ca = Some(Box::new(CycleAnalystSource::new(
                        BufReader::new(stream),
                        config.sources.ca_interval(),
                    )));
                }
                Err(e) => error!("Cycle Analyst unavailable: {}", e),
            }
        } else {
            warn!("No Cycle Analyst port configured");
        }

        if let Some(port) = &config.sources.gnss_port {
            match serial::open_port(port, config.sources.gnss_baud_rate) {
                Ok(stream) => {
                    sources.gnss = Some(Box::new(GnssSource::new(
                        BufReader::new(stream),
                        config.sources.gnss_interval(),
                    )));
                }
                Err(e) => error!("GNSS receiver unavailable: {}", e),
            }
        } else {
            warn!("No GNSS port configured");
        }

        // The battery sensor is an I2C device without a driver in this crate
        info!("No electrical sensor source outside simulation");

        sources
    }
}

/// Schedule a job reading `source` into its buffer every `interval`
pub fn schedule_source<T: BufferedRecord>(
    scheduler: &mut Scheduler,
    state: Arc<AppState>,
    source: BoxedSource<T>,
    interval: Duration,
) {
    let name = format!("read_{}", source.name());
    let source = Arc::new(tokio::sync::Mutex::new(source));

    scheduler.schedule(&name, interval, move || {
        let source = source.clone();
        let state = state.clone();
        async move {
            let mut source = source.lock().await;
            let record = match tokio::time::timeout(interval, source.read()).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!("{} produced nothing within {:?}", source.name(), interval);
                    None
                }
            };
            if let Some(record) = record {
                lock(T::buffer(&state)).push(record);
            }
            Ok(())
        }
    });
}

/// Schedule the job appending the freshest Cycle Analyst record to the log
///
/// A record already written is not written again.
pub fn schedule_log_writer(
    scheduler: &mut Scheduler,
    state: Arc<AppState>,
    interval: Duration,
    freshness: Duration,
) {
    let last_logged: Arc<Mutex<Option<f64>>> = Arc::new(Mutex::new(None));

    scheduler.schedule("write_log", interval, move || {
        let state = state.clone();
        let last_logged = last_logged.clone();
        async move {
            let Some(record) = latest_fresh::<MotorTelemetry>(&state, freshness) else {
                return Ok(());
            };

            let mut last = lock(&last_logged);
            if matches!(*last, Some(ts) if ts >= record.timestamp) {
                return Ok(());
            }
            lock(&state.log).append(&record)?;
            *last = Some(record.timestamp);
            Ok(())
        }
    });
}

/// Schedule a job broadcasting the freshest record of a class
pub fn schedule_broadcast<T: BufferedRecord>(
    scheduler: &mut Scheduler,
    state: Arc<AppState>,
    interval: Duration,
    freshness: Duration,
) {
    let name = format!("broadcast_{}", T::MESSAGE_TYPE);

    scheduler.schedule(&name, interval, move || {
        let state = state.clone();
        async move {
            if state.hub.is_empty() {
                return Ok(());
            }
            if let Some(record) = latest_fresh::<T>(&state, freshness) {
                state.hub.broadcast_record(&record);
            }
            Ok(())
        }
    });
}

/// Register every producer, log and broadcast job
///
/// The freshness window of a class is its producer interval, so a record
/// stays current for two read cycles.
pub fn register_jobs(scheduler: &mut Scheduler, state: Arc<AppState>, config: &Config, sources: Sources) {
    let src = &config.sources;
    let bc = &config.broadcast;
    let ms = Duration::from_millis;

    if let Some(source) = sources.ca {
        schedule_source(scheduler, state.clone(), source, src.ca_interval());
    }
    if let Some(source) = sources.gnss {
        schedule_source(scheduler, state.clone(), source, src.gnss_interval());
    }
    if let Some(source) = sources.electric {
        schedule_source(scheduler, state.clone(), source, src.electric_interval());
    }
    if let Some(source) = sources.system {
        schedule_source(scheduler, state.clone(), source, src.system_interval());
    }

    schedule_log_writer(scheduler, state.clone(), ms(config.log.write_interval_ms), src.ca_interval());

    schedule_broadcast::<MotorTelemetry>(scheduler, state.clone(), ms(bc.ca_interval_ms), src.ca_interval());
    schedule_broadcast::<GnssFix>(scheduler, state.clone(), ms(bc.gnss_interval_ms), src.gnss_interval());
    schedule_broadcast::<ElectricalReading>(
        scheduler,
        state.clone(),
        ms(bc.electric_interval_ms),
        src.electric_interval(),
    );
    schedule_broadcast::<SystemReading>(scheduler, state, ms(bc.system_interval_ms), src.system_interval());
}
