//! # System Metrics Source
//!
//! CPU load, memory usage and SoC temperature of the host (Linux only).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use super::Source;
use crate::record::SystemReading;

/// Cumulative CPU counters from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let counters: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if counters.len() < 4 {
        return None;
    }

    // idle + iowait
    let idle = counters[3] + counters.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: counters.iter().sum(),
    })
}

/// CPU usage percentage between two samples
pub fn cpu_usage(previous: Option<CpuTimes>, current: CpuTimes) -> f64 {
    let (idle, total) = match previous {
        Some(prev) => (
            current.idle.saturating_sub(prev.idle),
            current.total.saturating_sub(prev.total),
        ),
        None => (current.idle, current.total),
    };
    if total == 0 {
        return 0.0;
    }
    100.0 * (1.0 - idle as f64 / total as f64)
}

/// Memory usage percentage from `/proc/meminfo`
pub fn parse_memory_usage(meminfo: &str) -> Option<f64> {
    let value = |key: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(key))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    let total = value("MemTotal:")?;
    let available = value("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(100.0 * (1.0 - available / total))
}

/// Temperature in Celsius from a sysfs thermal zone (millidegrees)
pub fn parse_thermal_zone(contents: &str) -> Option<f64> {
    contents.trim().parse::<f64>().ok().map(|milli| milli / 1000.0)
}

/// Host metrics read from procfs and sysfs
#[derive(Debug)]
pub struct SystemSource {
    proc_root: PathBuf,
    thermal_zone: PathBuf,
    previous_cpu: Option<CpuTimes>,
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new("/proc", "/sys/class/thermal/thermal_zone0/temp")
    }
}

impl SystemSource {
    pub fn new<P: AsRef<Path>, T: AsRef<Path>>(proc_root: P, thermal_zone: T) -> Self {
        Self {
            proc_root: proc_root.as_ref().to_path_buf(),
            thermal_zone: thermal_zone.as_ref().to_path_buf(),
            previous_cpu: None,
        }
    }
}

#[async_trait]
impl Source for SystemSource {
    type Record = SystemReading;

    fn name(&self) -> &str {
        "system"
    }

    async fn read(&mut self) -> anyhow::Result<Option<SystemReading>> {
        let stat = fs::read_to_string(self.proc_root.join("stat")).context("reading stat")?;
        let cpu = parse_cpu_times(&stat).context("unexpected stat format")?;
        let usage = cpu_usage(self.previous_cpu, cpu);
        self.previous_cpu = Some(cpu);

        let meminfo = fs::read_to_string(self.proc_root.join("meminfo")).context("reading meminfo")?;
        let memory = parse_memory_usage(&meminfo).context("unexpected meminfo format")?;

        // Not every board exposes a thermal zone
        let cpu_temp = match fs::read_to_string(&self.thermal_zone) {
            Ok(contents) => parse_thermal_zone(&contents),
            Err(e) => {
                debug!("No CPU temperature: {}", e);
                None
            }
        };

        Ok(Some(SystemReading::new(cpu_temp, memory, usage)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\n";
    const MEMINFO: &str = "MemTotal:        1000000 kB\nMemFree:          200000 kB\nMemAvailable:     250000 kB\n";

    #[test]
    fn test_parse_cpu_times() {
        let times = parse_cpu_times(STAT).unwrap();
        assert_eq!(times, CpuTimes { idle: 800, total: 1000 });
        assert!(parse_cpu_times("intr 1 2 3").is_none());
    }

    #[test]
    fn test_cpu_usage_between_samples() {
        let first = CpuTimes { idle: 800, total: 1000 };
        assert!((cpu_usage(None, first) - 20.0).abs() < 1e-9);

        let second = CpuTimes { idle: 850, total: 1100 };
        assert!((cpu_usage(Some(first), second) - 50.0).abs() < 1e-9);
        assert_eq!(cpu_usage(Some(first), first), 0.0);
    }

    #[test]
    fn test_memory_and_temperature() {
        assert!((parse_memory_usage(MEMINFO).unwrap() - 75.0).abs() < 1e-9);
        assert!(parse_memory_usage("MemTotal: 100 kB\n").is_none());
        assert_eq!(parse_thermal_zone("48312\n"), Some(48.312));
    }

    #[tokio::test]
    async fn test_source_reads_fake_procfs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stat"), STAT).unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();

        let mut source = SystemSource::new(dir.path(), dir.path().join("no_thermal_zone"));
        let reading = source.read().await.unwrap().unwrap();

        assert!((reading.cpu_usage - 20.0).abs() < 1e-9);
        assert!((reading.memory_usage - 75.0).abs() < 1e-9);
        assert_eq!(reading.cpu_temp, None);
    }

    #[tokio::test]
    async fn test_missing_procfs_is_error() {
        let dir = TempDir::new().unwrap();
        let mut source = SystemSource::new(dir.path(), dir.path().join("temp"));
        assert!(source.read().await.is_err());
    }
}
