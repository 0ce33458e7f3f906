//! # Log Aggregation
//!
//! Ride statistics over a time window of one log file.
//!
//! Energy is integrated per record as `watts / 3600 * duration`, where
//! `duration` is the time since the previous record inside the window. The
//! first record counts for [`DEFAULT_SAMPLE_DURATION`], and so does any record
//! following a gap longer than [`MAX_SAMPLE_GAP`] (missed samples, a restart
//! or a rotation boundary must not inflate the totals).

use std::path::Path;

use serde::Serialize;

use super::reader::{LogReader, LogRecord};
use crate::error::Result;

/// Duration assumed for a sample with no usable predecessor, in seconds
pub const DEFAULT_SAMPLE_DURATION: f64 = 0.1;

/// Longest interval between samples still integrated as-is, in seconds
pub const MAX_SAMPLE_GAP: f64 = 1.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Summary of one aggregation window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedLogData {
    pub total_records: usize,
    pub max_speed: f64,
    pub max_regen_watts: f64,
    pub max_motor_watts: f64,
    pub max_human_watts: f64,
    pub total_regen_watt_hours: f64,
    pub total_motor_watt_hours: f64,
    pub total_human_watt_hours: f64,
    /// Last minus first trip distance in the window. Can be negative if the
    /// trip counter was reset inside the window.
    pub total_distance: f64,
}

/// Aggregate the records of a log file within `[start, end]`
///
/// # Errors
///
/// Returns error if the file cannot be opened or its header is malformed.
/// Malformed data lines are skipped.
///
/// # Examples
///
/// ```no_run
/// use greybike::telemetry::aggregate;
///
/// let summary = aggregate("logs/2024-07-21T02:04:30.147284.log", 1721509472.0, 1721522829.0)?;
/// println!("Motor: {:.1} Wh, regen: {:.1} Wh", summary.total_motor_watt_hours, summary.total_regen_watt_hours);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn aggregate<P: AsRef<Path>>(path: P, start: f64, end: f64) -> Result<AggregatedLogData> {
    let reader = LogReader::open(path)?;
    Ok(aggregate_records(reader.records(), start, end))
}

/// Aggregate a stream of records within `[start, end]`
pub fn aggregate_records<I>(records: I, start: f64, end: f64) -> AggregatedLogData
where
    I: IntoIterator<Item = LogRecord>,
{
    let mut result = AggregatedLogData::default();
    let mut prev_timestamp: Option<f64> = None;
    let mut first_distance: Option<f64> = None;
    let mut last_distance: Option<f64> = None;
    let mut distance_samples = 0usize;

    for record in records {
        if !(start..=end).contains(&record.timestamp) {
            continue;
        }
        result.total_records += 1;

        let mut duration = match prev_timestamp {
            Some(prev) => record.timestamp - prev,
            None => DEFAULT_SAMPLE_DURATION,
        };
        if duration > MAX_SAMPLE_GAP {
            duration = DEFAULT_SAMPLE_DURATION;
        }
        prev_timestamp = Some(record.timestamp);

        if let (Some(current), Some(voltage)) = (record.current, record.voltage) {
            let watts = voltage * current;
            if current < 0.0 {
                let regen_watts = -watts;
                result.max_regen_watts = result.max_regen_watts.max(regen_watts);
                result.total_regen_watt_hours += regen_watts / SECONDS_PER_HOUR * duration;
            } else {
                result.max_motor_watts = result.max_motor_watts.max(watts);
                result.total_motor_watt_hours += watts / SECONDS_PER_HOUR * duration;
            }
        }

        if let Some(human_watts) = record.human_watts {
            result.max_human_watts = result.max_human_watts.max(human_watts);
            result.total_human_watt_hours += human_watts / SECONDS_PER_HOUR * duration;
        }

        if let Some(speed) = record.speed {
            result.max_speed = result.max_speed.max(speed);
        }

        if let Some(distance) = record.trip_distance {
            first_distance.get_or_insert(distance);
            last_distance = Some(distance);
            distance_samples += 1;
        }
    }

    result.total_distance = match (first_distance, last_distance) {
        (Some(first), Some(last)) if distance_samples >= 2 => last - first,
        _ => 0.0,
    };
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EPSILON: f64 = 1e-9;

    fn power_record(timestamp: f64, voltage: f64, current: f64) -> LogRecord {
        LogRecord {
            timestamp,
            voltage: Some(voltage),
            current: Some(current),
            ..Default::default()
        }
    }

    fn write_log(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_empty_window() {
        let records = vec![power_record(10.0, 40.0, 5.0)];
        let result = aggregate_records(records, 20.0, 30.0);
        assert_eq!(result, AggregatedLogData::default());
    }

    #[test]
    fn test_window_is_inclusive() {
        let records = vec![
            power_record(9.9, 40.0, 5.0),
            power_record(10.0, 40.0, 5.0),
            power_record(10.5, 40.0, 5.0),
            power_record(11.0, 40.0, 5.0),
            power_record(11.1, 40.0, 5.0),
        ];
        let result = aggregate_records(records, 10.0, 11.0);
        assert_eq!(result.total_records, 3);
    }

    #[test]
    fn test_nan_timestamp_outside_every_window() {
        let records = vec![
            power_record(100.0, 40.0, 5.0),
            power_record(f64::NAN, 40.0, 5.0),
            power_record(100.1, 40.0, 5.0),
        ];
        let result = aggregate_records(records, 100.0, 100.2);

        assert_eq!(result.total_records, 2);
        // 200 W for 0.1 s, twice
        assert!((result.total_motor_watt_hours - 2.0 * 200.0 / 3600.0 * 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_nan_row_in_log_is_dropped() {
        let file = write_log(
            "GREYBIKE LOG\nVERSION v1\nFIELDS timestamp,voltage,current\n100,40,5\nNaN,40,5\n100.1,40,5\n",
        );
        let result = aggregate(file.path(), 100.0, 100.2).unwrap();

        assert_eq!(result.total_records, 2);
        assert!(result.total_motor_watt_hours.is_finite());
        assert!(result.total_motor_watt_hours > 0.0);
    }

    #[test]
    fn test_first_record_uses_default_duration() {
        let result = aggregate_records(vec![power_record(100.0, 36.0, 10.0)], 0.0, 1000.0);
        // 360 W for 0.1 s
        assert!((result.total_motor_watt_hours - 0.01).abs() < EPSILON);
        assert_eq!(result.max_motor_watts, 360.0);
    }

    #[test]
    fn test_gap_duration_is_clamped() {
        let records = vec![power_record(100.0, 36.0, 10.0), power_record(105.0, 36.0, 10.0)];
        let result = aggregate_records(records, 0.0, 1000.0);

        // Both records count for 0.1 s, not 5 s
        assert!((result.total_motor_watt_hours - 0.02).abs() < EPSILON);
    }

    #[test]
    fn test_gap_of_exactly_one_second_is_kept() {
        let records = vec![power_record(100.0, 36.0, 10.0), power_record(101.0, 36.0, 10.0)];
        let result = aggregate_records(records, 0.0, 1000.0);

        // 0.1 s + 1 s at 360 W
        assert!((result.total_motor_watt_hours - 0.11).abs() < EPSILON);
    }

    #[test]
    fn test_regen_is_separate_from_motor() {
        let result = aggregate_records(vec![power_record(100.0, 40.0, -3.0)], 0.0, 1000.0);

        assert_eq!(result.total_motor_watt_hours, 0.0);
        assert_eq!(result.max_motor_watts, 0.0);
        assert_eq!(result.max_regen_watts, 120.0);
        assert!((result.total_regen_watt_hours - 120.0 / 3600.0 * 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_power_needs_both_current_and_voltage() {
        let record = LogRecord {
            timestamp: 1.0,
            current: Some(10.0),
            ..Default::default()
        };
        let result = aggregate_records(vec![record], 0.0, 10.0);
        assert_eq!(result.total_records, 1);
        assert_eq!(result.total_motor_watt_hours, 0.0);
    }

    #[test]
    fn test_distance_is_last_minus_first() {
        let distances = [5.0, 9.0, 7.0];
        let records = distances.iter().enumerate().map(|(i, &d)| LogRecord {
            timestamp: i as f64 * 0.1,
            trip_distance: Some(d),
            ..Default::default()
        });
        let result = aggregate_records(records, 0.0, 10.0);

        // Not max - min (4.0)
        assert!((result.total_distance - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_distance_reset_gives_negative_total() {
        let records = vec![
            LogRecord { timestamp: 1.0, trip_distance: Some(12.0), ..Default::default() },
            LogRecord { timestamp: 1.1, trip_distance: Some(0.5), ..Default::default() },
        ];
        let result = aggregate_records(records, 0.0, 10.0);
        assert!((result.total_distance + 11.5).abs() < EPSILON);
    }

    #[test]
    fn test_single_distance_sample_is_zero() {
        let records = vec![LogRecord { timestamp: 1.0, trip_distance: Some(12.0), ..Default::default() }];
        assert_eq!(aggregate_records(records, 0.0, 10.0).total_distance, 0.0);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let file = write_log(
            "GREYBIKE LOG\nVERSION v1\nFIELDS timestamp,voltage,current,trip_distance,human_watts,speed\n\
             100,40,5,0,50,10\n\
             100.1,40,-3,0.01,0,12\n\
             100.2,40,2,0.02,10,8\n",
        );

        let result = aggregate(file.path(), 100.0, 100.2).unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(result.max_speed, 12.0);
        assert!((result.total_distance - 0.02).abs() < EPSILON);
        assert!(result.total_motor_watt_hours > 0.0);
        assert!(result.total_regen_watt_hours > 0.0);
        assert!(result.total_human_watt_hours > 0.0);
        assert_eq!(result.max_motor_watts, 200.0);
        assert_eq!(result.max_regen_watts, 120.0);
        assert_eq!(result.max_human_watts, 50.0);
    }

    #[test]
    fn test_malformed_header_fails_only_this_call() {
        let bad = write_log("NOT A LOG\nVERSION v1\nFIELDS timestamp\n1.0\n");
        let good = write_log("GREYBIKE LOG\nVERSION v1\nFIELDS timestamp\n1.0\n");

        assert!(matches!(
            aggregate(bad.path(), 0.0, 10.0),
            Err(TelemetryError::MalformedLog(_))
        ));
        assert_eq!(aggregate(good.path(), 0.0, 10.0).unwrap().total_records, 1);
    }
}
