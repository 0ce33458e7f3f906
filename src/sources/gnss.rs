//! # GNSS Source
//!
//! Decodes position fixes from NMEA 0183 sentences.
//!
//! Only `GGA`, `RMC` and `GLL` carry data we keep. Status sentences (`GSA`,
//! `GSV`, `VTG`) are ignored. While the receiver has no fix the position
//! fields are empty and the sentence yields nothing.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;
use tracing::{debug, warn};

use super::serial::LineReader;
use super::Source;
use crate::record::{now_timestamp, GnssFix};

/// Knots to km/h
pub const KNOTS_TO_KMH: f64 = 1.852;

/// Default GNSS receiver serial speed
pub const GNSS_BAUD_RATE: u32 = 9600;

const GGA: &[&str] = &["GPGGA", "GNGGA"];
const RMC: &[&str] = &["GPRMC", "GNRMC"];
const GLL: &[&str] = &["GPGLL", "GNGLL"];
const IGNORED: &[&str] = &[
    "GNGSA", "GPGSA", "GPGSV", "GLGSV", "GBGSV", "GAGSV", "GQGSV", "GNVTG", "GPVTG",
];

/// Decode one NMEA sentence
///
/// Returns `None` for sentences without position data or without a fix.
pub fn parse_sentence(line: &str) -> Option<GnssFix> {
    // Drop the checksum, it is verified by the receiver link
    let body = line.trim().split('*').next().unwrap_or_default();
    let values: Vec<&str> = body.split(',').collect();
    let message_id = values.first()?.trim_start_matches('$');

    if GGA.contains(&message_id) {
        parse_gga(&values)
    } else if RMC.contains(&message_id) {
        parse_rmc(&values)
    } else if GLL.contains(&message_id) {
        parse_gll(&values)
    } else {
        if !IGNORED.contains(&message_id) {
            warn!("Unknown NMEA message {}", message_id);
        }
        None
    }
}

fn field<T: std::str::FromStr>(values: &[&str], index: usize) -> Option<T> {
    values.get(index)?.parse().ok()
}

fn parse_gga(values: &[&str]) -> Option<GnssFix> {
    let fix = GnssFix {
        timestamp: now_timestamp(),
        latitude: field(values, 2)?,
        longitude: field(values, 4)?,
        sat_num: field(values, 7),
        hdop: field(values, 8),
        altitude: field(values, 9),
        speed: None,
    };
    Some(fix)
}

fn parse_rmc(values: &[&str]) -> Option<GnssFix> {
    let mut fix = GnssFix::position(field(values, 3)?, field(values, 5)?);
    fix.speed = field::<f64>(values, 7).map(|knots| knots * KNOTS_TO_KMH);
    Some(fix)
}

fn parse_gll(values: &[&str]) -> Option<GnssFix> {
    Some(GnssFix::position(field(values, 1)?, field(values, 3)?))
}

/// GNSS fixes read from a receiver serial stream
#[derive(Debug)]
pub struct GnssSource<R> {
    lines: LineReader<R>,
}

impl<R: AsyncBufRead + Unpin + Send> GnssSource<R> {
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            lines: LineReader::new(reader, read_timeout),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Source for GnssSource<R> {
    type Record = GnssFix;

    fn name(&self) -> &str {
        "gnss"
    }

    async fn read(&mut self) -> anyhow::Result<Option<GnssFix>> {
        let Some(line) = self.lines.read_line().await? else {
            return Ok(None);
        };

        let fix = parse_sentence(&line);
        if fix.is_none() {
            debug!("No fix in NMEA line {:?}", line);
        }
        Ok(fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hemisphere_is_not_applied() {
        let fix = parse_sentence("$GPGLL,3352.12800,S,15112.56700,W,092725.00,A,A*6A").unwrap();

        assert_eq!(fix.latitude, 3352.128);
        assert_eq!(fix.longitude, 15112.567);
    }

    #[test]
    fn test_parse_gga() {
        let fix = parse_sentence(
            "$GNGGA,092725.00,4717.11399,N,00833.91590,E,1,08,1.01,499.6,M,48.0,M,,*5B",
        )
        .unwrap();

        assert_eq!(fix.latitude, 4717.11399);
        assert_eq!(fix.longitude, 833.9159);
        assert_eq!(fix.sat_num, Some(8));
        assert_eq!(fix.hdop, Some(1.01));
        assert_eq!(fix.altitude, Some(499.6));
        assert_eq!(fix.speed, None);
    }

    #[test]
    fn test_parse_rmc_converts_knots() {
        let fix = parse_sentence(
            "$GPRMC,083559.00,A,4717.11437,N,00833.91522,E,10.0,77.52,091202,,,A*57",
        )
        .unwrap();

        assert_eq!(fix.latitude, 4717.11437);
        assert!((fix.speed.unwrap() - 18.52).abs() < 1e-9);
    }

    #[test]
    fn test_parse_gll() {
        let fix = parse_sentence("$GNGLL,4717.11364,N,00833.91565,E,092321.00,A,A*60").unwrap();
        assert_eq!(fix.longitude, 833.91565);
    }

    #[test]
    fn test_no_fix_yields_nothing() {
        assert!(parse_sentence("$GNGGA,,,,,,0,00,99.99,,,,,,*56").is_none());
        assert!(parse_sentence("$GNRMC,,V,,,,,,,,,,N*4D").is_none());
    }

    #[test]
    fn test_status_and_unknown_sentences_ignored() {
        assert!(parse_sentence("$GNGSA,A,3,10,32,,,,,,,,,,,1.5,1.0,1.1*2E").is_none());
        assert!(parse_sentence("$GPTXT,01,01,02,ANTSTATUS=OK*3B").is_none());
        assert!(parse_sentence("").is_none());
    }

    #[tokio::test]
    async fn test_source_reads_fix() {
        let data: &[u8] = b"$GNGSA,A,3*2E\r\n$GNGLL,4717.11364,N,00833.91565,E,092321.00,A,A*60\r\n";
        let mut source = GnssSource::new(data, Duration::from_millis(100));

        assert!(source.read().await.unwrap().is_none());
        let fix = source.read().await.unwrap().unwrap();
        assert_eq!(fix.latitude, 4717.11364);
    }
}
