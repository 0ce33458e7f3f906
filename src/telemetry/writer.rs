//! # Log Writer
//!
//! Appends motor telemetry to the current log file and rotates files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use super::{log_header, LOG_EXTENSION, LOG_FIELDS};
use crate::error::Result;
use crate::record::MotorTelemetry;

/// Handle to the log file currently being written
///
/// Owns the open file, its record counter and the list of every file name
/// created by this writer during the process lifetime.
#[derive(Debug)]
pub struct LogWriter {
    directory: PathBuf,
    file: BufWriter<File>,
    file_name: String,
    started_at: DateTime<Local>,
    record_count: usize,
    max_records: usize,
    known_files: Vec<String>,
}

impl LogWriter {
    /// Create a new log file in `directory` and write its header
    ///
    /// # Arguments
    ///
    /// * `directory` - Existing directory receiving the log files
    /// * `max_records` - Record ceiling after which the next append rotates
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or the header written
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use greybike::telemetry::LogWriter;
    ///
    /// let writer = LogWriter::open("./logs", 36_000)?;
    /// println!("Logging to {}", writer.path().display());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open<P: AsRef<Path>>(directory: P, max_records: usize) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let (file, file_name, started_at) = create_log_file(&directory)?;

        Ok(Self {
            directory,
            file,
            file_name: file_name.clone(),
            started_at,
            record_count: 0,
            max_records: max_records.max(1),
            known_files: vec![file_name],
        })
    }

    /// Append one record as a CSV line
    ///
    /// Rotates first when the ceiling has been reached, so the record that
    /// crosses the ceiling is the first line of the new file.
    pub fn append(&mut self, record: &MotorTelemetry) -> Result<()> {
        if self.record_count >= self.max_records {
            info!(
                "Log file {} reached {} records, rotating",
                self.file_name, self.record_count
            );
            self.rotate()?;
        }

        let line = format_record(record);
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.record_count += 1;
        Ok(())
    }

    /// Close the current file and start a new one in the same directory
    pub fn rotate(&mut self) -> Result<()> {
        info!("Closing log file {}", self.file_name);
        self.file.flush()?;

        let (file, file_name, started_at) = create_log_file(&self.directory)?;
        self.file = file;
        self.file_name = file_name.clone();
        self.started_at = started_at;
        self.record_count = 0;
        self.known_files.push(file_name);
        Ok(())
    }

    /// Full path of the current file
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// When the current file was opened
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Records written to the current file
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Every file created by this writer, oldest first
    pub fn known_files(&self) -> &[String] {
        &self.known_files
    }
}

/// Serialize a record in [`LOG_FIELDS`] order, without trailing newline
pub fn format_record(record: &MotorTelemetry) -> String {
    let values: [String; 13] = [
        format!("{:.2}", record.timestamp),
        record.speed.to_string(),
        record.voltage.to_string(),
        record.current.to_string(),
        record.trip_distance.to_string(),
        record.amper_hours.to_string(),
        record.motor_temp.to_string(),
        record.pedal_rpm.to_string(),
        record.human_torque.to_string(),
        record.human_watts.to_string(),
        record.throttle_input.to_string(),
        record.throttle_output.to_string(),
        record.mode.to_string(),
    ];
    debug_assert_eq!(values.len(), LOG_FIELDS.len());
    values.join(",")
}

/// Sorted names of the `.log` files in `directory`
pub fn list_log_files<P: AsRef<Path>>(directory: P) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Create a fresh `{ISO-8601}.log` file and write the header
fn create_log_file(directory: &Path) -> Result<(BufWriter<File>, String, DateTime<Local>)> {
    let started_at = Local::now();
    let stem = started_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let (file, file_name) = create_log_file_named(directory, &stem)?;
    Ok((file, file_name, started_at))
}

/// Create `{stem}.log` and write the header
///
/// Never truncates: a name clash gets a numeric suffix, `{stem}-1.log` and so on.
fn create_log_file_named(directory: &Path, stem: &str) -> Result<(BufWriter<File>, String)> {
    let mut suffix = 0u32;
    loop {
        let file_name = if suffix == 0 {
            format!("{}.{}", stem, LOG_EXTENSION)
        } else {
            format!("{}-{}.{}", stem, suffix, LOG_EXTENSION)
        };
        let path = directory.join(&file_name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                info!("Logging telemetry to {}", path.display());
                let mut file = BufWriter::new(file);
                file.write_all(log_header().as_bytes())?;
                file.flush()?;
                return Ok((file, file_name));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Log file {} already exists, trying next name", file_name);
                suffix += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(timestamp: f64) -> MotorTelemetry {
        MotorTelemetry {
            timestamp,
            amper_hours: 1.25,
            voltage: 51.2,
            current: -3.5,
            speed: 24.5,
            trip_distance: 12.34,
            motor_temp: 41.0,
            pedal_rpm: 70.0,
            human_watts: 120.0,
            human_torque: 15.5,
            throttle_input: 1.1,
            throttle_output: 0.9,
            aux_a: 0.0,
            aux_d: 0.0,
            mode: 1,
            flags: "1B".to_string(),
            is_brake_pressed: true,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_open_writes_header() {
        let dir = TempDir::new().unwrap();
        let writer = LogWriter::open(dir.path(), 10).unwrap();

        assert!(writer.file_name().ends_with(".log"));
        assert_eq!(writer.record_count(), 0);
        assert_eq!(writer.known_files(), &[writer.file_name().to_string()]);

        let lines = read_lines(&writer.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "GREYBIKE LOG");
        assert_eq!(lines[1], "VERSION v1");
        assert!(lines[2].starts_with("FIELDS timestamp,speed,"));
    }

    #[test]
    fn test_append_formats_fields() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path(), 10).unwrap();

        writer.append(&sample_record(1721509472.156)).unwrap();
        assert_eq!(writer.record_count(), 1);

        let lines = read_lines(&writer.path());
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[3],
            "1721509472.16,24.5,51.2,-3.5,12.34,1.25,41,70,15.5,120,1.1,0.9,1"
        );
    }

    #[test]
    fn test_rotation_at_ceiling() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path(), 3).unwrap();
        let first_path = writer.path();

        for i in 0..3 {
            writer.append(&sample_record(100.0 + i as f64)).unwrap();
        }
        assert_eq!(writer.path(), first_path, "Ceiling is a soft cap");

        writer.append(&sample_record(103.0)).unwrap();
        assert_ne!(writer.path(), first_path);
        assert_eq!(writer.record_count(), 1);
        assert_eq!(writer.known_files().len(), 2);

        let old_lines = read_lines(&first_path);
        assert_eq!(old_lines.len(), 3 + 3, "Old file keeps header and exactly 3 records");
        assert!(old_lines[5].starts_with("102.00,"));

        let new_lines = read_lines(&writer.path());
        assert_eq!(new_lines.len(), 4);
        assert_eq!(new_lines[0], "GREYBIKE LOG");
        assert!(new_lines[3].starts_with("103.00,"));
    }

    #[test]
    fn test_explicit_rotate() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path(), 100).unwrap();
        writer.append(&sample_record(1.0)).unwrap();

        writer.rotate().unwrap();
        assert_eq!(writer.record_count(), 0);
        assert_eq!(writer.known_files().len(), 2);

        let listed = list_log_files(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);
        for name in writer.known_files() {
            assert!(listed.contains(name));
        }
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("app.log")).unwrap();
        fs::write(dir.path().join("2024-07-21T02:04:30.147284.log"), "").unwrap();

        let listed = list_log_files(dir.path()).unwrap();
        assert_eq!(listed, vec!["2024-07-21T02:04:30.147284.log".to_string()]);
    }

    #[test]
    fn test_existing_file_is_never_truncated() {
        let dir = TempDir::new().unwrap();
        let stem = "2024-07-21T02:04:30.147284";
        let taken = dir.path().join(format!("{}.log", stem));
        fs::write(&taken, "earlier ride\n").unwrap();

        let (_file, name) = create_log_file_named(dir.path(), stem).unwrap();
        assert_eq!(name, format!("{}-1.log", stem));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "earlier ride\n");

        let lines = read_lines(&dir.path().join(&name));
        assert_eq!(lines[0], "GREYBIKE LOG");

        let (_file, name) = create_log_file_named(dir.path(), stem).unwrap();
        assert_eq!(name, format!("{}-2.log", stem));
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = LogWriter::open(dir.path().join("missing"), 10);
        assert!(result.is_err());
    }
}
