//! Durable per-run CSV log
//!
//! Every ingested reading becomes one row with the fixed column order in
//! [`LOG_COLUMNS`]. The header is written once when the file is created.
//! Absent values are empty cells. Rows are buffered and pushed to stable
//! storage every `flush_every` rows, so a crash loses at most that many.
//!
//! A log file is never reopened: each run gets a new file, and a name
//! already taken by an earlier run gets a numeric suffix.

use crate::error::{DaqError, Result, ResultExt};
use crate::types::Reading;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Column order of the durable log
pub const LOG_COLUMNS: [&str; 11] = [
    "timestamp",
    "is_experiment",
    "time",
    "force_x",
    "force_z",
    "fixed_x",
    "fixed_z",
    "fx",
    "fz",
    "raw",
    "message",
];

/// Numbered names tried for runs sharing one start second
const MAX_NAME_SUFFIX: u32 = 1000;

/// File name of the log for a run started at `started_at`
pub fn log_file_name(started_at: &DateTime<Local>) -> String {
    numbered_log_file_name(started_at, 0)
}

/// `n`-th candidate name; 0 is the plain name, then `_1`, `_2`, ...
fn numbered_log_file_name(started_at: &DateTime<Local>, n: u32) -> String {
    let stamp = started_at.format("%Y%m%d_%H%M%S");
    if n == 0 {
        format!("experiment_{}.csv", stamp)
    } else {
        format!("experiment_{}_{}.csv", stamp, n)
    }
}

/// One row of the durable log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub is_experiment: bool,
    pub time: Option<f64>,
    pub force_x: Option<f64>,
    pub force_z: Option<f64>,
    pub fixed_x: Option<f64>,
    pub fixed_z: Option<f64>,
    pub fx: Option<f64>,
    pub fz: Option<f64>,
    pub raw: String,
    pub message: Option<String>,
}

impl LogRecord {
    /// Build a row from a reading ingested at `timestamp`
    pub fn from_reading(timestamp: DateTime<Local>, reading: &Reading) -> Self {
        Self {
            timestamp,
            is_experiment: reading.is_experiment,
            time: reading.time,
            force_x: reading.force_x,
            force_z: reading.force_z,
            fixed_x: reading.fixed_x,
            fixed_z: reading.fixed_z,
            fx: reading.fx,
            fz: reading.fz,
            raw: reading.raw.clone(),
            message: reading.message.clone(),
        }
    }
}

/// Byte sink behind a [`DurableLog`]
pub trait LogStorage: Write + Send {
    /// Push written bytes to stable storage
    fn sync(&self) -> io::Result<()>;
}

impl LogStorage for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append-only CSV writer for one run
pub struct DurableLog {
    writer: csv::Writer<Box<dyn LogStorage>>,
    path: PathBuf,
    flush_every: usize,
    rows_written: u64,
    rows_since_flush: usize,
}

impl std::fmt::Debug for DurableLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .field("pending_rows", &self.rows_since_flush)
            .finish()
    }
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))
}

impl DurableLog {
    /// Create a new log file and write the header
    ///
    /// Fails if `path` already exists.
    pub fn create(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let file =
            create_new(&path).with_context(|| format!("Failed to create run log {:?}", path))?;
        Self::with_storage(Box::new(file), path, flush_every)
    }

    /// Create the log for a run started at `started_at` in `directory`
    pub fn create_for_run(
        directory: &Path,
        started_at: &DateTime<Local>,
        flush_every: usize,
    ) -> Result<Self> {
        ensure_dir(directory)?;

        for n in 0..MAX_NAME_SUFFIX {
            let path = directory.join(numbered_log_file_name(started_at, n));
            match create_new(&path) {
                Ok(file) => return Self::with_storage(Box::new(file), path, flush_every),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(DaqError::Io(e)
                        .with_context(format!("Failed to create run log {:?}", path)))
                }
            }
        }
        Err(DaqError::InvalidState(format!(
            "no free run log name in {:?}",
            directory
        )))
    }

    /// Write a log to any storage; `path` is reported, not opened
    pub fn with_storage(
        storage: Box<dyn LogStorage>,
        path: impl Into<PathBuf>,
        flush_every: usize,
    ) -> Result<Self> {
        let path = path.into();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(storage);
        writer.write_record(LOG_COLUMNS)?;
        writer.flush()?;

        tracing::info!("Opened run log {:?}", path);
        Ok(Self {
            writer,
            path,
            flush_every: flush_every.max(1),
            rows_written: 0,
            rows_since_flush: 0,
        })
    }

    /// Append one row to the write buffer
    ///
    /// An error means the row was not recorded. Flushing is separate, see
    /// [`flush_if_due`](Self::flush_if_due).
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.rows_written += 1;
        self.rows_since_flush += 1;
        Ok(())
    }

    /// Flush when a full batch is waiting; returns whether it flushed
    ///
    /// On error the rows stay buffered and the next call tries again.
    pub fn flush_if_due(&mut self) -> Result<bool> {
        if self.rows_since_flush < self.flush_every {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Push buffered rows to stable storage
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync()?;
        self.rows_since_flush = 0;
        Ok(())
    }

    /// Flush and close the log, returning its path
    pub fn close(mut self) -> Result<PathBuf> {
        self.flush()?;
        tracing::info!(
            "Closed run log {:?} after {} rows",
            self.path,
            self.rows_written
        );
        Ok(self.path)
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Rows not yet flushed to disk
    pub fn pending_rows(&self) -> usize {
        self.rows_since_flush
    }
}

/// Read a durable log back into records
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<LogRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}


#[cfg(test)]
mod tests {
    use super::test_storage::SwitchableStorage;
    use super::*;
    use crate::backend::ProtocolParser;

    fn reading(line: &str) -> Reading {
        ProtocolParser::new().parse(line).unwrap()
    }

    #[test]
    fn test_file_name_from_start_time() {
        let started = chrono::TimeZone::with_ymd_and_hms(&Local, 2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(log_file_name(&started), "experiment_20240309_140507.csv");
        assert_eq!(
            numbered_log_file_name(&started, 2),
            "experiment_20240309_140507_2.csv"
        );
    }

    #[test]
    fn test_header_written_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("log.csv");
        let log = DurableLog::create(&path, 10).unwrap();
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "timestamp,is_experiment,time,force_x,force_z,fixed_x,fixed_z,fx,fz,raw,message"
        );
    }

    #[test]
    fn test_rows_round_trip_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = DurableLog::create(&path, 10).unwrap();

        let measurement = reading(">Time:1.5,Fx:2.0,Fz:3.0");
        let status = reading("Motor started, pump at 500 rpm");
        log.append(&LogRecord::from_reading(Local::now(), &measurement))
            .unwrap();
        log.append(&LogRecord::from_reading(Local::now(), &status))
            .unwrap();
        log.close().unwrap();

        let records = read_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_experiment);
        assert_eq!(records[0].fx, Some(2.0));
        assert_eq!(records[0].fixed_x, None);
        assert_eq!(records[0].message, None);
        // Commas inside text fields are quoted, not split
        assert_eq!(
            records[1].message.as_deref(),
            Some("Motor started, pump at 500 rpm")
        );
        assert_eq!(records[1].force_x, None);
    }

    #[test]
    fn test_flush_batching() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = DurableLog::create(dir.path().join("log.csv"), 3).unwrap();
        let record = LogRecord::from_reading(Local::now(), &reading("Time:1,Fixed_X:1"));

        for _ in 0..2 {
            log.append(&record).unwrap();
            assert!(!log.flush_if_due().unwrap());
        }
        assert_eq!(log.pending_rows(), 2);
        log.append(&record).unwrap();
        assert!(log.flush_if_due().unwrap());
        assert_eq!(log.pending_rows(), 0);
        assert_eq!(log.rows_written(), 3);
    }

    #[test]
    fn test_existing_file_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "earlier run\n").unwrap();

        assert!(DurableLog::create(&path, 1).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier run\n");
    }

    #[test]
    fn test_runs_in_same_second_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local::now();
        let record = LogRecord::from_reading(started, &reading("Time:1,Fixed_X:1"));

        let mut first = DurableLog::create_for_run(dir.path(), &started, 1).unwrap();
        first.append(&record).unwrap();
        let first_path = first.close().unwrap();

        let second = DurableLog::create_for_run(dir.path(), &started, 1).unwrap();
        let third = DurableLog::create_for_run(dir.path(), &started, 1).unwrap();
        assert_eq!(first_path.file_name().unwrap().to_string_lossy(), log_file_name(&started));
        assert_eq!(second.path(), dir.path().join(numbered_log_file_name(&started, 1)).as_path());
        assert_eq!(third.path(), dir.path().join(numbered_log_file_name(&started, 2)).as_path());

        assert_eq!(read_log(&first_path).unwrap().len(), 1);
    }

    #[test]
    fn test_flush_failure_keeps_row_counted() {
        let storage = SwitchableStorage::default();
        let mut log = DurableLog::with_storage(Box::new(storage.clone()), "memory.csv", 1).unwrap();
        let record = LogRecord::from_reading(Local::now(), &reading(">Time:1,Fixed_X:1"));

        log.append(&record).unwrap();
        log.flush_if_due().unwrap();

        storage.set_failing(true);
        log.append(&record).unwrap();
        assert!(log.flush_if_due().is_err());
        assert_eq!(log.rows_written(), 2);
        assert_eq!(log.pending_rows(), 1);

        // The buffered row reaches storage once it recovers
        storage.set_failing(false);
        assert!(log.flush_if_due().unwrap());
        assert_eq!(storage.contents().lines().count(), 3);
    }

    #[test]
    fn test_create_in_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // A regular file cannot be used as a directory
        assert!(DurableLog::create(blocker.join("log.csv"), 1).is_err());
        assert!(DurableLog::create_for_run(&blocker, &Local::now(), 1).is_err());
    }
}
