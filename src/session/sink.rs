//! Experiment-run data sink
//!
//! [`DataSink`] owns one experiment run at a time and both of its outputs:
//! the bounded [`LiveBuffer`] used for plotting and the full-resolution
//! [`DurableLog`] on disk. Readings are ingested in decode order from the
//! reader callback; a failed durable write is logged and counted but never
//! interrupts acquisition.

use super::durable_log::{DurableLog, LogRecord};
use super::live_buffer::{LiveBuffer, LiveSnapshot, SnapshotHandle};
use crate::config::DataSettings;
use crate::error::{DaqError, Result, ResultExt};
use crate::types::{LivePoint, Reading, RunState, RunStatistics};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Sink shared between the reader callback and the controlling thread
pub type SharedSink = Arc<Mutex<DataSink>>;

/// Sink construction parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Directory receiving one log per run
    pub save_directory: PathBuf,
    /// Live buffer capacity
    pub live_capacity: usize,
    /// Durable rows between flushes
    pub flush_every_rows: usize,
}

impl From<&DataSettings> for SinkConfig {
    fn from(settings: &DataSettings) -> Self {
        Self {
            save_directory: settings.save_directory.clone(),
            live_capacity: settings.live_buffer_capacity,
            flush_every_rows: settings.flush_every_rows,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::from(&DataSettings::default())
    }
}

/// Identity of the current (or last) run
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    /// Wall-clock start of the run
    pub started_at: DateTime<Local>,
    /// Path of the run's durable log
    pub log_path: PathBuf,
}

/// Counters for the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Readings accepted while running
    pub readings_ingested: u64,
    /// Measurements pushed into the live buffer
    pub measurements: u64,
    /// Rows appended to the durable log
    pub rows_written: u64,
    /// Rows the durable log rejected
    pub write_failures: u64,
    /// Batch flushes that failed; their rows stay buffered for the next one
    pub flush_failures: u64,
}

/// Routes readings to the live buffer and the durable log
#[derive(Debug)]
pub struct DataSink {
    config: SinkConfig,
    state: RunState,
    run: Option<RunInfo>,
    log: Option<DurableLog>,
    live: LiveBuffer,
    max_time_seen: Option<f64>,
    stats: SinkStats,
}

impl Default for DataSink {
    fn default() -> Self {
        Self::new(SinkConfig::default())
    }
}

impl DataSink {
    /// Create an idle sink
    pub fn new(config: SinkConfig) -> Self {
        let live = LiveBuffer::new(config.live_capacity);
        Self {
            config,
            state: RunState::Idle,
            run: None,
            log: None,
            live,
            max_time_seen: None,
            stats: SinkStats::default(),
        }
    }

    /// Create an idle sink from data settings
    pub fn from_settings(settings: &DataSettings) -> Self {
        Self::new(SinkConfig::from(settings))
    }

    /// Wrap in a [`SharedSink`]
    pub fn into_shared(self) -> SharedSink {
        Arc::new(Mutex::new(self))
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Check if a run is collecting data
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Current or last run, `None` after `clear()`
    pub fn run_info(&self) -> Option<&RunInfo> {
        self.run.as_ref()
    }

    /// Start time of the current or last run
    pub fn run_started_at(&self) -> Option<DateTime<Local>> {
        self.run.as_ref().map(|r| r.started_at)
    }

    /// Counters for the current run
    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Sink configuration
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Start a new run and open its durable log
    ///
    /// Fails if a run is already in progress or the log cannot be created;
    /// the sink stays idle in both cases.
    pub fn start_run(&mut self) -> Result<PathBuf> {
        self.ensure_idle()?;

        let started_at = Local::now();
        let log = DurableLog::create_for_run(
            &self.config.save_directory,
            &started_at,
            self.config.flush_every_rows,
        )?;
        Ok(self.begin_run(started_at, log))
    }

    /// Start a new run writing to an already opened log
    pub fn start_run_with_log(&mut self, log: DurableLog) -> Result<PathBuf> {
        self.ensure_idle()?;
        Ok(self.begin_run(Local::now(), log))
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_running() {
            return Err(DaqError::InvalidState(
                "an experiment run is already in progress".to_string(),
            ));
        }
        Ok(())
    }

    fn begin_run(&mut self, started_at: DateTime<Local>, log: DurableLog) -> PathBuf {
        let log_path = log.path().to_path_buf();
        self.live.clear();
        self.max_time_seen = None;
        self.stats = SinkStats::default();
        self.log = Some(log);
        self.run = Some(RunInfo {
            started_at,
            log_path: log_path.clone(),
        });
        self.state = RunState::Running;

        tracing::info!("Experiment run started, logging to {:?}", log_path);
        log_path
    }

    /// Route one reading; ignored unless a run is in progress
    pub fn ingest(&mut self, reading: &Reading) {
        if !self.is_running() {
            return;
        }
        let timestamp = Local::now();
        self.stats.readings_ingested += 1;

        if let Some(log) = self.log.as_mut() {
            match log.append(&LogRecord::from_reading(timestamp, reading)) {
                Ok(()) => {
                    self.stats.rows_written += 1;
                    if let Err(e) = log.flush_if_due() {
                        self.stats.flush_failures += 1;
                        tracing::warn!("Durable log flush failed, rows kept buffered: {}", e);
                    }
                }
                Err(e) => {
                    self.stats.write_failures += 1;
                    tracing::warn!("Durable log write failed, row skipped: {}", e);
                }
            }
        }

        if reading.is_measurement() {
            self.stats.measurements += 1;
            if let Some(t) = reading.time {
                self.max_time_seen = Some(self.max_time_seen.map_or(t, |m| m.max(t)));
            }
            self.live.push(LivePoint::from_reading(reading, timestamp));
        }
    }

    /// Stop the run and close its log, returning the log path
    ///
    /// Returns `None` when no run was in progress.
    pub fn stop_run(&mut self) -> Option<PathBuf> {
        if !self.is_running() {
            return None;
        }
        self.state = RunState::Idle;

        let path = self.log.take().map(|log| {
            let path = log.path().to_path_buf();
            if let Err(e) = log.close() {
                tracing::warn!("Failed to flush run log {:?}: {}", path, e);
            }
            path
        });

        tracing::info!(
            "Experiment run stopped: {} readings, {} measurements, {} write failures, {} flush failures",
            self.stats.readings_ingested,
            self.stats.measurements,
            self.stats.write_failures,
            self.stats.flush_failures
        );
        path
    }

    /// Run progress in percent, from the largest device time seen
    pub fn progress(&self, total_duration: f64) -> f64 {
        if !self.is_running() || total_duration <= 0.0 || total_duration.is_nan() {
            return 0.0;
        }
        match self.max_time_seen {
            Some(t) if self.stats.measurements > 0 => (100.0 * t / total_duration).clamp(0.0, 100.0),
            _ => 0.0,
        }
    }

    /// Statistics over the live buffer
    pub fn statistics(&self) -> RunStatistics {
        RunStatistics::from_points(self.live.iter())
    }

    /// Force-stop any run and return to a fresh idle state
    pub fn clear(&mut self) {
        self.stop_run();
        self.live.clear();
        self.run = None;
        self.max_time_seen = None;
        self.stats = SinkStats::default();
    }

    /// Latest live snapshot
    pub fn snapshot(&self) -> LiveSnapshot {
        self.live.snapshot()
    }

    /// Handle for reading snapshots without locking the sink
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.live.snapshot_handle()
    }

    /// Default location of the summary report for the current run
    pub fn default_report_path(&self) -> PathBuf {
        let stamp = self.run_started_at().unwrap_or_else(Local::now);
        self.config.save_directory.join(format!(
            "experiment_summary_{}.txt",
            stamp.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Write a plain-text summary of the run and its statistics
    pub fn write_summary_report(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {:?}", parent))?;
        }

        let report = self.summary_report();
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create summary report {:?}", path))?;
        file.write_all(report.as_bytes())?;

        tracing::info!("Summary report written to {:?}", path);
        Ok(path.to_path_buf())
    }

    fn summary_report(&self) -> String {
        let mut out = String::new();
        out.push_str("Tribology Experiment Summary Report\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");

        match &self.run {
            Some(run) => {
                out.push_str(&format!(
                    "Experiment Start Time: {}\n",
                    run.started_at.format("%Y-%m-%d %H:%M:%S")
                ));
                out.push_str(&format!("Log File: {}\n", run.log_path.display()));
            }
            None => out.push_str("Experiment Start Time: N/A\n"),
        }
        out.push_str(&format!(
            "Report Generated: {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        out.push_str("Statistics:\n");
        out.push_str(&"-".repeat(20));
        out.push('\n');

        let stats = self.statistics();
        if stats.is_empty() {
            out.push_str("No data collected\n");
        }
        for (key, value) in stats.as_map() {
            if key == "data_points" {
                out.push_str(&format!("{}: {}\n", key, value as u64));
            } else {
                out.push_str(&format!("{}: {:.3}\n", key, value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProtocolParser;
    use crate::session::durable_log::test_storage::SwitchableStorage;
    use crate::session::read_log;

    fn sink_in(dir: &Path, capacity: usize) -> DataSink {
        DataSink::new(SinkConfig {
            save_directory: dir.to_path_buf(),
            live_capacity: capacity,
            flush_every_rows: 4,
        })
    }

    fn measurement(time: f64, fx: f64, fz: f64) -> Reading {
        ProtocolParser::new()
            .parse(&format!(">Time:{},Fixed_X:{},Fixed_Z:{}", time, fx, fz))
            .unwrap()
    }

    #[test]
    fn test_ingest_ignored_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 8);
        sink.ingest(&measurement(1.0, 1.0, 1.0));

        assert!(sink.snapshot().is_empty());
        assert_eq!(sink.stats().readings_ingested, 0);
    }

    #[test]
    fn test_live_buffer_evicts_while_log_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 5);
        let path = sink.start_run().unwrap();

        for i in 0..12 {
            sink.ingest(&measurement(i as f64, i as f64 * 10.0, -(i as f64)));
        }
        assert_eq!(sink.stop_run(), Some(path.clone()));

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 5);
        let times: Vec<_> = snapshot.iter().map(|p| p.time.unwrap()).collect();
        assert_eq!(times, vec![7.0, 8.0, 9.0, 10.0, 11.0]);

        let rows = read_log(&path).unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].time, Some(0.0));
        assert_eq!(rows[11].force_x, Some(110.0));
    }

    #[test]
    fn test_status_lines_logged_but_not_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 5);
        let path = sink.start_run().unwrap();

        let status = ProtocolParser::new().parse("Experiment started").unwrap();
        sink.ingest(&status);
        sink.ingest(&measurement(1.0, 2.0, 3.0));
        sink.stop_run();

        assert_eq!(sink.snapshot().len(), 1);
        let rows = read_log(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message.as_deref(), Some("Experiment started"));
    }

    #[test]
    fn test_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 100);
        assert_eq!(sink.progress(100.0), 0.0);

        sink.start_run().unwrap();
        assert_eq!(sink.progress(100.0), 0.0);

        let mut last = 0.0;
        for t in [10.0, 25.0, 50.0, 150.0] {
            sink.ingest(&measurement(t, 0.0, 0.0));
            let p = sink.progress(100.0);
            assert!(p >= last);
            assert!(p <= 100.0);
            assert_eq!(sink.progress(0.0), 0.0);
            assert_eq!(sink.progress(-5.0), 0.0);
            last = p;
        }
        assert_eq!(last, 100.0);

        // An older time does not move progress backwards
        sink.ingest(&measurement(5.0, 0.0, 0.0));
        assert_eq!(sink.progress(200.0), 75.0);

        sink.stop_run();
        assert_eq!(sink.progress(100.0), 0.0);
    }

    #[test]
    fn test_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 100);
        sink.start_run().unwrap();
        sink.ingest(&measurement(1.0, 1.0, 10.0));
        sink.ingest(&measurement(2.0, 3.0, 20.0));
        sink.ingest(&ProtocolParser::new().parse(">Time:3,Fixed_Z:30").unwrap());

        let stats = sink.statistics();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.duration, Some(3.0));
        let fx = stats.force_x.unwrap();
        assert_eq!(fx.mean, 2.0);
        assert_eq!(fx.min, 1.0);
        assert_eq!(fx.max, 3.0);
        assert!((fx.std_dev - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(stats.force_z.unwrap().mean, 20.0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 10);
        let handle = sink.snapshot_handle();
        sink.start_run().unwrap();
        sink.ingest(&measurement(1.0, 1.0, 1.0));

        sink.clear();
        assert_eq!(sink.state(), RunState::Idle);
        assert!(sink.run_info().is_none());
        assert!(sink.statistics().is_empty());
        assert!(sink.statistics().as_map().is_empty());
        assert!(handle.load().is_empty());
        assert_eq!(sink.stats(), SinkStats::default());
    }

    #[test]
    fn test_run_identity_survives_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 10);
        let path = sink.start_run().unwrap();
        sink.stop_run();

        assert_eq!(sink.run_info().map(|r| r.log_path.clone()), Some(path));
        assert!(sink.stop_run().is_none());
    }

    #[test]
    fn test_back_to_back_runs_keep_separate_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 10);

        let first = sink.start_run().unwrap();
        for i in 0..5 {
            sink.ingest(&measurement(i as f64, 1.0, 1.0));
        }
        sink.stop_run();

        let second = sink.start_run().unwrap();
        sink.ingest(&measurement(1.0, 1.0, 1.0));
        sink.stop_run();

        assert_ne!(first, second);
        assert_eq!(read_log(&first).unwrap().len(), 5);
        assert_eq!(read_log(&second).unwrap().len(), 1);
    }

    #[test]
    fn test_storage_failure_does_not_stop_acquisition() {
        let storage = SwitchableStorage::default();
        let log = DurableLog::with_storage(Box::new(storage.clone()), "memory.csv", 1).unwrap();
        let mut sink = sink_in(Path::new("unused"), 100);
        sink.start_run_with_log(log).unwrap();

        sink.ingest(&measurement(1.0, 1.0, 1.0));
        assert_eq!(sink.stats().rows_written, 1);

        storage.set_failing(true);
        // Fits the write buffer; only the flush fails
        sink.ingest(&measurement(2.0, 2.0, 2.0));
        // Too large for the write buffer, so the row itself is rejected
        let mut oversized = measurement(3.0, 3.0, 3.0);
        oversized.raw = "x".repeat(64 * 1024);
        sink.ingest(&oversized);

        let stats = sink.stats();
        assert_eq!(stats.rows_written, 2);
        assert_eq!(stats.write_failures, 1);
        assert!(stats.flush_failures >= 1);
        assert_eq!(stats.measurements, 3);
        assert!(sink.is_running());
        assert_eq!(sink.snapshot().len(), 3);
        assert_eq!(sink.progress(6.0), 50.0);

        // Stopping with failing storage still returns the run to idle
        assert_eq!(sink.stop_run(), Some(PathBuf::from("memory.csv")));
        assert_eq!(sink.state(), RunState::Idle);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 10);
        sink.start_run().unwrap();
        assert!(matches!(sink.start_run(), Err(DaqError::InvalidState(_))));
        assert!(sink.is_running());
    }

    #[test]
    fn test_start_fails_when_directory_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let mut sink = sink_in(&blocker, 10);
        assert!(sink.start_run().is_err());
        assert_eq!(sink.state(), RunState::Idle);
        assert!(sink.run_info().is_none());
    }

    #[test]
    fn test_summary_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), 10);
        sink.start_run().unwrap();
        sink.ingest(&measurement(1.0, 1.0, 2.0));
        sink.ingest(&measurement(2.0, 3.0, 4.0));
        sink.stop_run();

        let path = sink.write_summary_report(sink.default_report_path()).unwrap();
        let report = std::fs::read_to_string(path).unwrap();
        assert!(report.starts_with("Tribology Experiment Summary Report"));
        assert!(report.contains("data_points: 2\n"));
        assert!(report.contains("force_x_mean: 2.000\n"));
        assert!(report.contains("duration: 2.000\n"));
    }
}
