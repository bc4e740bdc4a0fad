//! Device controller
//!
//! [`DeviceController`] wires the acquisition pipeline together for a
//! presentation layer: it owns the shared link, the [`Reader`] thread, the
//! [`CommandChannel`] and the [`DataSink`]. The reader callback applies the
//! selected [`SensorSource`] remap before handing each reading to the sink.

use crate::backend::{
    format_config_command, shared_link, CommandChannel, LinkConnection, Reader, ReaderConfig,
    ReaderStats, SerialPortLink, SharedLink, START_COMMAND,
};
use crate::config::{AppConfig, DataSettings, ExperimentParameters, SerialConfig};
use crate::error::{DaqError, Result};
use crate::session::{DataSink, SharedSink, SnapshotHandle};
use crate::types::{ConnectionStatus, Reading, RunState, RunStatistics, SensorSource};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Owns the link, reader, command channel and sink for one device
pub struct DeviceController {
    link: SharedLink,
    reader: Reader,
    commands: CommandChannel,
    sink: SharedSink,
    sensor_source: Arc<RwLock<SensorSource>>,
    data: DataSettings,
}

impl DeviceController {
    /// Create a controller over any link
    pub fn new(link: impl LinkConnection + 'static, config: &AppConfig) -> Self {
        Self::with_reader_config(link, config, ReaderConfig::default())
    }

    /// Create a controller over a serial port link
    pub fn serial(config: &AppConfig) -> Self {
        Self::new(SerialPortLink::new(), config)
    }

    /// Create a controller with custom reader timing
    pub fn with_reader_config(
        link: impl LinkConnection + 'static,
        config: &AppConfig,
        reader_config: ReaderConfig,
    ) -> Self {
        let link = shared_link(link);
        let sink = DataSink::from_settings(&config.data).into_shared();
        let sensor_source = Arc::new(RwLock::new(config.sensor_source));

        let mut reader = Reader::new(link.clone(), reader_config);
        {
            let sink = sink.clone();
            let sensor_source = sensor_source.clone();
            reader.set_callback(move |reading: &Reading| {
                let source = sensor_source.read().map(|s| *s).unwrap_or_default();
                let reading = source.remap(reading.clone());
                if let Some(message) = reading.message.as_deref() {
                    tracing::info!("Device: {}", message);
                }
                match sink.lock() {
                    Ok(mut sink) => sink.ingest(&reading),
                    Err(_) => tracing::error!("Sink lock poisoned, reading dropped"),
                }
            });
        }

        Self {
            commands: CommandChannel::new(link.clone()),
            link,
            reader,
            sink,
            sensor_source,
            data: config.data.clone(),
        }
    }

    /// Open the link and start the reader thread
    pub fn connect(&mut self, serial: &SerialConfig) -> Result<()> {
        {
            let mut link = self.link.lock().map_err(|_| DaqError::poisoned("link"))?;
            link.open(&serial.port, serial.baud_rate, serial.timeout())?;
        }
        tracing::info!("Connected to {} at {} baud", serial.port, serial.baud_rate);

        if let Err(e) = self.reader.start() {
            tracing::error!("Failed to start reader: {}", e);
            self.close_link();
            return Err(e);
        }
        Ok(())
    }

    /// Stop any run, stop the reader and close the link
    pub fn disconnect(&mut self) {
        if self.run_state() == RunState::Running {
            tracing::warn!("Disconnecting during a run, stopping it");
            self.finish_run();
        }
        self.reader.stop();
        self.close_link();
        tracing::info!("Disconnected");
    }

    fn close_link(&self) {
        match self.link.lock() {
            Ok(mut link) => link.close(),
            Err(_) => tracing::error!("Link lock poisoned, cannot close"),
        }
    }

    /// Link status
    pub fn status(&self) -> ConnectionStatus {
        self.link
            .lock()
            .map(|link| link.status())
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Check if the link is open
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Open endpoint name
    pub fn endpoint(&self) -> Option<String> {
        self.link.lock().ok().and_then(|link| link.endpoint())
    }

    /// Configure the rig, start a run and send the start command
    ///
    /// The sink is running before the rig is told to start, so no early
    /// readings are lost. If a command fails the run is stopped again.
    pub fn start_experiment(&mut self, params: &ExperimentParameters) -> Result<PathBuf> {
        if !self.is_connected() {
            return Err(DaqError::NotConnected);
        }

        let log_path = self.lock_sink()?.start_run()?;

        let source = self.sensor_source();
        let sent = self
            .commands
            .try_send(&format_config_command(params, source))
            .and_then(|_| self.commands.try_send(START_COMMAND));
        if let Err(e) = sent {
            tracing::error!("Failed to start experiment: {}", e);
            self.lock_sink()?.stop_run();
            return Err(e);
        }

        tracing::info!(
            "Experiment started ({} s, {})",
            params.experiment_duration_s,
            source
        );
        Ok(log_path)
    }

    /// Send the stop command and close the run
    ///
    /// Writes the summary report when auto-save is enabled. Returns the
    /// run's log path, or `None` if no run was in progress.
    pub fn stop_experiment(&mut self) -> Option<PathBuf> {
        self.commands.stop_experiment();
        self.finish_run()
    }

    fn finish_run(&mut self) -> Option<PathBuf> {
        let mut sink = match self.lock_sink() {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("{}", e);
                return None;
            }
        };
        let path = sink.stop_run()?;

        if self.data.auto_save {
            let report = sink.default_report_path();
            if let Err(e) = sink.write_summary_report(&report) {
                tracing::warn!("Failed to write summary report: {}", e);
            }
        }
        Some(path)
    }

    /// Run progress in percent
    pub fn progress(&self, total_duration: f64) -> f64 {
        self.lock_sink()
            .map(|sink| sink.progress(total_duration))
            .unwrap_or(0.0)
    }

    /// Live-buffer statistics
    pub fn statistics(&self) -> RunStatistics {
        self.lock_sink()
            .map(|sink| sink.statistics())
            .unwrap_or_default()
    }

    /// Current run state
    pub fn run_state(&self) -> RunState {
        self.lock_sink()
            .map(|sink| sink.state())
            .unwrap_or_default()
    }

    /// Discard all run data and return the sink to idle
    pub fn clear(&mut self) -> Result<()> {
        self.lock_sink()?.clear();
        Ok(())
    }

    /// Select which sensor feeds the canonical force values
    pub fn set_sensor_source(&self, source: SensorSource) {
        match self.sensor_source.write() {
            Ok(mut current) => *current = source,
            Err(poisoned) => *poisoned.into_inner() = source,
        }
        tracing::info!("Sensor source set to {}", source);
    }

    /// Active sensor source
    pub fn sensor_source(&self) -> SensorSource {
        self.sensor_source.read().map(|s| *s).unwrap_or_default()
    }

    /// Handle for reading live snapshots
    pub fn snapshot_handle(&self) -> Result<SnapshotHandle> {
        Ok(self.lock_sink()?.snapshot_handle())
    }

    /// The shared sink
    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    /// The command channel
    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    /// Readings queued by the reader (before the sensor-source remap)
    pub fn drain_queued(&self) -> Vec<Reading> {
        self.reader.drain_queued()
    }

    /// Reader counters
    pub fn reader_stats(&self) -> ReaderStats {
        self.reader.stats()
    }

    /// Check if the reader thread is alive
    pub fn is_reading(&self) -> bool {
        self.reader.is_running()
    }

    /// Error that stopped the reader, if any
    pub fn reader_error(&self) -> Option<String> {
        self.reader.last_error()
    }

    fn lock_sink(&self) -> Result<std::sync::MutexGuard<'_, DataSink>> {
        self.sink.lock().map_err(|_| DaqError::poisoned("sink"))
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}
