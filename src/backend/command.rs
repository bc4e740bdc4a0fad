//! Host to device commands
//!
//! Commands are newline-terminated ASCII lines written over the same link
//! the [`Reader`](super::Reader) consumes. The link lock makes each write
//! atomic with respect to the reader.
//!
//! | Command | Wire text |
//! |---------|-----------|
//! | start   | `3` (the firmware's start-button code) |
//! | stop    | `stop` |
//! | config  | `CFG,<mode>,<rpm_pump>,<rpm_axis>,<rpm_force>,<duration_s>,<sensor>` |
//!
//! `<mode>` is `1` for force-control mode and `0` otherwise; `<sensor>` is
//! `F` (fixed) or `C` (controlled).

use super::link_trait::SharedLink;
use crate::config::ExperimentParameters;
use crate::error::{DaqError, Result};
use crate::types::SensorSource;

/// Line terminator appended to every command
pub const COMMAND_TERMINATOR: &str = "\n";

/// Start command (emulates the rig's start button)
pub const START_COMMAND: &str = "3";

/// Stop command
pub const STOP_COMMAND: &str = "stop";

/// Prefix of the configuration command
pub const CONFIG_COMMAND_PREFIX: &str = "CFG";

/// Build the configuration command line (without terminator)
pub fn format_config_command(params: &ExperimentParameters, source: SensorSource) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        CONFIG_COMMAND_PREFIX,
        u8::from(params.use_force_control_mode),
        params.rpm_pump,
        params.rpm_axis,
        params.rpm_force,
        params.experiment_duration_s,
        source.command_code()
    )
}

/// Sends text commands to the device
#[derive(Clone)]
pub struct CommandChannel {
    link: SharedLink,
}

impl CommandChannel {
    /// Create a command channel over a shared link
    pub fn new(link: SharedLink) -> Self {
        Self { link }
    }

    /// Send one command line, reporting any failure as an error
    pub fn try_send(&self, text: &str) -> Result<()> {
        let mut link = self.link.lock().map_err(|_| DaqError::poisoned("link"))?;
        if !link.is_connected() {
            return Err(DaqError::NotConnected);
        }

        let line = format!("{}{}", text, COMMAND_TERMINATOR);
        link.write(line.as_bytes())?;
        tracing::debug!("Sent command: {}", text);
        Ok(())
    }

    /// Send one command line; returns `false` on any failure
    pub fn send(&self, text: &str) -> bool {
        match self.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send command {:?}: {}", text, e);
                false
            }
        }
    }

    /// Tell the rig to start the experiment
    pub fn start_experiment(&self) -> bool {
        self.send(START_COMMAND)
    }

    /// Tell the rig to stop the experiment
    pub fn stop_experiment(&self) -> bool {
        self.send(STOP_COMMAND)
    }

    /// Send the experiment parameters and active sensor source
    pub fn send_config(&self, params: &ExperimentParameters, source: SensorSource) -> bool {
        self.send(&format_config_command(params, source))
    }
}
