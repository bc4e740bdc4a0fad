//! # TriboDAQ-RS: Serial telemetry acquisition for a tribology rig
//!
//! Acquires telemetry from a lab rig over a serial link, decodes its
//! line-oriented tagged-field protocol and routes every reading to a bounded
//! live buffer (for plotting) and a durable per-run CSV log.
//!
//! ## Architecture
//!
//! - **Backend**: Serial link, line assembly, protocol decoding and the
//!   background reader thread, plus the command channel back to the rig
//! - **Session**: Experiment-run lifecycle, live snapshots, durable log,
//!   progress and statistics
//! - **Controller**: Wires the two together for a presentation layer
//! - **Communication**: A shared link mutex and crossbeam channels
//!
//! ## Configuration
//!
//! Settings load from JSON or TOML files. Log files of the command-line tool
//! go to the platform data directory under `dev.hxyulin.tribodaq-rs`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.tribodaq-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.tribodaq-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.tribodaq-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use tribodaq_rs::{config::AppConfig, controller::DeviceController};
//!
//! fn main() -> tribodaq_rs::Result<()> {
//!     let config = AppConfig::load_or_default("tribodaq.toml");
//!     let mut controller = DeviceController::serial(&config);
//!
//!     controller.connect(&config.serial)?;
//!     controller.start_experiment(&config.experiment)?;
//!
//!     let snapshots = controller.snapshot_handle()?;
//!     while controller.progress(config.experiment.experiment_duration_s) < 100.0 {
//!         println!("{} points", snapshots.load().len());
//!         std::thread::sleep(config.data.plot_update_interval());
//!     }
//!
//!     controller.stop_experiment();
//!     println!("{:?}", controller.statistics().as_map());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod types;

pub use controller::DeviceController;
pub use error::{DaqError, Result};
pub use types::{Reading, SensorSource};
