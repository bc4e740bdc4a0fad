//! Experiment run capture
//!
//! This module receives decoded readings and keeps two views of an
//! experiment run: a bounded live buffer for plotting and a durable CSV log
//! holding every reading at full resolution.
//!
//! # Features
//!
//! - Start, stop and clear experiment runs
//! - Publish immutable live snapshots to other threads
//! - Stream every reading to a per-run CSV log with batched flushing
//! - Compute progress and per-axis statistics
//! - Read logs back and write summary reports

pub mod durable_log;
pub mod live_buffer;
pub mod sink;

pub use durable_log::{log_file_name, read_log, DurableLog, LogRecord, LogStorage, LOG_COLUMNS};
pub use live_buffer::{LiveBuffer, LiveSnapshot, SnapshotHandle};
pub use sink::{DataSink, RunInfo, SharedSink, SinkConfig, SinkStats};
