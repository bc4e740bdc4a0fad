//! Core data types for TriboDAQ
//!
//! This module contains the fundamental data structures shared by the
//! acquisition backend and the run session.
//!
//! # Main Types
//!
//! - [`Reading`] - One decoded protocol line (measurement or status)
//! - [`ConnectionStatus`] - Link lifecycle state
//! - [`SensorSource`] - Which tag vocabulary feeds the canonical force fields
//! - [`LivePoint`] - One slot of the live ring buffer
//! - [`RunState`] - Experiment run lifecycle state
//! - [`RunStatistics`] - Summary statistics over the live buffer
//!
//! # Absent vs. zero
//!
//! Every numeric field decoded from the wire is an `Option<f64>`. A field the
//! device did not send is `None`; it is never folded into `0.0` or `NaN`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One decoded line of the device protocol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// Whether the line carried the experiment marker prefix
    pub is_experiment: bool,
    /// The line with the marker stripped
    pub raw: String,
    /// Device time in seconds
    pub time: Option<f64>,
    /// X force under the fixed-sensor naming (`Fixed_X`)
    pub fixed_x: Option<f64>,
    /// Z force under the fixed-sensor naming (`Fixed_Z`)
    pub fixed_z: Option<f64>,
    /// X force under the controlled-sensor naming (`Fx`)
    pub fx: Option<f64>,
    /// Z force under the controlled-sensor naming (`Fz`)
    pub fz: Option<f64>,
    /// Canonical X force
    pub force_x: Option<f64>,
    /// Canonical Z force
    pub force_z: Option<f64>,
    /// Status text, only set when the line carried no force fields
    pub message: Option<String>,
}

/// Classification of a surfaced [`Reading`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    /// At least one canonical force field is set
    Measurement,
    /// A device status line
    Status,
}

impl Reading {
    /// Classify this reading
    ///
    /// Returns `None` for a reading that is neither a measurement nor a
    /// status line; the parser never surfaces such readings.
    pub fn kind(&self) -> Option<ReadingKind> {
        if self.force_x.is_some() || self.force_z.is_some() {
            Some(ReadingKind::Measurement)
        } else if self.message.is_some() {
            Some(ReadingKind::Status)
        } else {
            None
        }
    }

    /// Check if this reading carries force values
    pub fn is_measurement(&self) -> bool {
        self.kind() == Some(ReadingKind::Measurement)
    }

    /// Check if this reading is a device status line
    pub fn is_status(&self) -> bool {
        self.kind() == Some(ReadingKind::Status)
    }
}

/// Connection status of the device link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No link open
    #[default]
    Disconnected,
    /// Link open and usable
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Which sensor vocabulary is the user-selected source of the force values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSource {
    /// Fixed sensor (`Fixed_X` / `Fixed_Z`)
    #[default]
    Fixed,
    /// Controlled / free-sphere sensor (`Fx` / `Fz`)
    Controlled,
}

impl SensorSource {
    /// Single-letter code sent to the firmware in the configuration command
    pub fn command_code(&self) -> char {
        match self {
            SensorSource::Fixed => 'F',
            SensorSource::Controlled => 'C',
        }
    }

    /// Remap the canonical force fields from this source's raw fields.
    ///
    /// An axis the selected source did not report keeps the value the parser
    /// resolved for it.
    pub fn remap(&self, mut reading: Reading) -> Reading {
        let (x, z) = match self {
            SensorSource::Fixed => (reading.fixed_x, reading.fixed_z),
            SensorSource::Controlled => (reading.fx, reading.fz),
        };
        if x.is_some() {
            reading.force_x = x;
        }
        if z.is_some() {
            reading.force_z = z;
        }
        reading
    }
}

impl std::fmt::Display for SensorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorSource::Fixed => write!(f, "Fixed sensor"),
            SensorSource::Controlled => write!(f, "Controlled sensor"),
        }
    }
}

/// One slot of the live ring buffer
#[derive(Debug, Clone, PartialEq)]
pub struct LivePoint {
    /// Device time in seconds
    pub time: Option<f64>,
    /// Canonical X force
    pub force_x: Option<f64>,
    /// Canonical Z force
    pub force_z: Option<f64>,
    /// Host wall-clock time the reading was ingested
    pub timestamp: DateTime<Local>,
}

impl LivePoint {
    /// Build a live point from a measurement reading
    pub fn from_reading(reading: &Reading, timestamp: DateTime<Local>) -> Self {
        Self {
            time: reading.time,
            force_x: reading.force_x,
            force_z: reading.force_z,
            timestamp,
        }
    }
}

/// Experiment run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No run in progress
    #[default]
    Idle,
    /// A run is collecting data
    Running,
}

impl RunState {
    /// Check if a run is in progress
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
        }
    }
}

/// Mean, sample standard deviation and range of one force axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStatistics {
    pub mean: f64,
    /// Sample standard deviation (n - 1); 0.0 for fewer than two values
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl AxisStatistics {
    /// Compute statistics over the present values, `None` if there are none
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() < 2 {
            0.0
        } else {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            std_dev,
            min,
            max,
        })
    }
}

/// Statistics over the live buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    /// Number of points in the live buffer
    pub count: usize,
    /// Largest device time observed in the buffer
    pub duration: Option<f64>,
    /// X axis statistics over present values
    pub force_x: Option<AxisStatistics>,
    /// Z axis statistics over present values
    pub force_z: Option<AxisStatistics>,
}

impl RunStatistics {
    /// Compute statistics over a sequence of live points
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LivePoint> + Clone) -> Self {
        let count = points.clone().into_iter().count();
        if count == 0 {
            return Self::default();
        }

        let duration = points
            .clone()
            .into_iter()
            .filter_map(|p| p.time)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |m| m.max(t))));

        Self {
            count,
            duration,
            force_x: AxisStatistics::from_values(points.clone().into_iter().filter_map(|p| p.force_x)),
            force_z: AxisStatistics::from_values(points.into_iter().filter_map(|p| p.force_z)),
        }
    }

    /// Check if there is nothing to report
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Flatten into named values (`force_x_mean`, `duration`, ...)
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        if self.is_empty() {
            return map;
        }

        map.insert("data_points".to_string(), self.count as f64);
        if let Some(duration) = self.duration {
            map.insert("duration".to_string(), duration);
        }
        for (axis, stats) in [("force_x", self.force_x), ("force_z", self.force_z)] {
            if let Some(s) = stats {
                map.insert(format!("{}_mean", axis), s.mean);
                map.insert(format!("{}_std", axis), s.std_dev);
                map.insert(format!("{}_min", axis), s.min);
                map.insert(format!("{}_max", axis), s.max);
            }
        }
        map
    }
}
