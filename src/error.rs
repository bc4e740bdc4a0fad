//! Error handling for the TriboDAQ acquisition core
//!
//! This module defines the crate error type and a Result alias used
//! throughout the library.

use thiserror::Error;

/// Main error type for TriboDAQ operations
#[derive(Error, Debug)]
pub enum DaqError {
    /// The link endpoint could not be opened (invalid, busy, or missing)
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// A link is already open
    #[error("Link already connected to {0}")]
    AlreadyConnected(String),

    /// An operation required an open link
    #[error("Link is not connected")]
    NotConnected,

    /// Writing to the link failed
    #[error("Write error: {0}")]
    Write(String),

    /// Reading from the link failed
    #[error("Read error: {0}")]
    Read(String),

    /// Errors raised by the serial port driver
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the durable CSV log
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication or shared-state locks
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DaqError>,
    },
}

impl DaqError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DaqError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Error for a poisoned shared-state lock
    pub fn poisoned(what: &str) -> Self {
        DaqError::Channel(format!("{} lock poisoned", what))
    }
}

/// Result type alias for TriboDAQ operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DaqError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DaqError::Io(e).with_context(f()))
    }
}
