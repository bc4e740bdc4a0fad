//! LinkConnection trait for a unified device-link interface
//!
//! This module provides the common trait for the physical link to the rig,
//! so the reader and command channel work the same against a real serial
//! port and against in-memory links in tests.

use crate::error::Result;
use crate::types::ConnectionStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Unified interface for the device link
///
/// At most one endpoint is open at a time. Implementations must be `Send`
/// so the link can be shared between the reader thread and the command
/// channel.
///
/// # Example
///
/// ```ignore
/// fn drain(link: &mut dyn LinkConnection) -> Result<Vec<u8>> {
///     let available = link.bytes_available()?;
///     link.read(available)
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait LinkConnection: Send {
    /// Open the link
    ///
    /// # Arguments
    /// * `endpoint` - Port name (e.g., "/dev/ttyACM0", "COM3")
    /// * `baud_rate` - Line speed
    /// * `timeout` - Read timeout of the underlying port
    ///
    /// Fails with [`DaqError::Connect`](crate::error::DaqError::Connect) for
    /// an invalid or busy endpoint and with
    /// [`DaqError::AlreadyConnected`](crate::error::DaqError::AlreadyConnected)
    /// when a link is already open. The state stays unchanged on failure.
    fn open(&mut self, endpoint: &str, baud_rate: u32, timeout: Duration) -> Result<()>;

    /// Close the link. Closing a closed link is a no-op.
    fn close(&mut self);

    /// Current lifecycle state
    fn status(&self) -> ConnectionStatus;

    /// Name of the open endpoint, if any
    fn endpoint(&self) -> Option<String>;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `max` bytes
    fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Write all of `data` and flush it to the device
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Check if the link is open
    fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }
}

/// A link shared between the reader thread and the command channel
pub type SharedLink = Arc<Mutex<Box<dyn LinkConnection>>>;

/// Wrap a link for sharing
pub fn shared_link(link: impl LinkConnection + 'static) -> SharedLink {
    Arc::new(Mutex::new(Box::new(link)))
}
