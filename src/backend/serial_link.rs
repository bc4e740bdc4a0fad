//! Serial port link to the rig
//!
//! [`SerialPortLink`] implements [`LinkConnection`] on top of the
//! `serialport` crate. The rig speaks 8N1 at the configured baud rate.

use super::link_trait::LinkConnection;
use crate::error::{DaqError, Result};
use crate::types::ConnectionStatus;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Serial port backend for the device link
#[derive(Default)]
pub struct SerialPortLink {
    /// Open port, if connected
    port: Option<Box<dyn SerialPort>>,
    /// Name of the open endpoint
    endpoint: Option<String>,
}

impl SerialPortLink {
    /// Create a disconnected link
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.port.is_some())
            .finish()
    }
}

impl LinkConnection for SerialPortLink {
    fn open(&mut self, endpoint: &str, baud_rate: u32, timeout: Duration) -> Result<()> {
        if let Some(ref current) = self.endpoint {
            return Err(DaqError::AlreadyConnected(current.clone()));
        }

        let port = serialport::new(endpoint, baud_rate)
            .timeout(timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open()
            .map_err(|e| DaqError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Opened serial link {} at {} baud", endpoint, baud_rate);
        self.port = Some(port);
        self.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    fn close(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            tracing::info!("Closed serial link {}", endpoint);
        }
        self.port = None;
    }

    fn status(&self) -> ConnectionStatus {
        if self.port.is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    fn endpoint(&self) -> Option<String> {
        self.endpoint.clone()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let port = self.port.as_ref().ok_or(DaqError::NotConnected)?;
        let available = port.bytes_to_read()?;
        Ok(available as usize)
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(DaqError::NotConnected)?;
        let mut buf = vec![0u8; max];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(DaqError::Read(e.to_string())),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(DaqError::NotConnected)?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| DaqError::Write(e.to_string()))
    }
}
