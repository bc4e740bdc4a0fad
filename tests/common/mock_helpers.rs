//! Mock construction helpers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tribodaq_rs::backend::{LinkConnection, ReaderConfig};
use tribodaq_rs::types::ConnectionStatus;
use tribodaq_rs::{DaqError, Result};

#[derive(Debug, Default)]
struct LinkScript {
    endpoint: Option<String>,
    incoming: VecDeque<Vec<u8>>,
    written: Vec<String>,
    reject_open: bool,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory link; clones share the same script
///
/// Tests keep one clone to feed bytes and inspect writes while the other
/// is owned by the code under test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<LinkScript>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk of incoming bytes
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.script.lock().unwrap().incoming.push_back(bytes.to_vec());
    }

    /// Queue one line of device output, `\r\n` terminated
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{}\r\n", line).as_bytes());
    }

    /// Check if all incoming bytes were consumed
    pub fn is_drained(&self) -> bool {
        self.script.lock().unwrap().incoming.is_empty()
    }

    /// Lines written by the host, terminators stripped
    pub fn written(&self) -> Vec<String> {
        self.script.lock().unwrap().written.clone()
    }

    pub fn reject_open(&self) {
        self.script.lock().unwrap().reject_open = true;
    }

    pub fn fail_reads(&self) {
        self.script.lock().unwrap().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.script.lock().unwrap().fail_writes = true;
    }
}

impl LinkConnection for ScriptedLink {
    fn open(&mut self, endpoint: &str, _baud_rate: u32, _timeout: Duration) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        if let Some(current) = &script.endpoint {
            return Err(DaqError::AlreadyConnected(current.clone()));
        }
        if script.reject_open {
            return Err(DaqError::Connect {
                endpoint: endpoint.to_string(),
                reason: "port busy".to_string(),
            });
        }
        script.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.script.lock().unwrap().endpoint = None;
    }

    fn status(&self) -> ConnectionStatus {
        if self.script.lock().unwrap().endpoint.is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    fn endpoint(&self) -> Option<String> {
        self.script.lock().unwrap().endpoint.clone()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let script = self.script.lock().unwrap();
        if script.fail_reads {
            return Err(DaqError::Read("device unplugged".to_string()));
        }
        Ok(script.incoming.front().map_or(0, Vec::len))
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut script = self.script.lock().unwrap();
        let Some(mut chunk) = script.incoming.pop_front() else {
            return Ok(Vec::new());
        };
        if chunk.len() > max {
            let rest = chunk.split_off(max);
            script.incoming.push_front(rest);
        }
        Ok(chunk)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        if script.fail_writes {
            return Err(DaqError::Write("broken pipe".to_string()));
        }
        let text = String::from_utf8_lossy(data);
        script.written.push(text.trim_end_matches('\n').to_string());
        Ok(())
    }
}

/// Reader timing suited to tests
pub fn fast_reader_config() -> ReaderConfig {
    ReaderConfig {
        poll_interval: Duration::from_millis(1),
        join_timeout: Duration::from_secs(1),
        queue_capacity: 1_000,
    }
}
