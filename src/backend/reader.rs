//! Background reader thread
//!
//! [`Reader`] owns the one thread that pulls bytes off the device link. For
//! each poll it:
//!
//! - checks how many bytes are waiting on the link
//! - reads them, feeds the [`LineAssembler`] and decodes every completed
//!   line with the [`ProtocolParser`]
//! - hands each [`Reading`] to the registered callback, then to the bounded
//!   reading queue, before touching the next one
//! - sleeps for the poll interval when nothing was waiting, so a stop
//!   request is seen promptly without spinning
//!
//! # Failure policy
//!
//! A link error ends the thread. The error is logged, kept in
//! [`Reader::last_error`], and the reader reports [`ReaderState::Stopped`].
//! Nothing restarts it; call [`Reader::start`] again after reconnecting.
//!
//! # Stopping
//!
//! Every spawned thread gets its own stop flag. If a thread outlives the
//! join timeout of [`Reader::stop`] the reader keeps its handle and reports
//! [`ReaderState::Stopping`]; [`Reader::start`] refuses to spawn a second
//! thread until the first one has exited.
//!
//! # Example
//!
//! ```ignore
//! let link = shared_link(SerialPortLink::new());
//! link.lock().unwrap().open("/dev/ttyACM0", 115_200, Duration::from_secs(1))?;
//!
//! let mut reader = Reader::new(link.clone(), ReaderConfig::default());
//! reader.set_callback(|reading| println!("{:?}", reading));
//! reader.start()?;
//! // ...
//! reader.stop();
//! ```

use super::line_assembler::LineAssembler;
use super::link_trait::SharedLink;
use super::parser::ProtocolParser;
use crate::error::{DaqError, Result};
use crate::types::Reading;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default sleep between polls when the link is idle
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default bound on how long [`Reader::stop`] waits for the thread
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of the reading queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Callback invoked on the reader thread for every decoded reading
pub type ReadingCallback = Arc<dyn Fn(&Reading) + Send + Sync>;

/// Reader thread tuning
#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    /// Sleep between polls when no bytes are waiting
    pub poll_interval: Duration,
    /// How long `stop()` waits for the thread to exit
    pub join_timeout: Duration,
    /// Capacity of the reading queue
    pub queue_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Reader lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Stopped,
    Running,
    /// Stop requested, thread not yet exited
    Stopping,
}

/// Counters updated by the reader thread
#[derive(Debug, Default)]
struct ReaderCounters {
    bytes_read: AtomicU64,
    lines: AtomicU64,
    readings: AtomicU64,
    dropped_lines: AtomicU64,
    queue_overflows: AtomicU64,
}

/// Snapshot of the reader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Bytes pulled off the link
    pub bytes_read: u64,
    /// Complete lines assembled
    pub lines: u64,
    /// Readings dispatched
    pub readings: u64,
    /// Lines the parser discarded
    pub dropped_lines: u64,
    /// Readings not queued because the queue was full
    pub queue_overflows: u64,
}

/// State shared with the reader thread
struct ReaderShared {
    counters: ReaderCounters,
    last_error: Mutex<Option<String>>,
}

/// Owns the background reading thread
pub struct Reader {
    link: SharedLink,
    config: ReaderConfig,
    shared: Arc<ReaderShared>,
    callback: Option<ReadingCallback>,
    queue_tx: Sender<Reading>,
    queue_rx: Receiver<Reading>,
    /// Stop flag of the thread in `handle`
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reader {
    /// Create a stopped reader for a shared link
    pub fn new(link: SharedLink, config: ReaderConfig) -> Self {
        let (queue_tx, queue_rx) = bounded(config.queue_capacity.max(1));
        Self {
            link,
            config,
            shared: Arc::new(ReaderShared {
                counters: ReaderCounters::default(),
                last_error: Mutex::new(None),
            }),
            callback: None,
            queue_tx,
            queue_rx,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Register the dispatch callback
    ///
    /// Takes effect on the next [`start`](Self::start).
    pub fn set_callback(&mut self, callback: impl Fn(&Reading) + Send + Sync + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    /// Remove the dispatch callback
    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Current state; a thread that ended on its own reports `Stopped`
    pub fn state(&self) -> ReaderState {
        match self.handle {
            Some(ref handle) if !handle.is_finished() => {
                if self.running.load(Ordering::SeqCst) {
                    ReaderState::Running
                } else {
                    ReaderState::Stopping
                }
            }
            _ => ReaderState::Stopped,
        }
    }

    /// Check if the reader thread is alive
    pub fn is_running(&self) -> bool {
        self.state() == ReaderState::Running
    }

    /// Spawn the reader thread
    ///
    /// A no-op if already running. Fails with [`DaqError::NotConnected`] if
    /// the link is not open, and with [`DaqError::InvalidState`] if a
    /// previously stopped thread is still running after another join
    /// timeout.
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            ReaderState::Running => return Ok(()),
            ReaderState::Stopping => {
                if !self.wait_for_exit(self.config.join_timeout) {
                    return Err(DaqError::InvalidState(
                        "previous reader thread has not exited".to_string(),
                    ));
                }
            }
            ReaderState::Stopped => {}
        }
        self.reap();

        let connected = self
            .link
            .lock()
            .map_err(|_| DaqError::poisoned("link"))?
            .is_connected();
        if !connected {
            return Err(DaqError::NotConnected);
        }

        if let Ok(mut last_error) = self.shared.last_error.lock() {
            *last_error = None;
        }
        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();

        let worker = ReaderWorker {
            link: self.link.clone(),
            shared: self.shared.clone(),
            running,
            callback: self.callback.clone(),
            queue_tx: self.queue_tx.clone(),
            poll_interval: self.config.poll_interval,
            assembler: LineAssembler::new(),
            parser: ProtocolParser::new(),
        };

        let handle = std::thread::Builder::new()
            .name("tribodaq-reader".to_string())
            .spawn(move || worker.run())?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Request the thread to stop and wait for it, up to the join timeout
    ///
    /// If the thread does not exit in time the call returns anyway; the
    /// reader then reports [`ReaderState::Stopping`] until it does.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if self.handle.is_none() {
            return;
        }
        if self.wait_for_exit(self.config.join_timeout) {
            self.reap();
        } else {
            tracing::warn!(
                "Reader thread did not exit within {:?}",
                self.config.join_timeout
            );
        }
    }

    /// Wait up to `timeout` for the current thread to finish
    fn wait_for_exit(&self, timeout: Duration) -> bool {
        let Some(ref handle) = self.handle else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Join a finished thread
    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Reader thread panicked");
            }
        }
    }

    /// Error that ended the last run of the thread, if any
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Try to take one queued reading without blocking
    pub fn try_recv(&self) -> Option<Reading> {
        self.queue_rx.try_recv().ok()
    }

    /// Take all queued readings
    pub fn drain_queued(&self) -> Vec<Reading> {
        self.queue_rx.try_iter().collect()
    }

    /// A receiver handle on the reading queue
    pub fn queue(&self) -> Receiver<Reading> {
        self.queue_rx.clone()
    }

    /// Current counters
    pub fn stats(&self) -> ReaderStats {
        let c = &self.shared.counters;
        ReaderStats {
            bytes_read: c.bytes_read.load(Ordering::Relaxed),
            lines: c.lines.load(Ordering::Relaxed),
            readings: c.readings.load(Ordering::Relaxed),
            dropped_lines: c.dropped_lines.load(Ordering::Relaxed),
            queue_overflows: c.queue_overflows.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the reader thread owns
struct ReaderWorker {
    link: SharedLink,
    shared: Arc<ReaderShared>,
    running: Arc<AtomicBool>,
    callback: Option<ReadingCallback>,
    queue_tx: Sender<Reading>,
    poll_interval: Duration,
    assembler: LineAssembler,
    parser: ProtocolParser,
}

impl ReaderWorker {
    fn run(mut self) {
        tracing::info!("Reader thread started");

        while self.running.load(Ordering::SeqCst) {
            match self.poll() {
                Ok(Some(bytes)) => self.process(&bytes),
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(e) => {
                    tracing::error!("Reader thread aborted: {}", e);
                    if let Ok(mut last_error) = self.shared.last_error.lock() {
                        *last_error = Some(e.to_string());
                    }
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Reader thread stopped");
    }

    /// Read whatever is waiting on the link
    fn poll(&mut self) -> Result<Option<Vec<u8>>> {
        let mut link = self.link.lock().map_err(|_| DaqError::poisoned("link"))?;
        if !link.is_connected() {
            return Err(DaqError::NotConnected);
        }

        let available = link.bytes_available()?;
        if available == 0 {
            return Ok(None);
        }

        let bytes = link.read(available)?;
        Ok(if bytes.is_empty() { None } else { Some(bytes) })
    }

    fn process(&mut self, bytes: &[u8]) {
        let counters = &self.shared.counters;
        counters
            .bytes_read
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        for line in self.assembler.feed(bytes) {
            counters.lines.fetch_add(1, Ordering::Relaxed);

            let Some(reading) = self.parser.parse(&line) else {
                tracing::trace!("Dropped line: {}", line);
                counters.dropped_lines.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            if let Some(ref callback) = self.callback {
                callback(&reading);
            }
            match self.queue_tx.try_send(reading) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counters.queue_overflows.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
            counters.readings.fetch_add(1, Ordering::Relaxed);
        }
    }
}
