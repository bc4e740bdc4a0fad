//! Backend module for the device link
//!
//! This module holds everything that touches the serial link. Decoding and
//! dispatch happen on a dedicated reader thread, so callers of the
//! acquisition API never block on the link.
//!
//! # Components
//!
//! - [`LinkConnection`] - Trait over the physical link (open/close/read/write)
//! - [`SerialPortLink`] - `serialport`-backed implementation
//! - [`list_ports`] - Enumerates serial endpoints
//! - [`LineAssembler`] - Splits the byte stream into text lines
//! - [`ProtocolParser`] - Decodes one line into a [`Reading`](crate::types::Reading)
//! - [`Reader`] - Background thread tying the above together
//! - [`CommandChannel`] - Sends start/stop/config commands to the rig
//!
//! # Data flow
//!
//! ```text
//! LinkConnection ──bytes──▶ LineAssembler ──lines──▶ ProtocolParser
//!        ▲                                                 │
//!        │ commands                                    Readings
//! CommandChannel                                           ▼
//!                                          callback + bounded queue
//! ```

pub mod command;
pub mod discovery;
pub mod line_assembler;
pub mod link_trait;
pub mod parser;
pub mod reader;
pub mod serial_link;

pub use command::{
    format_config_command, CommandChannel, COMMAND_TERMINATOR, START_COMMAND, STOP_COMMAND,
};
pub use discovery::{list_ports, list_ports_async, PortInfo, PortKind};
pub use line_assembler::{LineAssembler, MAX_PENDING_BYTES};
pub use link_trait::{shared_link, LinkConnection, SharedLink};
pub use parser::{ProtocolParser, EXPERIMENT_MARKER, STATUS_KEYWORDS};
pub use reader::{Reader, ReaderConfig, ReaderState, ReaderStats, ReadingCallback};
pub use serial_link::SerialPortLink;
