//! Device Link Protocol
//!
//! Implements the single-byte opcode protocol spoken by the logger firmware:
//! a `?` handshake, a `!` status query, an `i` configuration exchange followed
//! by a 28-byte little-endian record, and an `r` bulk log transfer terminated by
//! the literal `END_DATA`.

pub mod commands;
mod configure;
mod connection;
pub mod discovery;
mod error;
pub mod record;
pub mod serial;
pub mod transfer;
pub mod transport;

pub use commands::{Command, DeviceStatus};
pub use configure::{ConfigureAck, LinkOutcome};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use discovery::find_device;
pub use error::{ConfigureError, ConnectError, ProtocolError, TransferError};
pub use record::ConfigRecord;
pub use serial::{list_ports, PortInfo, PortProvider, SerialPortProvider, SerialTransport};
pub use transfer::TransferSummary;
pub use transport::Transport;

/// Fixed baud rate of the logger firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Per-call timeout used while opening and probing a port
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5000;

/// Time the board needs to come out of its power-on reset after the port opens
pub const DEFAULT_RESET_DELAY_MS: u64 = 2000;

/// Pause after closing a handle so the OS releases the port before reopening
pub const DEFAULT_RELEASE_DELAY_MS: u64 = 500;

/// Timeout for single-line replies (status query)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Delay between the configuration opcode and reading its reply
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Window for the optional acknowledgement after the configuration record
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5000;

/// Read timeout for the bulk transfer
pub const DEFAULT_BULK_TIMEOUT_MS: u64 = 10000;

/// Maximum bytes requested per bulk read
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Reply expected from the `?` probe
pub const HANDSHAKE_GREETING: &str = "Hello World!";

/// Reply expected from the `i` opcode
pub const READY_FOR_INIT: &str = "READY_FOR_INIT";

/// Marker closing the bulk transfer stream
pub const END_OF_DATA: &[u8] = b"END_DATA";
