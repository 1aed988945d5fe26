//! Connection management
//!
//! Owns the single transport handle and the status exchange. Every other
//! operation reaches the device through [`Connection::live_transport`].

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

use super::transport::{read_line, send_command};
use super::{
    find_device, Command, ConnectError, DeviceStatus, PortProvider, SerialPortProvider,
    Transport, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_BAUD_RATE, DEFAULT_BULK_TIMEOUT_MS,
    DEFAULT_CHUNK_SIZE, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_OPEN_TIMEOUT_MS,
    DEFAULT_RELEASE_DELAY_MS, DEFAULT_RESET_DELAY_MS, DEFAULT_SETTLE_DELAY_MS,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No open handle
    Disconnected,
    /// Handshake succeeded and the handle is open
    Connected,
}

/// Connection configuration. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout while opening and probing a port
    pub open_timeout_ms: u64,
    /// Wait after opening a port for the board to finish its reset
    pub reset_delay_ms: u64,
    /// Wait after closing a handle before probing again
    pub release_delay_ms: u64,
    /// Timeout for single-line replies
    pub command_timeout_ms: u64,
    /// Wait between the configuration opcode and its reply
    pub settle_delay_ms: u64,
    /// Window for the optional configuration acknowledgement
    pub ack_timeout_ms: u64,
    /// Maximum silence tolerated during the bulk transfer
    pub bulk_timeout_ms: u64,
    /// Maximum bytes per bulk read
    pub chunk_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            reset_delay_ms: DEFAULT_RESET_DELAY_MS,
            release_delay_ms: DEFAULT_RELEASE_DELAY_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            bulk_timeout_ms: DEFAULT_BULK_TIMEOUT_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ConnectionConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_timeout_ms)
    }
}

/// Connection to the logger
///
/// Holds at most one open transport. Dropping the connection closes it.
pub struct Connection<P: PortProvider = SerialPortProvider> {
    /// Where candidate ports come from
    provider: P,
    /// The single open handle, if any
    transport: Option<Box<dyn Transport>>,
    /// Connection configuration
    config: ConnectionConfig,
}

impl Connection<SerialPortProvider> {
    /// Create a connection over the host's serial ports (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_provider(SerialPortProvider::new(), config)
    }
}

impl<P: PortProvider> Connection<P> {
    /// Create a connection over an arbitrary port provider (not yet connected)
    pub fn with_provider(provider: P, config: ConnectionConfig) -> Self {
        Self {
            provider,
            transport: None,
            config,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        if self.transport.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Name of the open port (if connected)
    pub fn port_name(&self) -> Option<&str> {
        self.transport.as_ref().map(|t| t.name())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Close any open handle and run discovery again.
    ///
    /// A half-open handle is never reused: whatever was open is released
    /// first. On failure the connection is left disconnected.
    pub fn ensure_connected(&mut self) -> Result<(), ConnectError> {
        if self.transport.is_some() {
            self.disconnect();
            std::thread::sleep(self.config.release_delay());
        }

        let transport = find_device(&self.provider, &self.config)?;
        tracing::info!("Connected to device on {}", transport.name());
        self.transport = Some(transport);
        Ok(())
    }

    /// Close the handle if open. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            tracing::info!("Disconnected from {}", transport.name());
        }
    }

    /// Transport of the live connection, connecting first if nothing is open
    pub(crate) fn live_transport(&mut self) -> Result<&mut dyn Transport, ConnectError> {
        if self.transport.is_none() {
            self.ensure_connected()?;
        }
        match self.transport.as_deref_mut() {
            Some(transport) => Ok(transport),
            None => Err(ConnectError::new("no transport after connect")),
        }
    }

    /// Ask the device for its status.
    ///
    /// Connects on demand. A failed connection reports
    /// [`DeviceStatus::Disconnected`]; a transport fault drops the handle and
    /// reports [`DeviceStatus::Error`]. Nothing is retried.
    pub fn send_status_query(&mut self) -> DeviceStatus {
        let timeout = self.config.command_timeout();
        let reply = match self.live_transport() {
            Ok(transport) => request_line(transport, Command::QueryStatus, timeout),
            Err(e) => {
                tracing::warn!("Status query: {}", e);
                return DeviceStatus::Disconnected;
            }
        };

        match reply {
            Ok(line) => {
                tracing::debug!("send_status_query: reply {:?}", line);
                DeviceStatus::from_token(&line)
            }
            Err(e) => {
                tracing::warn!("Status query failed, dropping connection: {}", e);
                self.disconnect();
                DeviceStatus::Error
            }
        }
    }
}

impl<P: PortProvider> Drop for Connection<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Send `cmd` on a clean input buffer and read the one-line reply
fn request_line(
    transport: &mut dyn Transport,
    cmd: Command,
    timeout: Duration,
) -> io::Result<String> {
    transport.clear_input_buffer()?;
    send_command(transport, cmd)?;
    read_line(transport, timeout)
}
