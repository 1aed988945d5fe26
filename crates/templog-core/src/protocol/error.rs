//! Protocol errors

use thiserror::Error;

/// Errors raised by the link layer (discovery, exchange, transport)
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("No device answered the handshake on any port")]
    NotFound,

    #[error("Timed out waiting for the device")]
    Timeout,

    #[error("Unexpected reply from device: {0:?}")]
    UnexpectedReply(String),

    #[error("Transport fault: {0}")]
    TransportFault(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised when the connection manager cannot produce a live transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Connection failed: {reason}")]
pub struct ConnectError {
    pub reason: String,
}

impl ConnectError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<ProtocolError> for ConnectError {
    fn from(err: ProtocolError) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors from the configuration exchange
#[derive(Error, Debug)]
pub enum ConfigureError {
    #[error("Not connected: {0}")]
    NotConnected(ConnectError),

    #[error("Device did not acknowledge configuration request: {0:?}")]
    UnexpectedReply(String),

    #[error("Configuration failed: {0}")]
    Fault(String),

    #[error("Start time {0} is before the Unix epoch")]
    InvalidStartTime(i64),
}

/// Errors from the bulk log transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Not connected: {0}")]
    NotConnected(ConnectError),

    #[error("Timed out waiting for log data")]
    Timeout,

    #[error("Transfer failed: {0}")]
    Fault(String),

    #[error("Failed to write log output: {0}")]
    Sink(std::io::Error),
}
