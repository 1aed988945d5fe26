//! Protocol commands
//!
//! Defines the opcodes understood by the logger firmware and the status tokens
//! it reports back.

use serde::{Deserialize, Serialize};

/// Single-byte opcodes sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Discovery probe ('?' command), answered with the greeting line
    Probe,

    /// Status query ('!' command), answered with a short status token
    QueryStatus,

    /// Begin configuration ('i' command), answered with `READY_FOR_INIT`
    BeginConfiguration,

    /// Retrieve the flash log ('r' command), answered with the bulk stream
    RetrieveLog,
}

impl Command {
    /// Get the opcode byte
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Probe => b'?',
            Command::QueryStatus => b'!',
            Command::BeginConfiguration => b'i',
            Command::RetrieveLog => b'r',
        }
    }

    /// Check if the reply to this command is a single text line
    pub fn expects_line(&self) -> bool {
        !matches!(self, Command::RetrieveLog)
    }
}

/// Device state as reported by the status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// No device reachable
    Disconnected,
    /// Device attached and idle
    Connected,
    /// Device answered with nothing usable, or the link faulted
    Error,
}

/// Status tokens sent by the firmware
const STATUS_TOKENS: &[(&str, DeviceStatus)] = &[
    ("CONNECTED", DeviceStatus::Connected),
    ("DISCONNECTED", DeviceStatus::Disconnected),
    ("ERROR", DeviceStatus::Error),
];

impl DeviceStatus {
    /// Map a reply line to a status.
    ///
    /// Empty and unrecognised tokens both map to [`DeviceStatus::Error`].
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() {
            return DeviceStatus::Error;
        }
        match STATUS_TOKENS.iter().find(|(t, _)| *t == token) {
            Some((_, status)) => *status,
            None => {
                tracing::warn!("unrecognised status token {:?}", token);
                DeviceStatus::Error
            }
        }
    }

    /// Token the firmware uses for this status
    pub fn token(&self) -> &'static str {
        STATUS_TOKENS
            .iter()
            .find(|(_, s)| s == self)
            .map(|(t, _)| *t)
            .unwrap_or("ERROR")
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}
