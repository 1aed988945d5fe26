//! # Templog Core Library
//!
//! Host-side link engine for the battery-powered temperature logger.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial port discovery via the `?` handshake
//! - Connection lifecycle with a single owned transport
//! - Status queries and the binary configuration record
//! - Bulk retrieval of the flash log as CSV
//!
//! ## Example
//!
//! ```rust,ignore
//! use templog_core::protocol::{Connection, ConnectionConfig};
//!
//! let mut conn = Connection::new(ConnectionConfig::default());
//! conn.ensure_connected()?;
//! println!("status: {}", conn.send_status_query());
//!
//! let mut csv = Vec::new();
//! let summary = conn.download(&mut csv)?;
//! println!("{} samples", summary.log.data_rows);
//! ```

pub mod datalog;
pub mod protocol;
pub mod service;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::datalog::{LogFormat, LogMetadata, LogStats};
    pub use crate::protocol::{
        ConfigRecord, ConfigureAck, ConfigureError, ConnectError, Connection, ConnectionConfig,
        ConnectionState, DeviceStatus, ProtocolError, TransferError, TransferSummary,
    };
    pub use crate::service::{ConfigureReport, DeviceService, DownloadArtifact, ServiceError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
