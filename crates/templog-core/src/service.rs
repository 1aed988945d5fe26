//! Host-side entry points
//!
//! What a front end calls: find the device, query its status, arm it, and
//! pull its log into a named file.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::datalog::LogFormat;
use crate::protocol::{
    ConfigureAck, ConfigureError, ConnectError, Connection, ConnectionConfig, DeviceStatus,
    PortProvider, SerialPortProvider, TransferError, TransferSummary,
};

/// Errors from the host-side download
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a configuration request with its progress trace
#[derive(Debug)]
pub struct ConfigureReport {
    pub outcome: Result<ConfigureAck, ConfigureError>,
    pub trace: Vec<String>,
}

impl ConfigureReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A downloaded log, ready to hand to the user
#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    /// File contents
    pub content: Vec<u8>,
    /// Suggested filename, extension included
    pub filename: String,
    /// MIME type of `content`
    pub mime_type: &'static str,
    /// Where the file was written
    pub path: PathBuf,
    /// What the transfer contained
    pub summary: TransferSummary,
}

/// Validate a user-supplied filename and pick its format.
///
/// `.csv`/`.raw` select the format; anything else gets `.csv` appended.
pub fn suggested_filename(requested: &str) -> Result<(String, LogFormat), ServiceError> {
    let name = requested.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ServiceError::InvalidFilename(requested.to_string()));
    }
    match LogFormat::from_extension(Path::new(name)) {
        Some(format) => Ok((name.to_string(), format)),
        None => Ok((
            format!("{}.{}", name, LogFormat::Csv.extension()),
            LogFormat::Csv,
        )),
    }
}

/// Front-end facade over a [`Connection`]
pub struct DeviceService<P: PortProvider = SerialPortProvider> {
    connection: Connection<P>,
    download_dir: PathBuf,
}

impl DeviceService<SerialPortProvider> {
    pub fn new(config: ConnectionConfig, download_dir: impl Into<PathBuf>) -> Self {
        Self::with_connection(Connection::new(config), download_dir)
    }
}

impl<P: PortProvider> DeviceService<P> {
    pub fn with_connection(connection: Connection<P>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            connection,
            download_dir: download_dir.into(),
        }
    }

    pub fn connection(&mut self) -> &mut Connection<P> {
        &mut self.connection
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Run discovery and report the port the device answered on
    pub fn find_device(&mut self) -> Result<String, ConnectError> {
        self.connection.ensure_connected()?;
        self.connection
            .port_name()
            .map(str::to_string)
            .ok_or_else(|| ConnectError::new("connection closed after discovery"))
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn status(&mut self) -> DeviceStatus {
        self.connection.send_status_query()
    }

    /// Arm the device to start logging at `start`
    pub fn configure(
        &mut self,
        start: DateTime<Utc>,
        personal_id: &str,
        wakeup_interval: u32,
    ) -> ConfigureReport {
        let mut trace = Vec::new();
        let outcome = match u64::try_from(start.timestamp()) {
            Ok(timestamp) => self.connection.configure_traced(
                timestamp,
                personal_id,
                wakeup_interval,
                &mut trace,
            ),
            Err(_) => {
                let err = ConfigureError::InvalidStartTime(start.timestamp());
                trace.push(err.to_string());
                Err(err)
            }
        };
        ConfigureReport { outcome, trace }
    }

    /// Retrieve the log and write it to `filename` in the download directory.
    ///
    /// Nothing is written unless the whole transfer succeeds.
    pub fn download(&mut self, filename: &str) -> Result<DownloadArtifact, ServiceError> {
        let (filename, format) = suggested_filename(filename)?;

        let mut content = Vec::new();
        let summary = self.connection.download_as(&mut content, format)?;

        fs::create_dir_all(&self.download_dir)?;
        let path = self.download_dir.join(&filename);
        fs::write(&path, &content)?;
        tracing::info!("Saved log to {}", path.display());

        Ok(DownloadArtifact {
            content,
            filename,
            mime_type: format.mime_type(),
            path,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_gets_csv_extension() {
        let (name, format) = suggested_filename("Subject_1234_1.1").unwrap();
        assert_eq!(name, "Subject_1234_1.1.csv");
        assert_eq!(format, LogFormat::Csv);
    }

    #[test]
    fn test_filename_keeps_known_extension() {
        assert_eq!(
            suggested_filename(" log.RAW ").unwrap(),
            ("log.RAW".to_string(), LogFormat::Raw)
        );
        assert_eq!(
            suggested_filename("log.csv").unwrap(),
            ("log.csv".to_string(), LogFormat::Csv)
        );
    }

    #[test]
    fn test_filename_rejected() {
        for bad in ["", "   ", "../escape", "dir/file", "a\\b", ".."] {
            assert!(
                matches!(suggested_filename(bad), Err(ServiceError::InvalidFilename(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
