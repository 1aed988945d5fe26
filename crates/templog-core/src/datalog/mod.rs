//! Data Logging
//!
//! Turns the line stream of a bulk transfer into the persisted log file.

mod format;

pub use format::{
    render_epoch, LogFormat, LogLine, LogWriter, Section, DATA_HEADER,
    INITIAL_TIMESTAMP_PREFIX, PERSONAL_ID_PREFIX, TIMESTAMP_FORMAT, WAKEUP_INTERVAL_PREFIX,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata prologue of the device log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetadata {
    /// Start of logging
    pub initial_timestamp: Option<DateTime<Utc>>,
    /// Seconds between samples
    pub wakeup_interval: Option<u32>,
    /// Identifier the device was armed with
    pub personal_id: Option<String>,
}

/// What a finished log contained
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    /// Parsed metadata prologue
    pub metadata: LogMetadata,
    /// Lines written before the data header
    pub metadata_lines: usize,
    /// Rows whose epoch field was converted
    pub data_rows: usize,
    /// Data-section lines written unchanged
    pub passthrough_lines: usize,
    /// Lines dropped because they were not valid text
    pub skipped_lines: usize,
    /// Time of the first converted row
    pub first_sample: Option<DateTime<Utc>>,
    /// Time of the last converted row
    pub last_sample: Option<DateTime<Utc>>,
}
