//! Log file formats
//!
//! Classifies device lines into the metadata prologue and the data section and
//! writes them out, rewriting epoch fields as UTC calendar time for CSV.

use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::path::Path;

use super::{LogMetadata, LogStats};

/// Header line that opens the data section
pub const DATA_HEADER: &str = "Timestamp,Temperature";

/// Metadata line carrying the start time in epoch seconds
pub const INITIAL_TIMESTAMP_PREFIX: &str = "Initial Timestamp,";

/// Metadata line carrying the sampling interval in seconds
pub const WAKEUP_INTERVAL_PREFIX: &str = "Wake-up Interval,";

/// Metadata line carrying the identifier
pub const PERSONAL_ID_PREFIX: &str = "Personal ID,";

/// Rendering of converted epoch fields
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Supported log file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Comma-separated values with calendar timestamps
    Csv,
    /// Device lines as received
    Raw,
}

impl LogFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(LogFormat::Csv),
            "raw" => Some(LogFormat::Raw),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Csv => "csv",
            LogFormat::Raw => "raw",
        }
    }

    /// MIME type offered to the host
    pub fn mime_type(&self) -> &'static str {
        match self {
            LogFormat::Csv => "text/csv",
            LogFormat::Raw => "application/octet-stream",
        }
    }
}

/// Part of the log stream being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Metadata,
    Data,
}

/// A classified device line, already rewritten where it applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// Prologue line
    Metadata(String),
    /// The data header; switches to the data section
    Header,
    /// Converted (epoch, temperature) row
    Row {
        text: String,
        time: DateTime<Utc>,
    },
    /// Data-section line that is not a sample
    Passthrough(String),
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS` UTC, if `field` is all digits and
/// names a representable instant
pub fn render_epoch(field: &str) -> Option<String> {
    parse_epoch(field).map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

fn parse_epoch(field: &str) -> Option<DateTime<Utc>> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = field.parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Two-state line classifier
#[derive(Debug)]
struct Classifier {
    section: Section,
    metadata: LogMetadata,
}

impl Classifier {
    fn new() -> Self {
        Self {
            section: Section::Metadata,
            metadata: LogMetadata::default(),
        }
    }

    fn classify(&mut self, line: &str) -> LogLine {
        match self.section {
            Section::Metadata => self.classify_metadata(line),
            Section::Data => classify_data(line),
        }
    }

    fn classify_metadata(&mut self, line: &str) -> LogLine {
        if line == DATA_HEADER {
            self.section = Section::Data;
            return LogLine::Header;
        }

        if let Some(rest) = line.strip_prefix(INITIAL_TIMESTAMP_PREFIX) {
            if let Some(time) = parse_epoch(rest.trim()) {
                self.metadata.initial_timestamp = Some(time);
                return LogLine::Metadata(format!(
                    "{}{}",
                    INITIAL_TIMESTAMP_PREFIX,
                    time.format(TIMESTAMP_FORMAT)
                ));
            }
        } else if let Some(rest) = line.strip_prefix(WAKEUP_INTERVAL_PREFIX) {
            self.metadata.wakeup_interval = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix(PERSONAL_ID_PREFIX) {
            self.metadata.personal_id = Some(rest.trim().to_string());
        }
        LogLine::Metadata(line.to_string())
    }
}

fn classify_data(line: &str) -> LogLine {
    if let Some((epoch, rest)) = line.split_once(',') {
        if let Some(time) = parse_epoch(epoch) {
            return LogLine::Row {
                text: format!("{},{}", time.format(TIMESTAMP_FORMAT), rest),
                time,
            };
        }
    }
    LogLine::Passthrough(line.to_string())
}

/// Streams classified lines into a sink.
///
/// Metadata lines are written in arrival order, followed by one blank line
/// (only when there was metadata), the data header and the rows.
pub struct LogWriter<W: Write> {
    sink: W,
    format: LogFormat,
    classifier: Classifier,
    stats: LogStats,
}

impl<W: Write> LogWriter<W> {
    pub fn new(sink: W, format: LogFormat) -> Self {
        Self {
            sink,
            format,
            classifier: Classifier::new(),
            stats: LogStats::default(),
        }
    }

    /// Current section of the stream
    pub fn section(&self) -> Section {
        self.classifier.section
    }

    /// Write one raw device line (without its line break).
    ///
    /// Lines that are not valid UTF-8 are skipped with a warning.
    pub fn write_line(&mut self, raw: &[u8]) -> io::Result<()> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(e) => {
                tracing::warn!("Skipping undecodable log line ({} bytes): {}", raw.len(), e);
                self.stats.skipped_lines += 1;
                return Ok(());
            }
        };
        if line.trim().is_empty() {
            return Ok(());
        }

        let classified = self.classifier.classify(line);
        let converted = self.format == LogFormat::Csv;
        match classified {
            LogLine::Metadata(text) => {
                self.stats.metadata_lines += 1;
                let out = if converted { text.as_str() } else { line };
                writeln!(self.sink, "{}", out)
            }
            LogLine::Header => {
                if self.stats.metadata_lines > 0 {
                    writeln!(self.sink)?;
                }
                writeln!(self.sink, "{}", DATA_HEADER)
            }
            LogLine::Row { text, time } => {
                self.stats.data_rows += 1;
                self.stats.first_sample.get_or_insert(time);
                self.stats.last_sample = Some(time);
                let out = if converted { text.as_str() } else { line };
                writeln!(self.sink, "{}", out)
            }
            LogLine::Passthrough(text) => {
                tracing::debug!("write_line: passing through {:?}", text);
                self.stats.passthrough_lines += 1;
                writeln!(self.sink, "{}", text)
            }
        }
    }

    /// Flush the sink and hand it back with the collected statistics
    pub fn finish(mut self) -> io::Result<(W, LogStats)> {
        self.sink.flush()?;
        self.stats.metadata = self.classifier.metadata;
        Ok((self.sink, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(lines: &[&[u8]], format: LogFormat) -> (String, LogStats) {
        let mut writer = LogWriter::new(Vec::new(), format);
        for line in lines {
            writer.write_line(line).unwrap();
        }
        let (bytes, stats) = writer.finish().unwrap();
        (String::from_utf8(bytes).unwrap(), stats)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            LogFormat::from_extension(Path::new("log.csv")),
            Some(LogFormat::Csv)
        );
        assert_eq!(
            LogFormat::from_extension(Path::new("LOG.RAW")),
            Some(LogFormat::Raw)
        );
        assert_eq!(LogFormat::from_extension(Path::new("log.txt")), None);
        assert_eq!(LogFormat::Csv.mime_type(), "text/csv");
    }

    #[test]
    fn test_render_epoch() {
        assert_eq!(
            render_epoch("1700000000").as_deref(),
            Some("2023-11-14 22:13:20")
        );
        assert_eq!(render_epoch("0").as_deref(), Some("1970-01-01 00:00:00"));
        assert_eq!(render_epoch(""), None);
        assert_eq!(render_epoch("-5"), None);
        assert_eq!(render_epoch("12a"), None);
        assert_eq!(render_epoch("99999999999999999999999"), None);
    }

    #[test]
    fn test_metadata_then_data() {
        let (csv, stats) = render(
            &[
                b"Initial Timestamp,1700000000",
                b"Wake-up Interval,300",
                b"Personal ID,subject_7",
                b"Timestamp,Temperature",
                b"1700000300,21.5",
                b"1700000600,21.75",
            ],
            LogFormat::Csv,
        );

        assert_eq!(
            csv,
            "Initial Timestamp,2023-11-14 22:13:20\n\
             Wake-up Interval,300\n\
             Personal ID,subject_7\n\
             \n\
             Timestamp,Temperature\n\
             2023-11-14 22:18:20,21.5\n\
             2023-11-14 22:23:20,21.75\n"
        );
        assert_eq!(stats.metadata_lines, 3);
        assert_eq!(stats.data_rows, 2);
        assert_eq!(stats.metadata.wakeup_interval, Some(300));
        assert_eq!(stats.metadata.personal_id.as_deref(), Some("subject_7"));
        assert_eq!(
            stats.metadata.initial_timestamp,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
        assert_eq!(stats.first_sample, DateTime::from_timestamp(1_700_000_300, 0));
        assert_eq!(stats.last_sample, DateTime::from_timestamp(1_700_000_600, 0));
    }

    #[test]
    fn test_no_blank_line_without_metadata() {
        let (csv, _) = render(&[b"Timestamp,Temperature", b"5,20.0"], LogFormat::Csv);
        assert_eq!(csv, "Timestamp,Temperature\n1970-01-01 00:00:05,20.0\n");
    }

    #[test]
    fn test_non_numeric_initial_timestamp_unchanged() {
        let (csv, stats) = render(&[b"Initial Timestamp,unset"], LogFormat::Csv);
        assert_eq!(csv, "Initial Timestamp,unset\n");
        assert_eq!(stats.metadata.initial_timestamp, None);
    }

    #[test]
    fn test_malformed_data_line_passes_through() {
        let (csv, stats) = render(
            &[
                b"Timestamp,Temperature",
                b"sensor glitch,??",
                b"1700000300",
                b"1700000300,21.5",
            ],
            LogFormat::Csv,
        );
        assert_eq!(
            csv,
            "Timestamp,Temperature\nsensor glitch,??\n1700000300\n2023-11-14 22:18:20,21.5\n"
        );
        assert_eq!(stats.passthrough_lines, 2);
        assert_eq!(stats.data_rows, 1);
    }

    #[test]
    fn test_rows_before_header_are_metadata() {
        let (csv, stats) = render(&[b"1700000300,21.5"], LogFormat::Csv);
        assert_eq!(csv, "1700000300,21.5\n");
        assert_eq!(stats.metadata_lines, 1);
        assert_eq!(stats.data_rows, 0);
    }

    #[test]
    fn test_undecodable_line_skipped() {
        let (csv, stats) = render(
            &[b"Timestamp,Temperature", &[0xFF, 0xFE, b',', b'1'], b"60,19.0"],
            LogFormat::Csv,
        );
        assert_eq!(csv, "Timestamp,Temperature\n1970-01-01 00:01:00,19.0\n");
        assert_eq!(stats.skipped_lines, 1);
    }

    #[test]
    fn test_carriage_returns_and_blank_lines() {
        let (csv, _) = render(
            &[b"Personal ID,7\r", b"", b"\r", b"Timestamp,Temperature\r", b"60,19.0\r"],
            LogFormat::Csv,
        );
        assert_eq!(
            csv,
            "Personal ID,7\n\nTimestamp,Temperature\n1970-01-01 00:01:00,19.0\n"
        );
    }

    #[test]
    fn test_raw_format_keeps_epochs() {
        let (raw, stats) = render(
            &[
                b"Initial Timestamp,1700000000",
                b"Timestamp,Temperature",
                b"1700000300,21.5",
            ],
            LogFormat::Raw,
        );
        assert_eq!(
            raw,
            "Initial Timestamp,1700000000\n\nTimestamp,Temperature\n1700000300,21.5\n"
        );
        assert_eq!(stats.data_rows, 1);
    }
}
