//! Bulk log transfer
//!
//! After the `r` opcode the device streams its metadata prologue and data
//! rows, then the literal `END_DATA`. Reads arrive in arbitrary pieces, so the
//! terminator may be split across two reads; it is searched for in everything
//! received but not yet consumed, never in the newest chunk alone.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::transport::{is_idle, send_command, TimeoutGuard};
use super::{Command, Connection, PortProvider, TransferError, Transport, END_OF_DATA};
use crate::datalog::{LogFormat, LogStats, LogWriter};

/// Result of a completed transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// What the written log contained
    pub log: LogStats,
    /// Bytes read from the device, terminator included
    pub bytes_received: usize,
}

/// Reassembles lines and the end marker from arbitrarily split reads.
///
/// Only the trailing incomplete line is kept between pushes.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    complete: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end marker has been seen
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Bytes held back waiting for a line break
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Append a chunk and return every line that is now complete, without
    /// line breaks. Once the end marker shows up, everything before it is
    /// returned and later input is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        if self.complete {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        if let Some(pos) = find_marker(&self.buffer, END_OF_DATA) {
            self.complete = true;
            self.buffer.truncate(pos);
            let payload = std::mem::take(&mut self.buffer);
            return split_lines(&payload);
        }

        match self.buffer.iter().rposition(|&b| b == b'\n') {
            Some(last) => {
                let tail = self.buffer.split_off(last + 1);
                let done = std::mem::replace(&mut self.buffer, tail);
                split_lines(&done[..last])
            }
            None => Vec::new(),
        }
    }
}

fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || haystack.len() < marker.len() {
        return None;
    }
    haystack.windows(marker.len()).position(|w| w == marker)
}

fn split_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect()
}

fn fault(err: io::Error) -> TransferError {
    TransferError::Fault(err.to_string())
}

impl<P: PortProvider> Connection<P> {
    /// Retrieve the device log as CSV into `sink`.
    ///
    /// A failed transfer leaves partial output in `sink`; callers that persist
    /// it should buffer and discard on error. Transport faults and timeouts
    /// drop the connection.
    pub fn download<W: Write>(&mut self, sink: W) -> Result<TransferSummary, TransferError> {
        self.download_as(sink, LogFormat::Csv)
    }

    /// [`Connection::download`] with a chosen output format
    pub fn download_as<W: Write>(
        &mut self,
        sink: W,
        format: LogFormat,
    ) -> Result<TransferSummary, TransferError> {
        let bulk_timeout = self.config().bulk_timeout();
        let chunk_size = self.config().chunk_size.max(1);

        let transport = self
            .live_transport()
            .map_err(TransferError::NotConnected)?;
        let result = receive_log(transport, sink, format, bulk_timeout, chunk_size);

        match &result {
            Ok(summary) => tracing::info!(
                "Log retrieved: {} rows, {} bytes",
                summary.log.data_rows,
                summary.bytes_received
            ),
            Err(TransferError::Timeout) | Err(TransferError::Fault(_)) => {
                tracing::warn!("Transfer aborted, dropping connection");
                self.disconnect();
            }
            Err(e) => tracing::warn!("Transfer failed: {}", e),
        }
        result
    }
}

/// Run the `r` exchange with the bulk read timeout in place
fn receive_log<W: Write>(
    transport: &mut dyn Transport,
    sink: W,
    format: LogFormat,
    bulk_timeout: Duration,
    chunk_size: usize,
) -> Result<TransferSummary, TransferError> {
    let mut port = TimeoutGuard::new(transport, bulk_timeout).map_err(fault)?;
    port.clear_input_buffer().map_err(fault)?;
    send_command(&mut *port, Command::RetrieveLog).map_err(fault)?;
    tracing::info!("Retrieving log from {}", port.name());

    let mut writer = LogWriter::new(sink, format);
    let mut assembler = LineAssembler::new();
    let mut chunk = vec![0u8; chunk_size];
    let mut bytes_received = 0usize;
    let mut last_progress = Instant::now();

    while !assembler.is_complete() {
        let available = port.bytes_to_read().map_err(fault)? as usize;
        let want = available.clamp(1, chunk_size);

        let n = match port.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(ref e) if is_idle(e) => 0,
            Err(e) => return Err(fault(e)),
        };

        if n == 0 {
            if last_progress.elapsed() >= bulk_timeout {
                tracing::warn!(
                    "No log data for {}ms ({} bytes so far)",
                    bulk_timeout.as_millis(),
                    bytes_received
                );
                return Err(TransferError::Timeout);
            }
            continue;
        }

        last_progress = Instant::now();
        bytes_received += n;
        for line in assembler.push(&chunk[..n]) {
            writer.write_line(&line).map_err(TransferError::Sink)?;
        }
    }

    let (_, log) = writer.finish().map_err(TransferError::Sink)?;
    Ok(TransferSummary {
        log,
        bytes_received,
    })
}
