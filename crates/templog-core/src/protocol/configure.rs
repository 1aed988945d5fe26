//! Configuration exchange
//!
//! `i` → `READY_FOR_INIT` → 28-byte record → optional acknowledgement. The
//! firmware powers down as soon as it has stored the record, so a silent or
//! vanishing device after the record is the normal ending, not a failure.

use std::io::{self, Write};

use super::record::{ConfigRecord, RECORD_LEN};
use super::transport::{read_line, send_command};
use super::{Command, ConfigureError, Connection, PortProvider, Transport, READY_FOR_INIT};

/// Outcome of a link step that the device may cut short by powering off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome<T> {
    /// The step completed
    Delivered(T),
    /// The device went away in the way it does when it shuts itself down
    ExpectedDisconnect(String),
}

impl<T> LinkOutcome<T> {
    /// Split an I/O result into the two outcomes, leaving other faults as errors
    pub fn from_io(result: io::Result<T>) -> io::Result<Self> {
        match result {
            Ok(value) => Ok(LinkOutcome::Delivered(value)),
            Err(e) if is_expected_shutdown(&e) => Ok(LinkOutcome::ExpectedDisconnect(e.to_string())),
            Err(e) => Err(e),
        }
    }
}

/// Error descriptions the OS produces when the board drops off the bus
const SHUTDOWN_SIGNATURES: &[&str] = &[
    "permission",
    "access is denied",
    "device not recognized",
    "does not recognize the command",
    "device disconnected",
    "device has been disconnected",
    "no such device",
    "clearcommerror",
];

/// Whether a transport fault looks like the device powering itself off
pub fn is_expected_shutdown(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
    ) {
        return true;
    }
    let text = err.to_string().to_ascii_lowercase();
    SHUTDOWN_SIGNATURES.iter().any(|sig| text.contains(sig))
}

/// Successful configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureAck {
    /// Record that was sent
    pub record: ConfigRecord,
    /// Final line from the device, if it managed to send one
    pub acknowledgement: Option<String>,
    /// Fault description when the device vanished after the record
    pub shutdown: Option<String>,
    /// The requested timestamp did not fit in 32 bits
    pub timestamp_wrapped: bool,
}

fn note(trace: &mut Vec<String>, message: String) {
    tracing::info!("{}", message);
    trace.push(message);
}

impl<P: PortProvider> Connection<P> {
    /// Arm the device with a start time, identifier and sampling interval.
    ///
    /// The connection is always released afterwards, whatever the outcome.
    pub fn configure(
        &mut self,
        timestamp: u64,
        personal_id: &str,
        wakeup_interval: u32,
    ) -> Result<ConfigureAck, ConfigureError> {
        let mut trace = Vec::new();
        self.configure_traced(timestamp, personal_id, wakeup_interval, &mut trace)
    }

    /// [`Connection::configure`], appending human-readable progress to `trace`
    pub fn configure_traced(
        &mut self,
        timestamp: u64,
        personal_id: &str,
        wakeup_interval: u32,
        trace: &mut Vec<String>,
    ) -> Result<ConfigureAck, ConfigureError> {
        let result = self.run_configure(timestamp, personal_id, wakeup_interval, trace);
        if let Err(e) = &result {
            tracing::warn!("Configuration failed: {}", e);
            trace.push(e.to_string());
        }
        self.disconnect();
        result
    }

    fn run_configure(
        &mut self,
        timestamp: u64,
        personal_id: &str,
        wakeup_interval: u32,
        trace: &mut Vec<String>,
    ) -> Result<ConfigureAck, ConfigureError> {
        let settle_delay = self.config().settle_delay();
        let reply_timeout = self.config().command_timeout();
        let ack_timeout = self.config().ack_timeout();

        let transport = self
            .live_transport()
            .map_err(ConfigureError::NotConnected)?;
        note(trace, format!("Connected on {}", transport.name()));

        let timestamp_wrapped = timestamp > u64::from(u32::MAX);
        if timestamp_wrapped {
            tracing::warn!(
                "Timestamp {} exceeds 32 bits; the device receives only the low 32 bits",
                timestamp
            );
            trace.push(format!(
                "Warning: timestamp {} truncated to 32 bits",
                timestamp
            ));
        }

        let reply = request_ready(transport, settle_delay, reply_timeout)
            .map_err(|e| ConfigureError::Fault(e.to_string()))?;
        if reply != READY_FOR_INIT {
            return Err(ConfigureError::UnexpectedReply(reply));
        }
        note(trace, "Device ready for configuration".to_string());

        let record = ConfigRecord::new(timestamp, personal_id, wakeup_interval);
        note(
            trace,
            format!(
                "Sending record: timestamp={} interval={}s id={:?} checksum={:#010x}",
                record.timestamp,
                record.wakeup_interval,
                record.personal_id_text(),
                record.checksum()
            ),
        );

        let outcome = LinkOutcome::from_io(send_record(transport, &record.to_bytes(), ack_timeout))
            .map_err(|e| ConfigureError::Fault(e.to_string()))?;

        let ack = match outcome {
            LinkOutcome::Delivered(Some(line)) => {
                note(trace, format!("Device acknowledged: {}", line));
                ConfigureAck {
                    record,
                    acknowledgement: Some(line),
                    shutdown: None,
                    timestamp_wrapped,
                }
            }
            LinkOutcome::Delivered(None) => {
                note(
                    trace,
                    "No acknowledgement; device powered down to start logging".to_string(),
                );
                ConfigureAck {
                    record,
                    acknowledgement: None,
                    shutdown: None,
                    timestamp_wrapped,
                }
            }
            LinkOutcome::ExpectedDisconnect(reason) => {
                note(
                    trace,
                    format!("Device disconnected after receiving the record ({})", reason),
                );
                ConfigureAck {
                    record,
                    acknowledgement: None,
                    shutdown: Some(reason),
                    timestamp_wrapped,
                }
            }
        };
        Ok(ack)
    }
}

/// Send `i` and read the reply after the settle delay
fn request_ready(
    transport: &mut dyn Transport,
    settle_delay: std::time::Duration,
    timeout: std::time::Duration,
) -> io::Result<String> {
    transport.clear_input_buffer()?;
    send_command(transport, Command::BeginConfiguration)?;
    std::thread::sleep(settle_delay);
    read_line(transport, timeout)
}

/// Write the record in one transmission and wait for an optional reply
fn send_record(
    transport: &mut dyn Transport,
    bytes: &[u8; RECORD_LEN],
    ack_timeout: std::time::Duration,
) -> io::Result<Option<String>> {
    transport.write_all(bytes)?;
    transport.flush()?;
    let ack = read_line(transport, ack_timeout)?;
    Ok(if ack.is_empty() { None } else { Some(ack) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(kind: io::ErrorKind, msg: &str) -> io::Error {
        io::Error::new(kind, msg.to_string())
    }

    #[test]
    fn test_shutdown_signatures() {
        assert!(is_expected_shutdown(&fault(
            io::ErrorKind::Other,
            "ClearCommError failed"
        )));
        assert!(is_expected_shutdown(&fault(
            io::ErrorKind::Other,
            "A device attached to the system is not functioning. The device does not recognize the command."
        )));
        assert!(is_expected_shutdown(&fault(
            io::ErrorKind::Other,
            "Device disconnected"
        )));
        assert!(is_expected_shutdown(&fault(
            io::ErrorKind::PermissionDenied,
            "could not open port"
        )));
        assert!(is_expected_shutdown(&fault(
            io::ErrorKind::Other,
            "No such device (os error 19)"
        )));
    }

    #[test]
    fn test_genuine_faults_are_not_shutdown() {
        assert!(!is_expected_shutdown(&fault(
            io::ErrorKind::InvalidInput,
            "invalid baud rate"
        )));
        assert!(!is_expected_shutdown(&fault(io::ErrorKind::Other, "parity error")));
    }

    #[test]
    fn test_link_outcome_from_io() {
        assert_eq!(
            LinkOutcome::from_io(Ok(3)).unwrap(),
            LinkOutcome::Delivered(3)
        );
        let vanished: io::Result<()> = Err(fault(io::ErrorKind::Other, "ClearCommError failed"));
        assert!(matches!(
            LinkOutcome::from_io(vanished),
            Ok(LinkOutcome::ExpectedDisconnect(_))
        ));
        let broken: io::Result<()> = Err(fault(io::ErrorKind::InvalidData, "framing error"));
        assert!(LinkOutcome::from_io(broken).is_err());
    }
}
