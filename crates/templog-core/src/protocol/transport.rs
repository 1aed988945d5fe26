//! Byte transport abstraction
//!
//! Everything above this layer talks to a [`Transport`], never to a serial port
//! directly, so the engine can be driven by scripted transports in tests.

use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use super::Command;

/// Byte-oriented channel to the device
pub trait Transport: Read + Write + Send {
    /// Port name (e.g. "/dev/ttyACM0" or "COM3")
    fn name(&self) -> &str;

    /// Current read timeout
    fn timeout(&self) -> Duration;

    /// Set the read timeout. A read blocks at most this long before
    /// returning `ErrorKind::TimedOut`.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard anything already received
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Swaps in a read timeout and puts the previous one back when dropped
pub struct TimeoutGuard<'a> {
    transport: &'a mut dyn Transport,
    original: Duration,
}

impl<'a> TimeoutGuard<'a> {
    pub fn new(transport: &'a mut dyn Transport, timeout: Duration) -> io::Result<Self> {
        let original = transport.timeout();
        transport.set_timeout(timeout)?;
        Ok(Self {
            transport,
            original,
        })
    }
}

impl<'a> Deref for TimeoutGuard<'a> {
    type Target = dyn Transport + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.transport
    }
}

impl<'a> DerefMut for TimeoutGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.transport
    }
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.transport.set_timeout(self.original) {
            tracing::warn!(
                "failed to restore read timeout on {}: {}",
                self.transport.name(),
                e
            );
        }
    }
}

/// Read errors that only mean "nothing arrived yet"
pub fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Send a single opcode byte
pub fn send_command(transport: &mut dyn Transport, cmd: Command) -> io::Result<()> {
    tracing::debug!(
        "send_command: {:?} (0x{:02x}) on {}",
        cmd,
        cmd.opcode(),
        transport.name()
    );
    transport.write_all(&[cmd.opcode()])?;
    transport.flush()
}

/// Read one line, waiting at most `timeout` for the line break.
///
/// Returns the trimmed text. A line that never completes yields whatever
/// arrived before the deadline, which is empty when the device stayed silent.
pub fn read_line(transport: &mut dyn Transport, timeout: Duration) -> io::Result<String> {
    let mut port = TimeoutGuard::new(transport, timeout)?;
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while Instant::now() < deadline {
        match port.read(&mut byte) {
            Ok(0) => {}
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(ref e) if is_idle(e) => {}
            Err(e) => return Err(e),
        }
    }

    let text = String::from_utf8_lossy(&line).trim().to_string();
    tracing::debug!("read_line: {:?}", text);
    Ok(text)
}
