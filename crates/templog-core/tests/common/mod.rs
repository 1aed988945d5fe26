//! Scripted serial device shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use templog_core::protocol::{ConnectionConfig, PortInfo, PortProvider, ProtocolError, Transport};

/// Route library logs to the test harness; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with millisecond delays so tests never wait on real device timings
pub fn fast_config() -> ConnectionConfig {
    init_tracing();
    ConnectionConfig {
        open_timeout_ms: 40,
        reset_delay_ms: 0,
        release_delay_ms: 0,
        command_timeout_ms: 40,
        settle_delay_ms: 0,
        ack_timeout_ms: 40,
        bulk_timeout_ms: 80,
        ..ConnectionConfig::default()
    }
}

/// How a scripted device reacts to what the host writes
#[derive(Clone, Default)]
pub struct DeviceScript {
    /// Chunks queued for reading after an opcode is written
    replies: HashMap<u8, Vec<Vec<u8>>>,
    /// Chunks queued after the configuration record is written
    record_reply: Vec<Vec<u8>>,
    /// Fault returned when writing an opcode
    opcode_faults: HashMap<u8, (io::ErrorKind, String)>,
    /// Fault returned when writing the configuration record
    record_fault: Option<(io::ErrorKind, String)>,
}

impl DeviceScript {
    /// Answers the handshake like the logger
    pub fn logger() -> Self {
        Self::default().reply(b'?', &[b"Hello World!\r\n"])
    }

    /// Opens fine but never says anything
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn reply(mut self, opcode: u8, chunks: &[&[u8]]) -> Self {
        self.replies
            .insert(opcode, chunks.iter().map(|c| c.to_vec()).collect());
        self
    }

    pub fn record_reply(mut self, chunks: &[&[u8]]) -> Self {
        self.record_reply = chunks.iter().map(|c| c.to_vec()).collect();
        self
    }

    pub fn fail_opcode(mut self, opcode: u8, kind: io::ErrorKind, msg: &str) -> Self {
        self.opcode_faults.insert(opcode, (kind, msg.to_string()));
        self
    }

    pub fn fail_record(mut self, kind: io::ErrorKind, msg: &str) -> Self {
        self.record_fault = Some((kind, msg.to_string()));
        self
    }
}

/// Observable state of one scripted port, shared with the test
#[derive(Default)]
pub struct PortState {
    pub written: Mutex<Vec<u8>>,
    pub open: AtomicBool,
    pub opens: AtomicUsize,
    pub timeout: Mutex<Duration>,
}

impl PortState {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap()
    }
}

pub struct MockSerial {
    name: String,
    script: DeviceScript,
    rx: VecDeque<Vec<u8>>,
    state: Arc<PortState>,
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(front) = self.rx.front_mut() else {
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::ErrorKind::TimedOut.into());
        };
        let n = buf.len().min(front.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.drain(..n);
        if front.is_empty() {
            self.rx.pop_front();
        }
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let fault = if buf.len() == 1 {
            self.script.opcode_faults.get(&buf[0]).cloned()
        } else {
            self.script.record_fault.clone()
        };
        if let Some((kind, msg)) = fault {
            return Err(io::Error::new(kind, msg));
        }

        self.state.written.lock().unwrap().extend_from_slice(buf);
        let replies = if buf.len() == 1 {
            self.script.replies.get(&buf[0]).cloned().unwrap_or_default()
        } else {
            self.script.record_reply.clone()
        };
        self.rx.extend(replies);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockSerial {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.state.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        *self.state.timeout.lock().unwrap() = timeout;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.rx.front().map(|c| c.len() as u32).unwrap_or(0))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

impl Drop for MockSerial {
    fn drop(&mut self) {
        self.state.open.store(false, Ordering::SeqCst);
    }
}

/// Port list of scripted devices; `None` ports refuse to open
#[derive(Default)]
pub struct MockProvider {
    ports: Vec<(String, Option<DeviceScript>, Arc<PortState>)>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, name: &str, script: DeviceScript) -> Self {
        self.ports
            .push((name.to_string(), Some(script), Arc::new(PortState::default())));
        self
    }

    pub fn unopenable(mut self, name: &str) -> Self {
        self.ports
            .push((name.to_string(), None, Arc::new(PortState::default())));
        self
    }

    pub fn state(&self, name: &str) -> Arc<PortState> {
        self.ports
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, s)| Arc::clone(s))
            .expect("unknown port")
    }
}

impl PortProvider for MockProvider {
    fn list_ports(&self) -> Vec<PortInfo> {
        self.ports
            .iter()
            .map(|(name, _, _)| PortInfo::named(name.clone()))
            .collect()
    }

    fn open(
        &self,
        port: &PortInfo,
        _baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProtocolError> {
        let (name, script, state) = self
            .ports
            .iter()
            .find(|(n, _, _)| *n == port.name)
            .ok_or_else(|| ProtocolError::TransportFault(format!("no port {}", port.name)))?;
        let script = script
            .clone()
            .ok_or_else(|| ProtocolError::TransportFault(format!("{}: access denied", name)))?;

        state.open.store(true, Ordering::SeqCst);
        state.opens.fetch_add(1, Ordering::SeqCst);
        *state.timeout.lock().unwrap() = timeout;

        Ok(Box::new(MockSerial {
            name: name.clone(),
            script,
            rx: VecDeque::new(),
            state: Arc::clone(state),
        }))
    }
}
