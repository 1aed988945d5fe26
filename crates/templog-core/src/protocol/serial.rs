//! Serial port handling
//!
//! Provides port enumeration and the serial-backed [`Transport`].

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashSet;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{ProtocolError, Transport};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Sort key for device nodes found outside the serialport API:
/// ttyACM* first, then ttyUSB*, each numerically by suffix
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// Keep the OS enumeration order, then append extra nodes it did not report
fn merge_ports(reported: Vec<PortInfo>, mut extra: Vec<String>) -> Vec<PortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports = Vec::with_capacity(reported.len() + extra.len());

    for port in reported {
        if seen.insert(port.name.clone()) {
            ports.push(port);
        }
    }

    extra.sort_by_key(|name| port_sort_key(name));
    for name in extra {
        if seen.insert(name.clone()) {
            ports.push(PortInfo::named(name));
        }
    }
    ports
}

/// List all available serial ports in OS enumeration order
pub fn list_ports() -> Vec<PortInfo> {
    let reported: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();

    #[allow(unused_mut)]
    let mut extra = Vec::new();

    // Linux-only: pick up CDC/USB-serial nodes the API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    extra.push(format!("/dev/{}", fname));
                }
            }
        }
    }

    merge_ports(reported, extra)
}

/// Source of candidate ports and the transports opened on them
pub trait PortProvider {
    /// Candidate ports, in the order they should be probed
    fn list_ports(&self) -> Vec<PortInfo>;

    /// Open a port with the given baud rate and read timeout
    fn open(
        &self,
        port: &PortInfo,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProtocolError>;
}

/// Ports of the host OS, opened through the `serialport` crate
#[derive(Debug, Clone, Default)]
pub struct SerialPortProvider {
    /// Restrict discovery to this port instead of enumerating
    pub pinned: Option<String>,
}

impl SerialPortProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only ever probe `name`
    pub fn pinned(name: impl Into<String>) -> Self {
        Self {
            pinned: Some(name.into()),
        }
    }
}

impl PortProvider for SerialPortProvider {
    fn list_ports(&self) -> Vec<PortInfo> {
        match &self.pinned {
            Some(name) => vec![PortInfo::named(name.clone())],
            None => list_ports(),
        }
    }

    fn open(
        &self,
        port: &PortInfo,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, ProtocolError> {
        let transport = SerialTransport::open(&port.name, baud_rate, timeout)?;
        Ok(Box::new(transport))
    }
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `name` as 8N1 without flow control
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ProtocolError> {
        let mut port = serialport::new(name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;

        // DTR high lets the board see a host on the line
        if let Err(e) = port.write_data_terminal_ready(true) {
            tracing::debug!("open: failed to set DTR on {}: {} (continuing)", name, e);
        }

        tracing::debug!("open: {} at {} baud", name, baud_rate);
        Ok(Self {
            name: name.to_string(),
            port,
        })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        tracing::debug!("close: {}", self.name);
    }
}
