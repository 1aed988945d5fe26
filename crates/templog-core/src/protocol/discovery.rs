//! Device discovery
//!
//! Probes every candidate port with the `?` handshake and keeps the first one
//! that greets back.

use super::transport::{read_line, send_command};
use super::{
    Command, ConnectionConfig, PortInfo, PortProvider, ProtocolError, Transport,
    HANDSHAKE_GREETING,
};

/// Find the logger among the ports offered by `provider`.
///
/// Ports are tried in the order the provider lists them and the first port
/// that answers the probe with the greeting is returned still open. Ports that
/// fail to open, fault during the probe, or answer anything else are closed
/// and skipped.
pub fn find_device<P: PortProvider + ?Sized>(
    provider: &P,
    config: &ConnectionConfig,
) -> Result<Box<dyn Transport>, ProtocolError> {
    let ports = provider.list_ports();
    tracing::debug!("find_device: {} candidate port(s)", ports.len());

    for port in &ports {
        match probe_port(provider, port, config) {
            Ok(Some(transport)) => {
                tracing::info!("Device found on {}", port.name);
                return Ok(transport);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("find_device: skipping {}: {}", port.name, e);
            }
        }
    }

    tracing::warn!("No device answered the handshake");
    Err(ProtocolError::NotFound)
}

/// Open `port` and run the handshake. `Ok(None)` means the port answered but
/// is not the logger; the transport is closed on every path except a match.
fn probe_port<P: PortProvider + ?Sized>(
    provider: &P,
    port: &PortInfo,
    config: &ConnectionConfig,
) -> Result<Option<Box<dyn Transport>>, ProtocolError> {
    let mut transport = provider.open(port, config.baud_rate, config.open_timeout())?;

    // Opening the port resets the board
    std::thread::sleep(config.reset_delay());
    transport.clear_input_buffer()?;

    send_command(transport.as_mut(), Command::Probe)?;
    let reply = read_line(transport.as_mut(), config.open_timeout())?;

    if reply == HANDSHAKE_GREETING {
        Ok(Some(transport))
    } else {
        tracing::debug!("probe_port: {} replied {:?}", port.name, reply);
        Ok(None)
    }
}
