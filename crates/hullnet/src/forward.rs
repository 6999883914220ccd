//! Automatic port forwarding.
//!
//! The direct peer asks a [`PortForwarder`] to open its port once, on
//! start, when the settings enable it. Forwarding is best-effort: a
//! failure is logged and the server keeps running, reachable on the LAN
//! or through manual router configuration.

use std::net::SocketAddr;

use igd_next::PortMappingProtocol;
use igd_next::aio::tokio::search_gateway;

use crate::PeerError;

/// Opens a port on the local router.
pub trait PortForwarder: Send {
    fn forward(&mut self, port: u16) -> Result<(), PeerError>;
}

/// The forwarder used when none is configured. Always fails, so enabling
/// forwarding without a backend shows up in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPortForwarding;

impl PortForwarder for NoPortForwarding {
    fn forward(&mut self, port: u16) -> Result<(), PeerError> {
        Err(PeerError::PortForwarding(format!(
            "no forwarding backend configured for port {port}"
        )))
    }
}

/// Maps the port on the first UPnP gateway that answers.
///
/// Gateway discovery takes seconds, so [`forward`](PortForwarder::forward)
/// only schedules it on the current tokio runtime and returns. The
/// outcome is logged.
#[derive(Debug, Clone)]
pub struct UpnpForwarder {
    description: String,
}

impl UpnpForwarder {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl Default for UpnpForwarder {
    fn default() -> Self {
        Self::new("hullnet")
    }
}

impl PortForwarder for UpnpForwarder {
    fn forward(&mut self, port: u16) -> Result<(), PeerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PeerError::PortForwarding(format!("no async runtime: {e}")))?;
        let description = self.description.clone();
        runtime.spawn(async move {
            match map_udp_port(port, &description).await {
                Ok(local) => tracing::info!(port, %local, "UPnP port mapping added"),
                Err(e) => tracing::warn!(port, error = %e, "UPnP port mapping failed"),
            }
        });
        Ok(())
    }
}

async fn map_udp_port(port: u16, description: &str) -> Result<SocketAddr, PeerError> {
    let gateway = search_gateway(Default::default())
        .await
        .map_err(|e| PeerError::PortForwarding(format!("no gateway found: {e}")))?;

    // The address the gateway sees us on.
    let socket = tokio::net::UdpSocket::bind(("0.0.0.0", 0))
        .await
        .map_err(|e| PeerError::PortForwarding(e.to_string()))?;
    socket
        .connect(gateway.addr)
        .await
        .map_err(|e| PeerError::PortForwarding(e.to_string()))?;
    let local = SocketAddr::new(
        socket
            .local_addr()
            .map_err(|e| PeerError::PortForwarding(e.to_string()))?
            .ip(),
        port,
    );

    gateway
        .add_port(PortMappingProtocol::UDP, port, local, 0, description)
        .await
        .map_err(|e| PeerError::PortForwarding(e.to_string()))?;
    Ok(local)
}
