//! UDP transport implementation using `tokio::net::UdpSocket`.
//!
//! A background task owns the receive half of the socket and forwards
//! every datagram into an unbounded channel. [`UdpTransport::poll`] drains
//! that channel on the caller's tick, so the server loop never awaits the
//! network. Sends use `try_send_to`, which never blocks either.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::link::{LinkConfig, LinkTable};
use crate::{
    DatagramTransport, DeliveryMethod, Endpoint, Frame, LinkStatus,
    TransportError, TransportEvent,
};

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// A UDP-based [`DatagramTransport`].
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    inbox: mpsc::UnboundedReceiver<(Endpoint, Bytes)>,
    receiver: JoinHandle<()>,
    links: LinkTable,
    open: bool,
}

impl UdpTransport {
    /// Binds a new UDP transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let socket = Arc::new(socket);
        if let Ok(local) = socket.local_addr() {
            tracing::info!(%local, "UDP transport listening");
        }

        let (tx, inbox) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), tx));

        Ok(Self {
            socket,
            inbox,
            receiver,
            links: LinkTable::new(LinkConfig::default(), Instant::now()),
            open: true,
        })
    }

    fn transmit(&self, to: Endpoint, frame: &Frame) -> Result<(), TransportError> {
        self.socket
            .try_send_to(&frame.encode(), to)
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }

    fn flush(&mut self) {
        for (to, frame) in self.links.take_outbox() {
            if let Err(e) = self.transmit(to, &frame) {
                tracing::debug!(%to, error = %e, "failed to send link frame");
            }
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, tx: mpsc::UnboundedSender<(Endpoint, Bytes)>) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, from)) => {
                if tx.send((from, Bytes::copy_from_slice(&buffer[..len]))).is_err() {
                    break;
                }
            }
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms.
                tracing::debug!(error = %e, "UDP receive failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

impl DatagramTransport for UdpTransport {
    fn poll(&mut self) -> Vec<TransportEvent> {
        if !self.open {
            return Vec::new();
        }
        let now = Instant::now();
        while let Ok((from, datagram)) = self.inbox.try_recv() {
            self.links.receive(from, datagram, now);
        }
        self.links.tick(now);
        self.flush();
        self.links.take_events()
    }

    fn approve(&mut self, endpoint: Endpoint) {
        self.links.approve(endpoint);
        self.flush();
    }

    fn deny(&mut self, endpoint: Endpoint, reason: &[u8]) {
        self.links.deny(endpoint, reason);
        self.flush();
    }

    fn send(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        method: DeliveryMethod,
    ) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Shutdown);
        }
        let frame = self.links.send(endpoint, data, method, Instant::now())?;
        self.transmit(endpoint, &frame)
    }

    fn disconnect(&mut self, endpoint: Endpoint, reason: &[u8]) {
        self.links.disconnect(endpoint, reason);
        self.flush();
    }

    fn status(&self, endpoint: Endpoint) -> LinkStatus {
        self.links.status(endpoint)
    }

    fn shutdown(&mut self, reason: &[u8]) {
        if !self.open {
            return;
        }
        self.links.shutdown(reason);
        self.flush();
        self.receiver.abort();
        self.open = false;
        tracing::info!("UDP transport shut down");
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
