//! In-process transport.
//!
//! A [`MemoryNetwork`] is a switchboard of mailboxes keyed by socket
//! address. Servers listen on it with [`MemoryNetwork::listen`], clients
//! attach with [`MemoryNetwork::client`], and datagrams are delivered
//! through unbounded channels instead of sockets. Frames and link rules
//! are the same as for UDP, so a server can't tell the difference.
//!
//! Used by the integration tests and for hosting a server inside the same
//! process as its owner.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::link::{LinkConfig, LinkTable};
use crate::reliable::{ReceiveChannel, Received};
use crate::{
    DatagramTransport, DeliveryMethod, Endpoint, Frame, LinkStatus,
    TransportError, TransportEvent,
};

type Datagram = (Endpoint, Bytes);

/// A shared in-process network.
///
/// Cloning is cheap; all clones refer to the same switchboard.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    mailboxes: Arc<Mutex<HashMap<Endpoint, mpsc::UnboundedSender<Datagram>>>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a server-side transport listening on `addr`.
    pub fn listen(&self, addr: SocketAddr) -> MemoryTransport {
        let inbox = self.register(addr);
        tracing::debug!(%addr, "memory transport listening");
        MemoryTransport {
            local: addr,
            network: self.clone(),
            inbox,
            links: LinkTable::new(LinkConfig::default(), Instant::now()),
            open: true,
        }
    }

    /// Attaches a client at `addr` that talks to `server`.
    pub fn client(&self, addr: SocketAddr, server: SocketAddr) -> MemoryClient {
        let inbox = self.register(addr);
        MemoryClient {
            local: addr,
            server,
            network: self.clone(),
            inbox,
            next_reliable: Cell::new(0),
            next_ordered: Cell::new(0),
            reliable_in: ReceiveChannel::new(false),
            ordered_in: ReceiveChannel::new(true),
            ready: VecDeque::new(),
        }
    }

    fn register(&self, addr: SocketAddr) -> mpsc::UnboundedReceiver<Datagram> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, tx);
        rx
    }

    fn unregister(&self, addr: SocketAddr) {
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&addr);
    }

    /// Delivers a datagram. Like UDP, delivery to nobody is not an error.
    fn deliver(&self, from: Endpoint, to: Endpoint, datagram: Bytes) {
        let mailboxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mailbox) = mailboxes.get(&to) {
            let _ = mailbox.send((from, datagram));
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// Server side of a [`MemoryNetwork`].
pub struct MemoryTransport {
    local: SocketAddr,
    network: MemoryNetwork,
    inbox: mpsc::UnboundedReceiver<Datagram>,
    links: LinkTable,
    open: bool,
}

impl MemoryTransport {
    fn flush(&mut self) {
        for (to, frame) in self.links.take_outbox() {
            self.network.deliver(self.local, to, frame.encode());
        }
    }
}

impl DatagramTransport for MemoryTransport {
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
        self.network.deliver(self.local, endpoint, frame.encode());
        Ok(())
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
        self.network.unregister(self.local);
        self.open = false;
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.local)
    }
}

// ---------------------------------------------------------------------------
// MemoryClient
// ---------------------------------------------------------------------------

/// Client side of a [`MemoryNetwork`]: sends raw frames to one server.
///
/// Reliable frames from the server are acknowledged, de-duplicated and
/// put back in order on receipt, the way a real remote peer would. The
/// client never re-sends its own frames; the in-process network does not
/// lose them.
pub struct MemoryClient {
    local: SocketAddr,
    server: SocketAddr,
    network: MemoryNetwork,
    inbox: mpsc::UnboundedReceiver<Datagram>,
    next_reliable: Cell<u16>,
    next_ordered: Cell<u16>,
    reliable_in: ReceiveChannel,
    ordered_in: ReceiveChannel,
    ready: VecDeque<Frame>,
}

impl MemoryClient {
    /// The address this client sends from.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Asks the server for a link.
    pub fn connect(&self) {
        self.connect_with(Bytes::new());
    }

    /// Asks the server for a link, attaching a hail.
    pub fn connect_with(&self, hail: impl Into<Bytes>) {
        self.send_frame(&Frame::Connect(hail.into()));
    }

    /// Sends a data frame, numbered on its channel.
    pub fn send(&self, method: DeliveryMethod, payload: impl Into<Bytes>) {
        let counter = match method {
            DeliveryMethod::Unreliable => None,
            DeliveryMethod::Reliable => Some(&self.next_reliable),
            DeliveryMethod::ReliableOrdered => Some(&self.next_ordered),
        };
        let sequence = counter.map_or(0, |next| next.replace(next.get().wrapping_add(1)));
        self.send_frame(&Frame::Data {
            method,
            sequence,
            payload: payload.into(),
        });
    }

    /// Closes the link from the client side.
    pub fn disconnect(&self, reason: &[u8]) {
        self.send_frame(&Frame::Disconnect(Bytes::copy_from_slice(reason)));
    }

    /// Sends a keepalive.
    pub fn keepalive(&self) {
        self.send_frame(&Frame::Keepalive);
    }

    /// Sends an arbitrary frame.
    pub fn send_frame(&self, frame: &Frame) {
        self.network.deliver(self.local, self.server, frame.encode());
    }

    /// Takes the next frame the server sent, if any. Acks are consumed
    /// here and never returned.
    pub fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(frame);
            }
            let (_, datagram) = self.inbox.try_recv().ok()?;
            match Frame::decode(datagram) {
                Some(Frame::Ack { .. }) | None => {}
                Some(Frame::Data {
                    method,
                    sequence,
                    payload,
                }) => self.accept_data(method, sequence, payload),
                Some(frame) => return Some(frame),
            }
        }
    }

    /// Takes every frame the server sent so far.
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.recv()).collect()
    }

    /// Drops everything that arrived since the last receive without
    /// acknowledging any of it, as if the datagrams were lost.
    pub fn discard_incoming(&mut self) -> usize {
        std::iter::from_fn(|| self.inbox.try_recv().ok()).count()
    }

    fn accept_data(&mut self, method: DeliveryMethod, sequence: u16, payload: Bytes) {
        let channel = match method {
            DeliveryMethod::Unreliable => {
                self.ready.push_back(Frame::Data {
                    method,
                    sequence,
                    payload,
                });
                return;
            }
            DeliveryMethod::Reliable => &mut self.reliable_in,
            DeliveryMethod::ReliableOrdered => &mut self.ordered_in,
        };
        let Received::Accepted(delivered) = channel.receive(sequence, payload) else {
            return;
        };
        self.send_frame(&Frame::Ack { method, sequence });
        self.ready
            .extend(delivered.into_iter().map(|(sequence, payload)| Frame::Data {
                method,
                sequence,
                payload,
            }));
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.network.unregister(self.local);
    }
}
