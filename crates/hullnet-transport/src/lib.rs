//! Datagram transport layer for Hullnet.
//!
//! Provides the [`DatagramTransport`] trait: a connection-oriented view over
//! unreliable datagrams. Remote endpoints must ask to connect, the owner of
//! the transport approves or denies them, and from then on data flows until
//! either side disconnects or the link goes silent.
//!
//! Everything here is **non-blocking**. The server calls
//! [`DatagramTransport::poll`] once per tick to drain whatever arrived since
//! the last tick; nothing in this crate ever waits on the network from the
//! caller's thread.
//!
//! # Implementations
//!
//! - [`UdpTransport`] (feature `udp`, default): a tokio `UdpSocket` with a
//!   background receive task.
//! - [`MemoryTransport`]: an in-process network for tests and local hosting.
//!
//! Both speak the same [`Frame`] format and share the same link bookkeeping,
//! so they behave identically from the server's point of view.

mod error;
mod frame;
mod link;
mod memory;
mod reliable;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
pub use frame::{Frame, MAX_DATAGRAM, MAX_FRAME_PAYLOAD};
pub use memory::{MemoryClient, MemoryNetwork, MemoryTransport};
#[cfg(feature = "udp")]
pub use udp::UdpTransport;

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

/// Address of a remote peer as seen by the transport.
pub type Endpoint = SocketAddr;

// ---------------------------------------------------------------------------
// DeliveryMethod
// ---------------------------------------------------------------------------

/// The delivery guarantee requested for an outgoing message.
///
/// Position updates can afford to be lost; handshake replies and chat
/// cannot. Reliable frames are acknowledged and re-sent until they are,
/// and the ordered channel holds frames back until the ones before them
/// have arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMethod {
    /// May be lost, may arrive out of order.
    Unreliable,
    /// Delivered, but possibly out of order.
    Reliable,
    /// Delivered, in order.
    #[default]
    ReliableOrdered,
}

impl DeliveryMethod {
    /// One-byte wire tag.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Unreliable => 0,
            Self::Reliable => 1,
            Self::ReliableOrdered => 2,
        }
    }

    /// Parses a wire tag. Returns `None` for unknown values.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Unreliable),
            1 => Some(Self::Reliable),
            2 => Some(Self::ReliableOrdered),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unreliable => "unreliable",
            Self::Reliable => "reliable",
            Self::ReliableOrdered => "reliable-ordered",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Events and link status
// ---------------------------------------------------------------------------

/// Something that happened on the transport since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote endpoint asked to connect. It stays in
    /// [`LinkStatus::AwaitingApproval`] until approved or denied. The hail
    /// is whatever the remote attached to its request.
    ConnectionRequested { endpoint: Endpoint, hail: Bytes },

    /// Data arrived on an established link.
    Data {
        from: Endpoint,
        method: DeliveryMethod,
        payload: Bytes,
    },

    /// A link went away: the remote side said goodbye or went silent.
    Disconnected { endpoint: Endpoint, reason: Bytes },
}

/// Transport-level state of one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The endpoint asked to connect and is waiting for a verdict.
    AwaitingApproval,
    /// Approved; data can flow both ways.
    Connected,
    /// Unknown, denied, or gone.
    Disconnected,
}

// ---------------------------------------------------------------------------
// DatagramTransport
// ---------------------------------------------------------------------------

/// A connection-oriented, poll-driven datagram transport.
///
/// Reasons passed to [`deny`](Self::deny) and
/// [`disconnect`](Self::disconnect) are opaque bytes: the layer above
/// decides how to encode them.
pub trait DatagramTransport: Send + 'static {
    /// Drains everything that happened since the previous call.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Accepts a pending connection request.
    fn approve(&mut self, endpoint: Endpoint);

    /// Rejects a pending connection request.
    fn deny(&mut self, endpoint: Endpoint, reason: &[u8]);

    /// Sends data to a connected endpoint.
    fn send(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        method: DeliveryMethod,
    ) -> Result<(), TransportError>;

    /// Closes a link, telling the remote side why.
    fn disconnect(&mut self, endpoint: Endpoint, reason: &[u8]);

    /// Current status of the link to `endpoint`.
    fn status(&self, endpoint: Endpoint) -> LinkStatus;

    /// Disconnects every link and stops receiving.
    fn shutdown(&mut self, reason: &[u8]);

    /// The local address this transport receives on.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}
