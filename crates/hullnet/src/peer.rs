//! The contract both server peers implement.

use std::time::Duration;

use bytes::Bytes;
use hullnet_protocol::{DisconnectReason, PeerDisconnectPacket};
use hullnet_session::{Connection, ConnectionId};
use hullnet_transport::DeliveryMethod;
use tokio::sync::mpsc;

use crate::PeerError;

/// Something the rest of the server needs to react to.
///
/// Peers push these onto an unbounded channel as they happen; the server
/// loop drains the receiving end after every [`ServerPeer::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A gameplay message from a connected client. Never fires for
    /// handshake traffic.
    MessageReceived { connection: Connection, data: Bytes },

    /// A client finished the handshake. Fires exactly once per promoted
    /// client.
    InitializationComplete(Connection),

    /// A loopback client proved it holds the configured owner key. Fires
    /// at most once per peer, right after its `InitializationComplete`.
    OwnerDetermined(Connection),

    /// A connected client left, for whatever reason. Fires exactly once
    /// per connection that got an `InitializationComplete`.
    Disconnected {
        connection: Connection,
        packet: PeerDisconnectPacket,
    },

    /// The peer closed. Nothing else follows.
    Shutdown,
}

/// Receiving end of a peer's event channel.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// A server-side endpoint that turns transport traffic into connections.
///
/// All state changes happen inside [`update`](Self::update) or one of
/// the explicit commands; nothing runs in the background except platform
/// ticket verification, whose results are applied on the next update.
pub trait ServerPeer {
    /// Starts accepting connections.
    fn start(&mut self) -> Result<(), PeerError>;

    /// Drains inbound traffic, advances the handshake and fires events.
    fn update(&mut self, delta: Duration);

    /// Drops every pending client, then every connected client, then the
    /// transport, and fires [`PeerEvent::Shutdown`]. Does nothing if the
    /// peer isn't running.
    fn close(&mut self, packet: PeerDisconnectPacket);

    /// Sends a gameplay message. Logs and drops it if `connection` is not
    /// currently connected to this peer.
    fn send(&mut self, connection: &Connection, data: &[u8], method: DeliveryMethod);

    /// Disconnects a connected client, telling it why.
    fn disconnect(&mut self, connection: &Connection, packet: PeerDisconnectPacket);

    /// Every currently connected client.
    fn connections(&self) -> &[Connection];

    /// Clients still in the handshake.
    fn pending_count(&self) -> usize;

    fn is_running(&self) -> bool;

    /// Looks up a connected client.
    fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections().iter().find(|connection| connection.id == id)
    }

    /// Disconnects a client with [`DisconnectReason::Kicked`].
    fn kick(&mut self, connection: &Connection, message: &str) {
        self.disconnect(
            connection,
            PeerDisconnectPacket::with_message(DisconnectReason::Kicked, message),
        );
    }

    /// Bans a client's account and address, then disconnects it with
    /// [`DisconnectReason::Banned`]. `None` bans permanently.
    fn ban(&mut self, connection: &Connection, reason: &str, duration: Option<Duration>);
}

pub(crate) fn event_channel() -> (mpsc::UnboundedSender<PeerEvent>, PeerEvents) {
    mpsc::unbounded_channel()
}

/// Encodes a disconnect packet for a transport-level reason. Falls back
/// to the bare reason if the message doesn't fit.
pub(crate) fn reason_bytes(packet: &PeerDisconnectPacket) -> Bytes {
    match packet.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, reason = %packet.reason, "disconnect message dropped");
            PeerDisconnectPacket::new(packet.reason)
                .encode()
                .unwrap_or_else(|_| Bytes::from(vec![packet.reason.to_u8(), 0, 0]))
        }
    }
}

/// Reads a transport-level disconnect reason. Reasons that aren't a
/// disconnect packet (the transport's own, or a foreign client's) are
/// kept as text.
pub(crate) fn parse_reason(reason: Bytes) -> PeerDisconnectPacket {
    PeerDisconnectPacket::decode(reason.clone()).unwrap_or_else(|_| {
        PeerDisconnectPacket::with_message(
            DisconnectReason::Disconnected,
            String::from_utf8_lossy(&reason).into_owned(),
        )
    })
}
