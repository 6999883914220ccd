//! Server peer for clients that connect straight to the server's socket.
//!
//! Every client has its own transport link, keyed by socket address. The
//! transport tells us when a link is requested and when it goes away; the
//! peer decides whether to approve it, runs the handshake over it, and
//! routes its data once promoted.
//!
//! # Admission
//!
//! ```text
//! ConnectionRequested ─→ full? banned IP? ─yes→ deny (no pending state)
//!                                 │no
//!                                 ↓
//!                      approve + pending ─(handshake)─→ connected
//! ```
//!
//! Data from a link that is neither pending nor connected disconnects the
//! link. Gameplay data from a pending client removes it with
//! `AuthenticationRequired`.
//!
//! A loopback client whose identity carries the configured owner key
//! becomes the server's owner; see [`DirectServerPeer::owner`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hullnet_protocol::{DisconnectReason, PeerDisconnectPacket, PeerMessage, PeerPacket};
use hullnet_session::{
    Authenticator, BanList, Connection, ConnectionEndpoint, ConnectionId, ConnectionStatus,
    Handshake, HandshakeAction,
};
use hullnet_transport::{DatagramTransport, DeliveryMethod, Endpoint, TransportEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::forward::{NoPortForwarding, PortForwarder};
use crate::peer::{PeerEvent, PeerEvents, ServerPeer, event_channel, parse_reason, reason_bytes};
use crate::{PeerError, ServerSettings};

/// A [`ServerPeer`] over a [`DatagramTransport`] with one link per client.
pub struct DirectServerPeer<T, A> {
    transport: T,
    handshake: Handshake<SocketAddr, A>,
    authenticator: Arc<A>,
    bans: Arc<dyn BanList>,
    connections: Vec<Connection>,
    owner: Option<ConnectionId>,
    events: mpsc::UnboundedSender<PeerEvent>,
    forwarder: Box<dyn PortForwarder>,
    max_players: usize,
    compression_threshold: usize,
    enable_port_forwarding: bool,
    running: bool,
}

impl<T: DatagramTransport, A: Authenticator> DirectServerPeer<T, A> {
    /// Creates a peer over an already-bound transport. Nothing is accepted
    /// until [`start`](ServerPeer::start).
    pub fn new(
        transport: T,
        settings: &ServerSettings,
        authenticator: Arc<A>,
        bans: Arc<dyn BanList>,
    ) -> (Self, PeerEvents) {
        let (events, receiver) = event_channel();
        let handshake = Handshake::new(
            settings.handshake_config(),
            Arc::clone(&authenticator),
            Arc::clone(&bans),
        );
        let peer = Self {
            transport,
            handshake,
            authenticator,
            bans,
            connections: Vec::new(),
            owner: None,
            events,
            forwarder: Box::new(NoPortForwarding),
            max_players: settings.max_players,
            compression_threshold: settings.compression_threshold,
            enable_port_forwarding: settings.enable_port_forwarding,
            running: false,
        };
        (peer, receiver)
    }

    /// Replaces the port forwarding backend.
    pub fn with_port_forwarder(mut self, forwarder: impl PortForwarder + 'static) -> Self {
        self.forwarder = Box::new(forwarder);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PeerError> {
        Ok(self.transport.local_addr()?)
    }

    /// The connection that proved it owns the server, while it stays
    /// connected.
    pub fn owner(&self) -> Option<&Connection> {
        self.owner.and_then(|id| self.connection(id))
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Result<(), PeerError> {
        match event {
            TransportEvent::ConnectionRequested { endpoint, .. } => {
                self.handle_connection_request(endpoint, now);
                Ok(())
            }
            TransportEvent::Data { from, payload, .. } => self.handle_data(from, payload, now),
            TransportEvent::Disconnected { endpoint, reason } => {
                self.handle_disconnected(endpoint, reason);
                Ok(())
            }
        }
    }

    fn handle_connection_request(&mut self, endpoint: Endpoint, now: Instant) {
        if self.connections.len() >= self.max_players {
            tracing::info!(%endpoint, "server full, denying connection");
            self.transport
                .deny(endpoint, &reason_bytes(&DisconnectReason::ServerFull.into()));
            return;
        }

        if let Some(reason) = self.bans.ip_ban(endpoint.ip()) {
            tracing::info!(%endpoint, %reason, "banned address, denying connection");
            let packet = PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason);
            self.transport.deny(endpoint, &reason_bytes(&packet));
            return;
        }

        self.transport.approve(endpoint);
        self.handshake.add(endpoint, Some(endpoint.ip()), None, now);
    }

    fn handle_data(&mut self, from: Endpoint, payload: Bytes, now: Instant) -> Result<(), PeerError> {
        let message = match PeerMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.drop_endpoint(from, DisconnectReason::MalformedData.into());
                return Err(e.into());
            }
        };

        if message.from_server {
            tracing::warn!(%from, "client sent a server message");
            self.drop_endpoint(
                from,
                PeerDisconnectPacket::with_message(
                    DisconnectReason::MalformedData,
                    "received a server message from a client",
                ),
            );
            return Ok(());
        }

        if self.handshake.contains(from) {
            match message.packet {
                PeerPacket::Initialization { step, body } => {
                    let actions = self.handshake.handle_step(from, step, body, now);
                    self.apply(actions);
                }
                PeerPacket::Disconnect(packet) => self.drop_endpoint(from, packet),
                PeerPacket::Heartbeat => {}
                PeerPacket::Gameplay(_) => {
                    tracing::warn!(%from, "gameplay data before the handshake finished");
                    self.drop_endpoint(from, DisconnectReason::AuthenticationRequired.into());
                }
            }
            return Ok(());
        }

        let Some(index) = self.connection_index(from) else {
            tracing::debug!(%from, "data from an unknown link, disconnecting it");
            self.transport.disconnect(
                from,
                &reason_bytes(&DisconnectReason::AuthenticationRequired.into()),
            );
            return Ok(());
        };

        let connection = &self.connections[index];
        if let Some(reason) = self.bans.check(connection.ip(), connection.account.as_ref()) {
            self.disconnect_index(
                index,
                PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason),
            );
            return Ok(());
        }

        match message.packet {
            PeerPacket::Gameplay(data) => {
                let connection = self.connections[index].clone();
                self.emit(PeerEvent::MessageReceived { connection, data });
            }
            PeerPacket::Disconnect(packet) => self.disconnect_index(index, packet),
            PeerPacket::Heartbeat => {}
            PeerPacket::Initialization { step, .. } => {
                tracing::trace!(%from, %step, "handshake message from a connected client");
            }
        }
        Ok(())
    }

    fn handle_disconnected(&mut self, endpoint: Endpoint, reason: Bytes) {
        let packet = parse_reason(reason);
        if self.handshake.remove(endpoint, &packet) {
            return;
        }
        if let Some(index) = self.connection_index(endpoint) {
            self.remove_connection(index, packet);
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn apply(&mut self, actions: Vec<HandshakeAction<SocketAddr>>) {
        for action in actions {
            match action {
                HandshakeAction::Send { key, message } => {
                    if let Err(e) = self.send_message(key, &message, DeliveryMethod::ReliableOrdered) {
                        tracing::debug!(endpoint = %key, error = %e, "failed to send handshake message");
                    }
                }
                HandshakeAction::Reject { key, packet } => {
                    self.transport.disconnect(key, &reason_bytes(&packet));
                }
                HandshakeAction::Promote(connection) => {
                    self.connections.push(connection.clone());
                    self.emit(PeerEvent::InitializationComplete(connection));
                }
                HandshakeAction::OwnerDetermined(connection) => {
                    tracing::info!(%connection, "owner connected");
                    self.owner = Some(connection.id);
                    self.emit(PeerEvent::OwnerDetermined(connection));
                }
                HandshakeAction::Revoke { account, packet } => {
                    let revoked = self
                        .connections
                        .iter()
                        .position(|connection| connection.account_id() == Some(account));
                    if let Some(index) = revoked {
                        self.disconnect_index(index, packet);
                    }
                }
            }
        }
    }

    fn send_message(
        &mut self,
        endpoint: Endpoint,
        message: &PeerMessage,
        method: DeliveryMethod,
    ) -> Result<(), PeerError> {
        let data = message.encode(Some(self.compression_threshold))?;
        self.transport.send(endpoint, &data, method)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Removes whatever is on `endpoint` (pending or connected) and closes
    /// its link.
    fn drop_endpoint(&mut self, endpoint: Endpoint, packet: PeerDisconnectPacket) {
        if !self.handshake.remove(endpoint, &packet) {
            if let Some(index) = self.connection_index(endpoint) {
                self.remove_connection(index, packet.clone());
            }
        }
        self.transport.disconnect(endpoint, &reason_bytes(&packet));
    }

    fn disconnect_index(&mut self, index: usize, packet: PeerDisconnectPacket) {
        let reason = reason_bytes(&packet);
        let connection = self.remove_connection(index, packet);
        if let ConnectionEndpoint::Direct(endpoint) = connection.endpoint {
            self.transport.disconnect(endpoint, &reason);
        }
    }

    fn remove_connection(&mut self, index: usize, packet: PeerDisconnectPacket) -> Connection {
        let mut connection = self.connections.remove(index);
        connection.status = ConnectionStatus::Disconnected;
        if self.owner == Some(connection.id) {
            self.owner = None;
        }
        tracing::info!(%connection, reason = %packet, "client disconnected");
        if let Some(account) = connection.account_id() {
            self.authenticator.end_session(account);
        }
        self.emit(PeerEvent::Disconnected {
            connection: connection.clone(),
            packet,
        });
        connection
    }

    fn connection_index(&self, endpoint: Endpoint) -> Option<usize> {
        self.connections
            .iter()
            .position(|connection| connection.endpoint == ConnectionEndpoint::Direct(endpoint))
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }
}

impl<T: DatagramTransport, A: Authenticator> ServerPeer for DirectServerPeer<T, A> {
    fn start(&mut self) -> Result<(), PeerError> {
        if self.running {
            return Err(PeerError::AlreadyStarted);
        }
        let addr = self.transport.local_addr()?;
        self.running = true;
        tracing::info!(%addr, max_players = self.max_players, "direct server peer started");

        if self.enable_port_forwarding {
            match self.forwarder.forward(addr.port()) {
                Ok(()) => tracing::info!(port = addr.port(), "port forwarded"),
                Err(e) => tracing::warn!(error = %e, "port forwarding failed, continuing without it"),
            }
        }
        Ok(())
    }

    fn update(&mut self, _delta: Duration) {
        if !self.running {
            return;
        }
        let now = Instant::now();

        for event in self.transport.poll() {
            if let Err(e) = self.handle_event(event, now) {
                tracing::warn!(error = %e, "failed to process incoming message");
            }
        }

        let actions = self.handshake.update(now);
        self.apply(actions);
    }

    fn close(&mut self, packet: PeerDisconnectPacket) {
        if !self.running {
            return;
        }
        tracing::info!(reason = %packet, "closing direct server peer");
        let reason = reason_bytes(&packet);

        for endpoint in self.handshake.drain(&packet) {
            self.transport.disconnect(endpoint, &reason);
        }
        while let Some(index) = self.connections.len().checked_sub(1) {
            self.disconnect_index(index, packet.clone());
        }
        self.transport.shutdown(&reason);

        self.running = false;
        self.emit(PeerEvent::Shutdown);
    }

    fn send(&mut self, connection: &Connection, data: &[u8], method: DeliveryMethod) {
        let endpoint = match self.connection(connection.id).map(|c| c.endpoint) {
            Some(ConnectionEndpoint::Direct(endpoint)) if self.running => endpoint,
            _ => {
                tracing::warn!(%connection, "tried to send to a connection that is not connected");
                return;
            }
        };
        let message = PeerMessage::server(PeerPacket::Gameplay(Bytes::copy_from_slice(data)));
        if let Err(e) = self.send_message(endpoint, &message, method) {
            tracing::warn!(%connection, error = %e, "failed to send message");
        }
    }

    fn disconnect(&mut self, connection: &Connection, packet: PeerDisconnectPacket) {
        match self.connections.iter().position(|c| c.id == connection.id) {
            Some(index) => self.disconnect_index(index, packet),
            None => tracing::debug!(%connection, "already disconnected"),
        }
    }

    fn ban(&mut self, connection: &Connection, reason: &str, duration: Option<Duration>) {
        if let Some(ip) = connection.ip() {
            self.bans.ban_ip(ip, reason, duration);
        }
        if let Some(account) = connection.account_id() {
            self.bans.ban_account(account, reason, duration);
        }
        tracing::info!(%connection, %reason, "client banned");
        self.disconnect(
            connection,
            PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason),
        );
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn pending_count(&self) -> usize {
        self.handshake.len()
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
