//! Server peer for clients reached through the identity platform's relay.
//!
//! The server holds exactly one transport link: the owner link, opened
//! from the loopback address by the process that talks to the relay.
//! Every remote client is multiplexed over it in [`RelayEnvelope`]s tagged
//! with the client's account, so an account is all the peer ever knows a
//! client by.
//!
//! There are no link events for individual clients. A client exists from
//! its first `ConnectionStarted` message, and it stops existing when it
//! says goodbye, when the handshake rejects it, or when it stays silent
//! for `relay_connection_timeout_secs`. The server sends heartbeats to
//! connected clients so they can time out a dead server the same way.
//!
//! The owner link must present the configured owner key as its connect
//! hail, so another local process can't take the server over. Losing the
//! owner link closes the peer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hullnet_protocol::{
    AccountId, ConnectionInitialization, DisconnectReason, PeerDisconnectPacket, PeerMessage,
    PeerPacket, RelayEnvelope, parse_owner_hail,
};
use hullnet_session::{
    Authenticator, BanList, Connection, ConnectionEndpoint, ConnectionStatus, Handshake,
    HandshakeAction,
};
use hullnet_transport::{DatagramTransport, DeliveryMethod, Endpoint, TransportEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::peer::{PeerEvent, PeerEvents, ServerPeer, event_channel, reason_bytes};
use crate::{PeerError, ServerSettings};

/// A [`ServerPeer`] that serves relay clients over a single owner link.
pub struct RelayServerPeer<T, A> {
    transport: T,
    handshake: Handshake<AccountId, A>,
    authenticator: Arc<A>,
    bans: Arc<dyn BanList>,
    owner: Option<Endpoint>,
    owner_key: Option<i32>,
    connections: Vec<Connection>,
    /// Time left before each pending or connected client is timed out.
    timeouts: HashMap<AccountId, Duration>,
    heartbeat_timer: Duration,
    heartbeat_interval: Duration,
    connection_timeout: Duration,
    max_players: usize,
    compression_threshold: usize,
    events: mpsc::UnboundedSender<PeerEvent>,
    running: bool,
}

impl<T: DatagramTransport, A: Authenticator> RelayServerPeer<T, A> {
    /// Creates a peer over an already-bound transport. The transport
    /// should listen on a loopback address; only a loopback owner is
    /// accepted either way.
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
            owner: None,
            owner_key: settings.owner_key.filter(|key| *key != 0),
            connections: Vec::new(),
            timeouts: HashMap::new(),
            heartbeat_timer: settings.relay_heartbeat_interval(),
            heartbeat_interval: settings.relay_heartbeat_interval(),
            connection_timeout: settings.relay_connection_timeout(),
            max_players: settings.max_players,
            compression_threshold: settings.compression_threshold,
            events,
            running: false,
        };
        (peer, receiver)
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, PeerError> {
        Ok(self.transport.local_addr()?)
    }

    /// The owner link, once connected.
    pub fn owner(&self) -> Option<Endpoint> {
        self.owner
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Result<(), PeerError> {
        match event {
            TransportEvent::ConnectionRequested { endpoint, hail } => {
                self.handle_connection_request(endpoint, &hail);
                Ok(())
            }
            TransportEvent::Data { from, payload, .. } => {
                if self.owner != Some(from) {
                    tracing::warn!(%from, "data from a link other than the owner");
                    self.transport.disconnect(
                        from,
                        &reason_bytes(&DisconnectReason::AuthenticationRequired.into()),
                    );
                    return Ok(());
                }
                self.handle_owner_data(payload, now)
            }
            TransportEvent::Disconnected { endpoint, .. } => {
                if self.owner == Some(endpoint) {
                    tracing::info!(%endpoint, "owner disconnected, closing the server");
                    self.owner = None;
                    self.close(DisconnectReason::ServerShutdown.into());
                }
                Ok(())
            }
        }
    }

    fn handle_connection_request(&mut self, endpoint: Endpoint, hail: &[u8]) {
        let presented = parse_owner_hail(hail);
        if self.owner.is_none() && endpoint.ip().is_loopback() && presented == self.owner_key {
            tracing::info!(%endpoint, "relay owner connected");
            self.transport.approve(endpoint);
            self.owner = Some(endpoint);
            return;
        }
        let message = if self.owner.is_some() {
            "the relay server only accepts its owner"
        } else {
            "invalid owner link"
        };
        tracing::warn!(%endpoint, key_presented = presented.is_some(), "{message}, rejecting link");
        let packet =
            PeerDisconnectPacket::with_message(DisconnectReason::AuthenticationFailed, message);
        self.transport.deny(endpoint, &reason_bytes(&packet));
    }

    fn handle_owner_data(&mut self, payload: Bytes, now: Instant) -> Result<(), PeerError> {
        let envelope = match RelayEnvelope::decode(payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                if let Some(account) = RelayEnvelope::peek_account(&payload) {
                    self.drop_client(account, DisconnectReason::MalformedData.into());
                }
                return Err(e.into());
            }
        };
        let RelayEnvelope {
            account, message, ..
        } = envelope;

        if message.from_server {
            tracing::warn!(%account, "client sent a server message");
            self.drop_client(
                account,
                PeerDisconnectPacket::with_message(
                    DisconnectReason::MalformedData,
                    "received a server message from a client",
                ),
            );
            return Ok(());
        }

        if let Some(index) = self.connection_index(account) {
            self.handle_connected(index, message.packet, now);
        } else if self.handshake.contains(account) {
            self.reset_timeout(account);
            self.handle_pending(account, message.packet, now);
        } else {
            self.handle_unknown(account, message.packet, now);
        }
        Ok(())
    }

    fn reset_timeout(&mut self, account: AccountId) {
        if let Some(remaining) = self.timeouts.get_mut(&account) {
            *remaining = self.connection_timeout;
        }
    }

    fn handle_connected(&mut self, index: usize, packet: PeerPacket, now: Instant) {
        let connection = &self.connections[index];
        let account = relay_account(connection);
        let ban = self
            .bans
            .check(None, connection.account.as_ref())
            .or_else(|| account.and_then(|account| self.bans.account_ban(account)));
        if let Some(reason) = ban {
            self.disconnect_index(
                index,
                PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason),
            );
            return;
        }

        match packet {
            PeerPacket::Gameplay(data) => {
                if let Some(account) = account {
                    self.reset_timeout(account);
                }
                let connection = self.connections[index].clone();
                self.emit(PeerEvent::MessageReceived { connection, data });
            }
            PeerPacket::Disconnect(packet) => {
                let connection = self.remove_connection(index, packet);
                if let Some(account) = relay_account(&connection) {
                    self.timeouts.remove(&account);
                }
            }
            PeerPacket::Heartbeat => {
                if let Some(account) = account {
                    self.reset_timeout(account);
                }
            }
            PeerPacket::Initialization {
                step: ConnectionInitialization::ConnectionStarted,
                body,
            } => {
                // The client lost its side of the connection and is
                // starting over.
                let connection = self.remove_connection(
                    index,
                    PeerDisconnectPacket::with_message(DisconnectReason::Disconnected, "reconnecting"),
                );
                if let Some(account) = relay_account(&connection) {
                    tracing::info!(%account, "connected client started a new handshake");
                    self.timeouts.remove(&account);
                    self.admit(account, body, now);
                }
            }
            PeerPacket::Initialization { step, .. } => {
                tracing::trace!(?account, %step, "handshake message from a connected client");
            }
        }
    }

    fn handle_pending(&mut self, account: AccountId, packet: PeerPacket, now: Instant) {
        match packet {
            PeerPacket::Initialization { step, body } => {
                let actions = self.handshake.handle_step(account, step, body, now);
                self.apply(actions);
            }
            PeerPacket::Disconnect(packet) => {
                self.timeouts.remove(&account);
                self.handshake.remove(account, &packet);
            }
            PeerPacket::Heartbeat => {}
            PeerPacket::Gameplay(_) => {
                tracing::warn!(%account, "gameplay data before the handshake finished");
                self.drop_client(account, DisconnectReason::AuthenticationRequired.into());
            }
        }
    }

    /// First contact from an account. Only `ConnectionStarted` opens a
    /// pending client.
    fn handle_unknown(&mut self, account: AccountId, packet: PeerPacket, now: Instant) {
        match packet {
            PeerPacket::Initialization {
                step: ConnectionInitialization::ConnectionStarted,
                body,
            } => self.admit(account, body, now),
            PeerPacket::Disconnect(_) | PeerPacket::Heartbeat => {
                tracing::trace!(%account, "ignoring message from an unknown client");
            }
            PeerPacket::Initialization { .. } | PeerPacket::Gameplay(_) => {
                tracing::debug!(%account, "message from an unknown client, disconnecting it");
                self.notify(account, DisconnectReason::AuthenticationRequired.into());
            }
        }
    }

    fn admit(&mut self, account: AccountId, body: Bytes, now: Instant) {
        if self.connections.len() >= self.max_players {
            tracing::info!(%account, "server full, refusing relay client");
            self.notify(account, DisconnectReason::ServerFull.into());
            return;
        }
        if let Some(reason) = self.bans.account_ban(account) {
            tracing::info!(%account, %reason, "banned account, refusing relay client");
            self.notify(
                account,
                PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason),
            );
            return;
        }

        self.handshake.add(account, None, Some(account), now);
        self.timeouts.insert(account, self.connection_timeout);
        let actions = self.handshake.handle_step(
            account,
            ConnectionInitialization::ConnectionStarted,
            body,
            now,
        );
        self.apply(actions);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn decay_timeouts(&mut self, delta: Duration) {
        let mut expired: Vec<AccountId> = self
            .timeouts
            .iter_mut()
            .filter_map(|(account, remaining)| {
                *remaining = remaining.saturating_sub(delta);
                remaining.is_zero().then_some(*account)
            })
            .collect();
        expired.sort();

        for account in expired {
            tracing::info!(%account, "relay client timed out");
            self.drop_client(
                account,
                PeerDisconnectPacket::with_message(DisconnectReason::Timeout, "timed out"),
            );
        }
    }

    fn send_heartbeats(&mut self, delta: Duration) {
        self.heartbeat_timer = self.heartbeat_timer.saturating_sub(delta);
        if !self.heartbeat_timer.is_zero() {
            return;
        }
        self.heartbeat_timer = self.heartbeat_interval;

        let accounts: Vec<AccountId> = self.connections.iter().filter_map(relay_account).collect();
        for account in accounts {
            let heartbeat = PeerMessage::server(PeerPacket::Heartbeat);
            if let Err(e) = self.send_to(account, heartbeat, DeliveryMethod::Unreliable) {
                tracing::debug!(%account, error = %e, "failed to send heartbeat");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn apply(&mut self, actions: Vec<HandshakeAction<AccountId>>) {
        for action in actions {
            match action {
                HandshakeAction::Send { key, message } => {
                    if let Err(e) = self.send_to(key, message, DeliveryMethod::ReliableOrdered) {
                        tracing::debug!(account = %key, error = %e, "failed to send handshake message");
                    }
                }
                HandshakeAction::Reject { key, packet } => {
                    self.timeouts.remove(&key);
                    self.notify(key, packet);
                }
                HandshakeAction::Promote(connection) => {
                    self.connections.push(connection.clone());
                    self.emit(PeerEvent::InitializationComplete(connection));
                }
                HandshakeAction::OwnerDetermined(connection) => {
                    tracing::debug!(%connection, "relay clients never own the server");
                }
                HandshakeAction::Revoke { account, packet } => {
                    let revoked = self.connections.iter().position(|connection| {
                        connection.account_id() == Some(account)
                            || relay_account(connection) == Some(account)
                    });
                    if let Some(index) = revoked {
                        self.disconnect_index(index, packet);
                    }
                }
            }
        }
    }

    fn send_to(
        &mut self,
        account: AccountId,
        message: PeerMessage,
        method: DeliveryMethod,
    ) -> Result<(), PeerError> {
        let Some(owner) = self.owner else {
            tracing::trace!(%account, "no owner link, dropping outgoing message");
            return Ok(());
        };
        let data = RelayEnvelope::new(account, method, message).encode(Some(self.compression_threshold))?;
        self.transport.send(owner, &data, method)?;
        Ok(())
    }

    /// Tells a client it is being disconnected. Touches no state.
    fn notify(&mut self, account: AccountId, packet: PeerDisconnectPacket) {
        let message = PeerMessage::server(PeerPacket::Disconnect(packet));
        if let Err(e) = self.send_to(account, message, DeliveryMethod::ReliableOrdered) {
            tracing::debug!(%account, error = %e, "failed to send disconnect");
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Removes `account` wherever it is and tells it why.
    fn drop_client(&mut self, account: AccountId, packet: PeerDisconnectPacket) {
        self.timeouts.remove(&account);
        if !self.handshake.remove(account, &packet) {
            if let Some(index) = self.connection_index(account) {
                self.remove_connection(index, packet.clone());
            }
        }
        self.notify(account, packet);
    }

    fn disconnect_index(&mut self, index: usize, packet: PeerDisconnectPacket) {
        let connection = self.remove_connection(index, packet.clone());
        if let Some(account) = relay_account(&connection) {
            self.timeouts.remove(&account);
            self.notify(account, packet);
        }
    }

    fn remove_connection(&mut self, index: usize, packet: PeerDisconnectPacket) -> Connection {
        let mut connection = self.connections.remove(index);
        connection.status = ConnectionStatus::Disconnected;
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

    fn connection_index(&self, account: AccountId) -> Option<usize> {
        self.connections
            .iter()
            .position(|connection| connection.endpoint == ConnectionEndpoint::Relay(account))
    }

    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }
}

fn relay_account(connection: &Connection) -> Option<AccountId> {
    match connection.endpoint {
        ConnectionEndpoint::Relay(account) => Some(account),
        ConnectionEndpoint::Direct(_) => None,
    }
}

impl<T: DatagramTransport, A: Authenticator> ServerPeer for RelayServerPeer<T, A> {
    fn start(&mut self) -> Result<(), PeerError> {
        if self.running {
            return Err(PeerError::AlreadyStarted);
        }
        if self.owner_key.is_none() {
            return Err(PeerError::OwnerKeyRequired);
        }
        let addr = self.transport.local_addr()?;
        self.running = true;
        tracing::info!(%addr, max_players = self.max_players, "relay server peer started");
        Ok(())
    }

    fn update(&mut self, delta: Duration) {
        if !self.running {
            return;
        }
        let now = Instant::now();

        for event in self.transport.poll() {
            if let Err(e) = self.handle_event(event, now) {
                tracing::warn!(error = %e, "failed to process incoming message");
            }
            if !self.running {
                return;
            }
        }

        let actions = self.handshake.update(now);
        self.apply(actions);
        self.decay_timeouts(delta);
        self.send_heartbeats(delta);
    }

    fn close(&mut self, packet: PeerDisconnectPacket) {
        if !self.running {
            return;
        }
        tracing::info!(reason = %packet, "closing relay server peer");

        for account in self.handshake.drain(&packet) {
            self.notify(account, packet.clone());
        }
        while let Some(index) = self.connections.len().checked_sub(1) {
            self.disconnect_index(index, packet.clone());
        }
        self.timeouts.clear();
        self.transport.shutdown(&reason_bytes(&packet));

        self.owner = None;
        self.running = false;
        self.emit(PeerEvent::Shutdown);
    }

    fn send(&mut self, connection: &Connection, data: &[u8], method: DeliveryMethod) {
        let account = match self.connection(connection.id).map(relay_account) {
            Some(Some(account)) if self.running => account,
            _ => {
                tracing::warn!(%connection, "tried to send to a connection that is not connected");
                return;
            }
        };
        let message = PeerMessage::server(PeerPacket::Gameplay(Bytes::copy_from_slice(data)));
        if let Err(e) = self.send_to(account, message, method) {
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
        let accounts = connection
            .account_id()
            .into_iter()
            .chain(relay_account(connection));
        let mut banned = Vec::new();
        for account in accounts {
            if !banned.contains(&account) {
                self.bans.ban_account(account, reason, duration);
                banned.push(account);
            }
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
