//! The handshake state machine shared by both transports.
//!
//! [`Handshake`] owns every [`PendingClient`] and decides what happens to
//! it. It never touches a transport: each call returns
//! [`HandshakeAction`]s (send this prompt, reject that client, promote
//! this one) and the peer carries them out. That keeps the direct and
//! relay peers from drifting apart; they differ only in how they address
//! and frame the same actions.
//!
//! # Step flow
//!
//! ```text
//! ConnectionStarted ─→ IdentityAndVersion ─(auth)─→ Password? ─→ Success ─→ promoted
//! ```
//!
//! The server repeats the prompt for the step it is waiting on every
//! `resend_interval`; the client answers with a message tagged with that
//! same step. Answers for any other step are dropped.
//!
//! # Authentication
//!
//! Ticket verification runs as a spawned task. Its result is queued on a
//! channel and applied at the start of the next [`Handshake::update`], so
//! nothing outside `update` and `handle_step` ever changes a pending
//! client. Both methods must be called from within a tokio runtime.
//!
//! Revocations are collected from the authenticator on the same tick,
//! right after verification results. A revoked pending client is rejected
//! here; connected clients are the peer's, so `update` hands those back
//! as [`HandshakeAction::Revoke`].

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use hullnet_protocol::{
    AccountId, ClientIdentityPacket, ConnectionInitialization, DisconnectReason,
    PasswordPrompt, PasswordResponse, PeerDisconnectPacket, PeerMessage, PeerPacket,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::password::generate_salt;
use crate::validation::{
    is_valid_name, is_version_compatible, missing_packages, missing_packages_packet,
    sanitize_name, version_mismatch,
};
use crate::{
    AccountInfo, Authenticator, BanList, Connection, ConnectionEndpoint, ConnectionId,
    HandshakeConfig, PendingClient, Revocation, SessionError,
};

/// Ban reason recorded after too many wrong passwords.
pub const TOO_MANY_PASSWORD_ATTEMPTS: &str = "too many incorrect password attempts";

/// What identifies a pending client: a socket address on the direct
/// transport, an account on the relay.
pub trait HandshakeKey:
    Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + Into<ConnectionEndpoint> + 'static
{
}

impl<T> HandshakeKey for T where
    T: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + Into<ConnectionEndpoint> + 'static
{
}

/// The finished result of one ticket verification.
#[derive(Debug)]
pub struct AuthOutcome<K> {
    pub key: K,
    pub attempt: u64,
    pub claimed: AccountId,
    pub result: Result<AccountInfo, SessionError>,
}

/// Something the peer must do on the handshake's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction<K> {
    /// Send a handshake message to a pending client.
    Send { key: K, message: PeerMessage },
    /// The client has been removed from the pending set; tell it why.
    Reject { key: K, packet: PeerDisconnectPacket },
    /// The client has been removed from the pending set and is now a
    /// connection. Add it to the connected set.
    Promote(Connection),
    /// The connection just promoted presented the owner key. Fires at
    /// most once per handshake.
    OwnerDetermined(Connection),
    /// The platform withdrew `account`. Disconnect any connection that
    /// holds it.
    Revoke {
        account: AccountId,
        packet: PeerDisconnectPacket,
    },
}

enum Progress {
    Nothing,
    Prompt,
    Reject(PeerDisconnectPacket),
}

/// Pending clients and the rules they are held to.
pub struct Handshake<K, A> {
    config: HandshakeConfig,
    authenticator: Arc<A>,
    bans: Arc<dyn BanList>,
    pending: Vec<PendingClient<K>>,
    outcomes_tx: mpsc::UnboundedSender<AuthOutcome<K>>,
    outcomes_rx: mpsc::UnboundedReceiver<AuthOutcome<K>>,
    next_attempt: u64,
    next_connection_id: u64,
}

impl<K: HandshakeKey, A: Authenticator> Handshake<K, A> {
    pub fn new(config: HandshakeConfig, authenticator: Arc<A>, bans: Arc<dyn BanList>) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            config,
            authenticator,
            bans,
            pending: Vec::new(),
            outcomes_tx,
            outcomes_rx,
            next_attempt: 0,
            next_connection_id: 1,
        }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.pending.iter().any(|client| client.key == key)
    }

    pub fn get(&self, key: K) -> Option<&PendingClient<K>> {
        self.pending.iter().find(|client| client.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.pending.iter().map(|client| client.key)
    }

    /// Starts tracking a new connection attempt. Returns `false` if `key`
    /// is already pending.
    ///
    /// Capacity and ban checks are the caller's job: a rejected attempt
    /// should never get this far.
    pub fn add(
        &mut self,
        key: K,
        ip: Option<IpAddr>,
        relay_account: Option<AccountId>,
        now: Instant,
    ) -> bool {
        if self.contains(key) {
            return false;
        }
        tracing::debug!(%key, "pending client added");
        self.pending.push(PendingClient::new(
            key,
            ip,
            relay_account,
            now,
            self.config.timeout,
        ));
        true
    }

    /// Handles one handshake message from a pending client.
    ///
    /// Messages from unknown keys and messages for a step other than the
    /// one the client is on are ignored.
    pub fn handle_step(
        &mut self,
        key: K,
        step: ConnectionInitialization,
        body: Bytes,
        now: Instant,
    ) -> Vec<HandshakeAction<K>> {
        let Some(index) = self.position(key) else {
            return Vec::new();
        };
        if self.pending[index].step != step {
            tracing::trace!(%key, %step, expected = %self.pending[index].step, "ignoring out-of-step message");
            return Vec::new();
        }
        self.pending[index].timeout = now + self.config.timeout;

        let progress = match step {
            ConnectionInitialization::ConnectionStarted => {
                self.pending[index].step = ConnectionInitialization::IdentityAndVersion;
                Progress::Prompt
            }
            ConnectionInitialization::IdentityAndVersion => self.on_identity(index, body, now),
            ConnectionInitialization::Password => self.on_password(index, body),
            ConnectionInitialization::Success => Progress::Nothing,
        };

        let mut actions = Vec::new();
        match progress {
            Progress::Nothing => {}
            Progress::Prompt => {
                let client = &mut self.pending[index];
                // Success is announced by update(), together with promotion.
                if client.step != ConnectionInitialization::Success {
                    client.update_time = now + self.config.resend_interval;
                    actions.push(HandshakeAction::Send {
                        key,
                        message: prompt(client),
                    });
                }
            }
            Progress::Reject(packet) => {
                let client = self.pending.remove(index);
                self.reject(client, packet, &mut actions);
            }
        }
        actions
    }

    /// Advances every pending client by one tick.
    ///
    /// In order: applies finished authentications and revocations, then
    /// for each client
    /// re-checks bans, enforces the timeout, promotes it if it reached
    /// `Success`, and otherwise re-sends its prompt when due.
    pub fn update(&mut self, now: Instant) -> Vec<HandshakeAction<K>> {
        let mut actions = Vec::new();

        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.apply_outcome(outcome, now, &mut actions);
        }
        for revocation in self.authenticator.take_revocations() {
            self.revoke(revocation, &mut actions);
        }

        let clients = std::mem::take(&mut self.pending);
        let mut kept = Vec::with_capacity(clients.len());
        for client in clients {
            if let Some(client) = self.tick_client(client, now, &mut actions) {
                kept.push(client);
            }
        }
        self.pending = kept;

        actions
    }

    /// Removes a pending client on the peer's initiative (the transport
    /// dropped it, or it sent gameplay data too early). Returns `false`
    /// if `key` wasn't pending.
    pub fn remove(&mut self, key: K, reason: &PeerDisconnectPacket) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        let client = self.pending.remove(index);
        tracing::info!(%key, %reason, "pending client removed");
        self.finish(&client);
        true
    }

    /// Removes every pending client, returning their keys.
    pub fn drain(&mut self, reason: &PeerDisconnectPacket) -> Vec<K> {
        let clients = std::mem::take(&mut self.pending);
        clients
            .into_iter()
            .map(|client| {
                tracing::info!(key = %client.key, %reason, "pending client removed");
                self.finish(&client);
                client.key
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn on_identity(&mut self, index: usize, body: Bytes, now: Instant) -> Progress {
        let key = self.pending[index].key;
        if self.pending[index].is_authenticating() {
            tracing::trace!(%key, "identity re-sent while authenticating");
            return Progress::Nothing;
        }

        let packet = match ClientIdentityPacket::decode(body) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(%key, error = %e, "malformed identity packet");
                return Progress::Reject(DisconnectReason::MalformedData.into());
            }
        };

        let name = sanitize_name(&packet.name);
        if !is_valid_name(&name) {
            return Progress::Reject(PeerDisconnectPacket::with_message(
                DisconnectReason::InvalidName,
                format!("\"{name}\" is not a valid name"),
            ));
        }

        if !is_version_compatible(&self.config.server_version, &packet.version) {
            return Progress::Reject(version_mismatch(
                &self.config.server_version,
                &packet.version,
            ));
        }

        let missing = missing_packages(&self.config.required_packages, &packet.packages);
        if let Some(rejection) = missing_packages_packet(&missing) {
            return Progress::Reject(rejection);
        }

        let client = &mut self.pending[index];
        if let Some(relay_account) = client.relay_account {
            if packet.account != Some(relay_account) {
                tracing::warn!(%key, claimed = ?packet.account, "identity does not match relay account");
                return Progress::Reject(PeerDisconnectPacket::with_message(
                    DisconnectReason::AuthenticationFailed,
                    "claimed account does not match the relay identity",
                ));
            }
        }

        client.name = Some(name);
        client.claimed_account = packet.account;
        client.owner_key = packet.owner_key;

        if packet.ticket.is_empty() {
            if self.config.require_authentication {
                return Progress::Reject(DisconnectReason::AuthenticationRequired.into());
            }
            tracing::info!(%key, "accepting client without authentication");
            enter_post_identity_step(client, &self.config, now);
            return Progress::Prompt;
        }

        let Some(account) = packet.account else {
            return Progress::Reject(PeerDisconnectPacket::with_message(
                DisconnectReason::AuthenticationFailed,
                "ticket given without an account",
            ));
        };

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        client.auth_session_started = true;
        client.auth_attempt = Some(attempt);

        let authenticator = Arc::clone(&self.authenticator);
        let outcomes = self.outcomes_tx.clone();
        let ticket = packet.ticket;
        tokio::spawn(async move {
            let result = authenticator.verify_ticket(account, ticket).await;
            let _ = outcomes.send(AuthOutcome {
                key,
                attempt,
                claimed: account,
                result,
            });
        });
        tracing::debug!(%key, %account, "authentication started");

        Progress::Nothing
    }

    fn on_password(&mut self, index: usize, body: Bytes) -> Progress {
        let client = &mut self.pending[index];
        let Some(verifier) = self.config.password.as_ref() else {
            client.step = ConnectionInitialization::Success;
            return Progress::Nothing;
        };
        let Some(salt) = client.salt else {
            return Progress::Nothing;
        };

        let response = match PasswordResponse::decode(body) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key = %client.key, error = %e, "malformed password packet");
                return Progress::Reject(DisconnectReason::MalformedData.into());
            }
        };

        if verifier.verify(salt, &response.hash) {
            client.step = ConnectionInitialization::Success;
            return Progress::Nothing;
        }

        client.retries = client.retries.saturating_add(1);
        if client.retries >= self.config.max_password_retries {
            if let Some(account) = client.ban_account() {
                self.bans
                    .ban_account(account, TOO_MANY_PASSWORD_ATTEMPTS, None);
            }
            if let Some(ip) = client.ip {
                self.bans.ban_ip(ip, TOO_MANY_PASSWORD_ATTEMPTS, None);
            }
            return Progress::Reject(PeerDisconnectPacket::with_message(
                DisconnectReason::TooManyFailedLogins,
                TOO_MANY_PASSWORD_ATTEMPTS,
            ));
        }

        tracing::info!(key = %client.key, retries = client.retries, "incorrect password");
        Progress::Prompt
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    fn apply_outcome(
        &mut self,
        outcome: AuthOutcome<K>,
        now: Instant,
        actions: &mut Vec<HandshakeAction<K>>,
    ) {
        let Some(index) = self.pending.iter().position(|client| {
            client.key == outcome.key && client.auth_attempt == Some(outcome.attempt)
        }) else {
            tracing::debug!(key = %outcome.key, "authentication finished for a client that left");
            return;
        };

        let client = &mut self.pending[index];
        client.auth_attempt = None;

        let verdict = match outcome.result {
            Err(SessionError::AuthUnavailable(reason)) if !self.config.require_authentication => {
                tracing::warn!(
                    key = %client.key,
                    %reason,
                    "identity platform unavailable, accepting client without authentication"
                );
                self.authenticator.end_session(outcome.claimed);
                client.auth_session_started = false;
                Ok(None)
            }
            Err(e) => Err(PeerDisconnectPacket::with_message(
                DisconnectReason::AuthenticationFailed,
                format!("authentication session failed: {e}"),
            )),
            Ok(info) if info.account != outcome.claimed => {
                let e = SessionError::AccountMismatch {
                    claimed: outcome.claimed,
                    verified: info.account,
                };
                Err(PeerDisconnectPacket::with_message(
                    DisconnectReason::AuthenticationFailed,
                    e.to_string(),
                ))
            }
            Ok(info) => match self.bans.check(client.ip, Some(&info)) {
                Some(reason) => Err(PeerDisconnectPacket::with_message(
                    DisconnectReason::Banned,
                    reason,
                )),
                None => Ok(Some(info)),
            },
        };

        match verdict {
            Ok(info) => {
                if let Some(info) = info {
                    tracing::info!(key = %client.key, account = %info.account, "client authenticated");
                }
                client.account = info;
                enter_post_identity_step(client, &self.config, now);
            }
            Err(packet) => {
                let client = self.pending.remove(index);
                self.reject(client, packet, actions);
            }
        }
    }

    fn tick_client(
        &mut self,
        mut client: PendingClient<K>,
        now: Instant,
        actions: &mut Vec<HandshakeAction<K>>,
    ) -> Option<PendingClient<K>> {
        let ban = self.bans.check(client.ip, client.account.as_ref()).or_else(|| {
            client
                .relay_account
                .and_then(|account| self.bans.account_ban(account))
        });
        if let Some(reason) = ban {
            self.reject(
                client,
                PeerDisconnectPacket::with_message(DisconnectReason::Banned, reason),
                actions,
            );
            return None;
        }

        if now >= client.timeout {
            self.reject(client, DisconnectReason::Timeout.into(), actions);
            return None;
        }

        if client.step == ConnectionInitialization::Success {
            actions.push(HandshakeAction::Send {
                key: client.key,
                message: prompt(&client),
            });
            let is_owner = self.take_ownership(&client);
            let connection = self.promote(client);
            actions.push(HandshakeAction::Promote(connection.clone()));
            if is_owner {
                tracing::info!(%connection, "owner determined");
                actions.push(HandshakeAction::OwnerDetermined(connection));
            }
            return None;
        }

        if now >= client.update_time {
            client.update_time = now + self.config.resend_interval;
            actions.push(HandshakeAction::Send {
                key: client.key,
                message: prompt(&client),
            });
        }
        Some(client)
    }

    /// Consumes the owner key if `client` is local and presented it.
    fn take_ownership(&mut self, client: &PendingClient<K>) -> bool {
        let is_local = client.ip.is_some_and(|ip| ip.is_loopback());
        let key_matches = self.config.owner_key.is_some() && client.owner_key == self.config.owner_key;
        if !is_local || !key_matches {
            return false;
        }
        self.config.owner_key = None;
        true
    }

    fn revoke(&mut self, revocation: Revocation, actions: &mut Vec<HandshakeAction<K>>) {
        let Revocation { account, reason } = revocation;
        tracing::info!(%account, %reason, "platform identity revoked");
        let packet = PeerDisconnectPacket::with_message(DisconnectReason::AuthenticationFailed, reason);

        let (revoked, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|client| client.holds_account(account));
        self.pending = kept;
        for client in revoked {
            self.reject(client, packet.clone(), actions);
        }
        actions.push(HandshakeAction::Revoke { account, packet });
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    fn promote(&mut self, client: PendingClient<K>) -> Connection {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        let connection = Connection::new(
            id,
            client.key.into(),
            client.name.unwrap_or_default(),
            client.account,
        );
        tracing::info!(%connection, "client promoted");
        connection
    }

    fn reject(
        &self,
        client: PendingClient<K>,
        packet: PeerDisconnectPacket,
        actions: &mut Vec<HandshakeAction<K>>,
    ) {
        tracing::info!(key = %client.key, reason = %packet, "handshake rejected");
        self.finish(&client);
        actions.push(HandshakeAction::Reject {
            key: client.key,
            packet,
        });
    }

    /// Ends the platform session of a client that is going away without
    /// being promoted. Every removal path goes through here exactly once.
    fn finish(&self, client: &PendingClient<K>) {
        if !client.auth_session_started {
            return;
        }
        if let Some(account) = client.claimed_account {
            self.authenticator.end_session(account);
        }
    }

    fn position(&self, key: K) -> Option<usize> {
        self.pending.iter().position(|client| client.key == key)
    }
}

fn enter_post_identity_step<K>(client: &mut PendingClient<K>, config: &HandshakeConfig, now: Instant) {
    if config.password.is_some() {
        client.step = ConnectionInitialization::Password;
        client.retries = 0;
        if client.salt.is_none() {
            client.salt = Some(generate_salt());
        }
    } else {
        client.step = ConnectionInitialization::Success;
    }
    client.update_time = now;
}

fn prompt<K>(client: &PendingClient<K>) -> PeerMessage {
    let body = match client.step {
        ConnectionInitialization::Password => PasswordPrompt {
            salt: client.salt,
            retries: client.retries,
        }
        .encode(),
        _ => Bytes::new(),
    };
    PeerMessage::server(PeerPacket::Initialization {
        step: client.step,
        body,
    })
}
