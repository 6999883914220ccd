//! Per-attempt handshake state.

use std::net::IpAddr;

use hullnet_protocol::{AccountId, ConnectionInitialization};
use tokio::time::Instant;

use crate::AccountInfo;

/// A client that is partway through the handshake.
///
/// Everything the client claims about itself is unverified until
/// `account` is filled in by the authenticator (or the server accepts it
/// without one).
#[derive(Debug, Clone)]
pub struct PendingClient<K> {
    /// Transport identity: socket address or relay account.
    pub key: K,

    /// Remote IP, when the transport exposes one. Used for ban checks.
    pub ip: Option<IpAddr>,

    /// The account the relay delivered this client's packets from. The
    /// relay vouches for it, so it may be banned even before the ticket
    /// is verified, and a client can't claim to be anyone else.
    pub relay_account: Option<AccountId>,

    /// Sanitized display name, once submitted.
    pub name: Option<String>,

    /// The account the client says it is.
    pub claimed_account: Option<AccountId>,

    /// The verified identity.
    pub account: Option<AccountInfo>,

    /// The owner key from the identity packet, if any.
    pub owner_key: Option<i32>,

    /// The step the server is waiting for. Messages for any other step
    /// are dropped.
    pub step: ConnectionInitialization,

    /// Incorrect password attempts.
    pub retries: u8,

    /// Issued once, on entering the `Password` step.
    pub salt: Option<i32>,

    /// When the current step's prompt is next sent.
    pub update_time: Instant,

    /// Absolute deadline; pushed back by every valid message.
    pub timeout: Instant,

    /// Whether a platform auth session is open and must be ended when
    /// the client goes away.
    pub auth_session_started: bool,

    /// Tags the outstanding verification so a late answer can't be
    /// applied to a newer client on the same key.
    pub(crate) auth_attempt: Option<u64>,
}

impl<K> PendingClient<K> {
    pub(crate) fn new(
        key: K,
        ip: Option<IpAddr>,
        relay_account: Option<AccountId>,
        now: Instant,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            key,
            ip,
            relay_account,
            name: None,
            claimed_account: None,
            account: None,
            owner_key: None,
            step: ConnectionInitialization::ConnectionStarted,
            retries: 0,
            salt: None,
            update_time: now,
            timeout: now + timeout,
            auth_session_started: false,
            auth_attempt: None,
        }
    }

    /// The account a ban should land on: the verified one, else the one
    /// the relay vouches for.
    pub fn ban_account(&self) -> Option<AccountId> {
        self.account
            .map(|info| info.account)
            .or(self.relay_account)
    }

    /// Whether a verification is in flight.
    pub fn is_authenticating(&self) -> bool {
        self.auth_attempt.is_some()
    }

    /// Whether this client stands to lose its place if `account` is
    /// revoked: verified as it, or waiting to be.
    pub fn holds_account(&self, account: AccountId) -> bool {
        self.account.is_some_and(|info| info.account == account)
            || (self.is_authenticating() && self.claimed_account == Some(account))
    }
}
