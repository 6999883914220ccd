//! The promoted, fully-joined client.

use std::fmt;
use std::net::SocketAddr;

use hullnet_protocol::AccountId;

use crate::AccountInfo;

/// Where a connection's packets go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEndpoint {
    /// A remote address on the direct transport.
    Direct(SocketAddr),
    /// A platform identity behind the relay.
    Relay(AccountId),
}

impl From<SocketAddr> for ConnectionEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Direct(addr)
    }
}

impl From<AccountId> for ConnectionEndpoint {
    fn from(account: AccountId) -> Self {
        Self::Relay(account)
    }
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(addr) => write!(f, "{addr}"),
            Self::Relay(account) => write!(f, "relay:{account}"),
        }
    }
}

/// Liveness of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Identifies one promotion. A client that leaves and joins again from
/// the same endpoint gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A client that completed the handshake.
///
/// The peer that created it owns the authoritative copy. Everyone else
/// holds clones as handles and routes sends through the peer, which
/// refuses handles whose id is no longer connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub endpoint: ConnectionEndpoint,
    /// Sanitized display name.
    pub name: String,
    /// Verified platform identity. `None` for unauthenticated clients.
    pub account: Option<AccountInfo>,
    pub status: ConnectionStatus,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        endpoint: ConnectionEndpoint,
        name: String,
        account: Option<AccountInfo>,
    ) -> Self {
        Self {
            id,
            endpoint,
            name,
            account,
            status: ConnectionStatus::Connected,
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account.map(|info| info.account)
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// The remote IP, if the transport exposes one.
    pub fn ip(&self) -> Option<std::net::IpAddr> {
        match self.endpoint {
            ConnectionEndpoint::Direct(addr) => Some(addr.ip()),
            ConnectionEndpoint::Relay(_) => None,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.endpoint)
    }
}
