//! Error types for the session layer.

use hullnet_protocol::AccountId;

/// Errors that can occur while establishing a client's identity.
///
/// Handshake validation failures (bad name, wrong version, missing
/// packages) are not errors: they become a
/// [`PeerDisconnectPacket`](hullnet_protocol::PeerDisconnectPacket) sent to
/// the client. These variants cover the identity platform itself.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity platform rejected the ticket.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The identity platform could not be reached. Servers that don't
    /// require authentication let the client in without an identity.
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),

    /// The ticket was valid, but for a different account than claimed.
    #[error("ticket is for {verified}, client claimed {claimed}")]
    AccountMismatch {
        claimed: AccountId,
        verified: AccountId,
    },
}
