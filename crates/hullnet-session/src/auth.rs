//! Authentication hook for verifying platform identity.
//!
//! Hullnet doesn't talk to an identity platform itself. It defines the
//! [`Authenticator`] trait: hand it the account a client claims and the
//! ticket the client got from the platform, and it answers (eventually)
//! with the verified [`AccountInfo`] or an error.
//!
//! Verification is the one genuinely asynchronous step of the handshake.
//! The handshake spawns it as a task and picks up the result on a later
//! tick, so an implementation is free to make network calls.
//!
//! A platform can also withdraw an identity it already vouched for (a
//! licence refunded, a session kicked elsewhere). Implementations queue
//! those as [`Revocation`]s; the handshake collects them every tick.

use std::future::Future;

use bytes::Bytes;
use hullnet_protocol::AccountId;

use crate::SessionError;

/// A verified platform identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountInfo {
    /// The account the ticket belongs to.
    pub account: AccountId,
    /// The account that owns the game licence. Differs from `account` for
    /// shared (family) licences. Both are ban-checked.
    pub owner: AccountId,
}

impl AccountInfo {
    /// An account that owns its own licence.
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            owner: account,
        }
    }

    /// Every account id that a ban on any of them should apply to.
    pub fn ids(&self) -> impl Iterator<Item = AccountId> {
        let owner = (self.owner != self.account).then_some(self.owner);
        std::iter::once(self.account).chain(owner)
    }
}

/// An identity the platform no longer vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub account: AccountId,
    /// Shown to the client.
    pub reason: String,
}

impl Revocation {
    pub fn new(account: AccountId, reason: impl Into<String>) -> Self {
        Self {
            account,
            reason: reason.into(),
        }
    }
}

/// Verifies platform tickets.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static`: one authenticator is shared by every
///   verification task for the life of the server.
/// - The returned future is `Send` so it can run on any runtime thread.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use hullnet_protocol::AccountId;
/// use hullnet_session::{AccountInfo, Authenticator, SessionError};
///
/// /// Accepts the ticket "letmein" for any account.
/// struct PasswordlessAuthenticator;
///
/// impl Authenticator for PasswordlessAuthenticator {
///     async fn verify_ticket(
///         &self,
///         account: AccountId,
///         ticket: Bytes,
///     ) -> Result<AccountInfo, SessionError> {
///         if &ticket[..] == b"letmein" {
///             Ok(AccountInfo::new(account))
///         } else {
///             Err(SessionError::AuthFailed("bad ticket".into()))
///         }
///     }
///
///     fn end_session(&self, _account: AccountId) {}
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies that `ticket` proves ownership of `account`.
    fn verify_ticket(
        &self,
        account: AccountId,
        ticket: Bytes,
    ) -> impl Future<Output = Result<AccountInfo, SessionError>> + Send;

    /// Closes the platform session opened by `verify_ticket`.
    ///
    /// Called exactly once for every verification the handshake started,
    /// whether the client went on to connect or not.
    fn end_session(&self, account: AccountId);

    /// Identities withdrawn since the last call. Polled once per
    /// handshake update; pending and connected clients holding a revoked
    /// account are removed with `AuthenticationFailed`.
    fn take_revocations(&self) -> Vec<Revocation> {
        Vec::new()
    }
}

/// Accepts any non-empty ticket. For development and LAN servers only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingAuthenticator;

impl Authenticator for TrustingAuthenticator {
    async fn verify_ticket(
        &self,
        account: AccountId,
        ticket: Bytes,
    ) -> Result<AccountInfo, SessionError> {
        if ticket.is_empty() {
            return Err(SessionError::AuthFailed("empty ticket".into()));
        }
        Ok(AccountInfo::new(account))
    }

    fn end_session(&self, account: AccountId) {
        tracing::trace!(%account, "auth session ended");
    }
}
