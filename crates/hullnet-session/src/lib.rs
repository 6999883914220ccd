//! Client handshake and identity for Hullnet.
//!
//! This crate decides who gets in:
//!
//! 1. **Validation**: name, protocol version and content packages
//!    ([`validation`]).
//! 2. **Authentication**: proving platform identity ([`Authenticator`]).
//! 3. **Password**: an optional salted challenge ([`PasswordVerifier`]).
//! 4. **Bans**: checked before, during and after all of the above
//!    ([`BanList`]).
//!
//! [`Handshake`] strings these together into one state machine that both
//! server peers embed. It owns the [`PendingClient`]s and hands finished
//! ones back as [`Connection`]s.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server peers (above)    ← execute HandshakeActions over their transport
//!     ↕
//! Session layer (this crate)  ← pending clients, auth, bans, passwords
//!     ↕
//! Protocol layer (below)  ← handshake packets, disconnect reasons
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod bans;
mod config;
mod connection;
mod error;
mod handshake;
mod password;
mod pending;
pub mod validation;

pub use auth::{AccountInfo, Authenticator, Revocation, TrustingAuthenticator};
pub use bans::{BanList, MemoryBanList};
pub use config::HandshakeConfig;
pub use connection::{Connection, ConnectionEndpoint, ConnectionId, ConnectionStatus};
pub use error::SessionError;
pub use handshake::{
    AuthOutcome, Handshake, HandshakeAction, HandshakeKey, TOO_MANY_PASSWORD_ATTEMPTS,
};
pub use password::{PasswordVerifier, generate_salt, hash_password, salted_hash};
pub use pending::PendingClient;
