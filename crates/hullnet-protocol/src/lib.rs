//! Wire protocol for Hullnet.
//!
//! This crate defines the bytes that travel between a game client and the
//! server's connection layer:
//!
//! - **Header** ([`PacketHeader`]): one flag byte saying what kind of
//!   packet follows and who sent it.
//! - **Packets** ([`PeerMessage`], [`PeerPacket`]): handshake steps,
//!   disconnect notices, heartbeats and opaque gameplay payloads.
//! - **Handshake payloads** ([`ClientIdentityPacket`], [`PasswordPrompt`],
//!   [`PasswordResponse`]).
//! - **Relay framing** ([`RelayEnvelope`]): the same packets addressed by
//!   platform identity, for the relay transport.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (datagrams) → Protocol (PeerMessage) → Session (handshake)
//! ```
//!
//! Nothing here knows about connections or timers. Gameplay payloads are
//! never interpreted; they are framed, optionally compressed, and handed
//! on untouched.

mod compression;
mod error;
pub mod handshake;
mod header;
mod packet;
mod relay;
mod types;
mod wire;

pub use compression::{MAX_DECOMPRESSED_SIZE, compress_if_smaller};
pub use error::ProtocolError;
pub use handshake::{
    ClientIdentityPacket, ContentPackageEntry, PasswordPrompt, PasswordResponse, owner_hail,
    parse_owner_hail,
};
pub use header::{ConnectionInitialization, PacketHeader};
pub use packet::{PeerMessage, PeerPacket};
pub use relay::RelayEnvelope;
pub use types::{AccountId, DisconnectReason, PeerDisconnectPacket};
pub use wire::MAX_FIELD_LEN;
