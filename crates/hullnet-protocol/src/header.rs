//! The packet header byte and the handshake step tags.

use std::fmt;

use bitflags::bitflags;

use crate::ProtocolError;

bitflags! {
    /// Framing metadata carried in the first byte of every peer packet.
    ///
    /// Flags combine, but not freely. A packet is exactly one of:
    ///
    /// - a handshake step (`IS_CONNECTION_INITIALIZATION_STEP`),
    /// - a disconnect notice (`IS_DISCONNECT_MESSAGE`),
    /// - a heartbeat (`IS_HEARTBEAT_MESSAGE`),
    /// - a gameplay payload (none of the above), the only kind that may
    ///   be `IS_COMPRESSED`.
    ///
    /// `IS_SERVER_MESSAGE` marks the direction and may accompany any kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketHeader: u8 {
        /// The gameplay payload is zstd-compressed.
        const IS_COMPRESSED = 0x01;
        /// The body is a handshake step.
        const IS_CONNECTION_INITIALIZATION_STEP = 0x02;
        /// The body is a disconnect reason.
        const IS_DISCONNECT_MESSAGE = 0x04;
        /// Sent by the server.
        const IS_SERVER_MESSAGE = 0x08;
        /// Keepalive with no body.
        const IS_HEARTBEAT_MESSAGE = 0x10;
    }
}

impl PacketHeader {
    /// No flags: a client gameplay packet.
    pub const NONE: Self = Self::empty();

    const KIND_FLAGS: Self = Self::IS_CONNECTION_INITIALIZATION_STEP
        .union(Self::IS_DISCONNECT_MESSAGE)
        .union(Self::IS_HEARTBEAT_MESSAGE);

    /// Parses a header byte, rejecting unknown bits and combinations that
    /// can't describe a real packet.
    pub fn decode(byte: u8) -> Result<Self, ProtocolError> {
        Self::from_bits(byte)
            .filter(|header| header.is_valid())
            .ok_or(ProtocolError::InvalidHeader(byte))
    }

    pub fn encode(self) -> u8 {
        self.bits()
    }

    /// Whether this combination of flags describes a real packet.
    pub fn is_valid(self) -> bool {
        let kinds = self.intersection(Self::KIND_FLAGS).bits().count_ones();
        if kinds > 1 {
            return false;
        }
        !(self.contains(Self::IS_COMPRESSED) && kinds != 0)
    }

    /// True when the body is an opaque gameplay payload.
    pub fn is_gameplay(self) -> bool {
        !self.intersects(Self::KIND_FLAGS)
    }
}

// ---------------------------------------------------------------------------
// ConnectionInitialization
// ---------------------------------------------------------------------------

/// Handshake steps, in the order a client passes through them.
///
/// `Password` is skipped when the server has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionInitialization {
    ConnectionStarted = 0,
    IdentityAndVersion = 1,
    Password = 2,
    Success = 3,
}

impl ConnectionInitialization {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0 => Ok(Self::ConnectionStarted),
            1 => Ok(Self::IdentityAndVersion),
            2 => Ok(Self::Password),
            3 => Ok(Self::Success),
            other => Err(ProtocolError::UnknownStep(other)),
        }
    }
}

impl fmt::Display for ConnectionInitialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionStarted => "connection-started",
            Self::IdentityAndVersion => "identity-and-version",
            Self::Password => "password",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}
