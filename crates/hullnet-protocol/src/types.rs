//! Identity and disconnect types shared by both transports.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ProtocolError;
use crate::wire;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A platform identity (the identity platform's 64-bit account number).
///
/// On the wire `0` means "no account", so a present `AccountId` is never
/// zero. Use [`AccountId::from_wire`] and [`AccountId::to_wire`] at the
/// boundary instead of reading the field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub u64);

impl AccountId {
    pub fn from_wire(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn to_wire(account: Option<Self>) -> u64 {
        account.map_or(0, |a| a.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DisconnectReason
// ---------------------------------------------------------------------------

/// Why a client is leaving, or being made to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Unknown = 0,
    /// The client left on its own.
    Disconnected = 1,
    ServerShutdown = 2,
    ServerFull = 3,
    Banned = 4,
    Kicked = 5,
    /// The server requires a platform ticket and none was given.
    AuthenticationRequired = 6,
    AuthenticationFailed = 7,
    InvalidName = 8,
    InvalidVersion = 9,
    MissingContentPackage = 10,
    TooManyFailedLogins = 11,
    Timeout = 12,
    MalformedData = 13,
    ServerCrashed = 14,
}

impl DisconnectReason {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Unknown tags decode as [`DisconnectReason::Unknown`] so that a newer
    /// peer's reasons still surface as a disconnect.
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Self::Disconnected,
            2 => Self::ServerShutdown,
            3 => Self::ServerFull,
            4 => Self::Banned,
            5 => Self::Kicked,
            6 => Self::AuthenticationRequired,
            7 => Self::AuthenticationFailed,
            8 => Self::InvalidName,
            9 => Self::InvalidVersion,
            10 => Self::MissingContentPackage,
            11 => Self::TooManyFailedLogins,
            12 => Self::Timeout,
            13 => Self::MalformedData,
            14 => Self::ServerCrashed,
            _ => Self::Unknown,
        }
    }

    /// Default human-readable text used when a packet carries no message.
    pub fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Disconnected for an unknown reason",
            Self::Disconnected => "Disconnected",
            Self::ServerShutdown => "The server has been shut down",
            Self::ServerFull => "The server is full",
            Self::Banned => "You have been banned from the server",
            Self::Kicked => "You have been kicked from the server",
            Self::AuthenticationRequired => "The server requires authentication",
            Self::AuthenticationFailed => "Authentication failed",
            Self::InvalidName => "Your name is invalid",
            Self::InvalidVersion => "Incompatible game version",
            Self::MissingContentPackage => "Missing content packages",
            Self::TooManyFailedLogins => "Too many incorrect password attempts",
            Self::Timeout => "Timed out",
            Self::MalformedData => "Received malformed data",
            Self::ServerCrashed => "The server has crashed",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// ---------------------------------------------------------------------------
// PeerDisconnectPacket
// ---------------------------------------------------------------------------

/// A structured disconnect notice: a reason code plus optional detail.
///
/// This is what clients see when they are turned away, so validation
/// failures carry parameters ("server 2.0, client 1.0") in `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDisconnectPacket {
    pub reason: DisconnectReason,
    pub message: String,
}

impl PeerDisconnectPacket {
    pub fn new(reason: DisconnectReason) -> Self {
        Self {
            reason,
            message: String::new(),
        }
    }

    pub fn with_message(reason: DisconnectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Encodes as `[reason u8][u16-len message]`.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(3 + self.message.len());
        buf.put_u8(self.reason.to_u8());
        wire::put_string(&mut buf, &self.message)?;
        Ok(buf.freeze())
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let reason = DisconnectReason::from_u8(wire::get_u8(&mut body)?);
        let message = wire::get_string(&mut body)?;
        Ok(Self { reason, message })
    }
}

impl fmt::Display for PeerDisconnectPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.reason, self.message)
        }
    }
}

impl From<DisconnectReason> for PeerDisconnectPacket {
    fn from(reason: DisconnectReason) -> Self {
        Self::new(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_from_wire_zero_is_none() {
        assert_eq!(AccountId::from_wire(0), None);
        assert_eq!(AccountId::from_wire(7), Some(AccountId(7)));
        assert_eq!(AccountId::to_wire(None), 0);
    }

    #[test]
    fn test_account_display() {
        assert_eq!(AccountId(42).to_string(), "A-42");
    }

    #[test]
    fn test_disconnect_reason_unknown_tag_decodes_as_unknown() {
        assert_eq!(DisconnectReason::from_u8(200), DisconnectReason::Unknown);
        assert_eq!(
            DisconnectReason::from_u8(DisconnectReason::Timeout.to_u8()),
            DisconnectReason::Timeout
        );
    }

    #[test]
    fn test_disconnect_packet_decode_reads_reason_and_message() {
        let packet = PeerDisconnectPacket::with_message(
            DisconnectReason::InvalidVersion,
            "server 2.0, client 1.0",
        );
        let decoded = PeerDisconnectPacket::decode(packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_disconnect_packet_display_with_and_without_message() {
        assert_eq!(
            PeerDisconnectPacket::new(DisconnectReason::Kicked).to_string(),
            "You have been kicked from the server"
        );
        assert_eq!(
            PeerDisconnectPacket::with_message(DisconnectReason::Kicked, "spamming").to_string(),
            "You have been kicked from the server: spamming"
        );
    }

    #[test]
    fn test_disconnect_packet_decode_truncated_fails() {
        let result = PeerDisconnectPacket::decode(Bytes::from_static(&[4, 0]));
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }
}
