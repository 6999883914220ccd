//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means "these bytes are not a packet we
//! understand". The peers treat it as malformed input from the sender,
//! never as a reason to stop the server.

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended before a field could be read.
    #[error("truncated packet: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The header byte has unknown bits set or an impossible combination.
    #[error("invalid packet header {0:#04x}")]
    InvalidHeader(u8),

    /// Unknown connection initialization step tag.
    #[error("unknown initialization step {0}")]
    UnknownStep(u8),

    /// Unknown delivery method tag in a relay envelope.
    #[error("unknown delivery method {0}")]
    UnknownDeliveryMethod(u8),

    /// A relay envelope names no account.
    #[error("relay envelope has no account")]
    MissingAccount,

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A field is too long for its length prefix.
    #[error("field too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    /// The declared payload length does not match what was received.
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Compressing or decompressing a payload failed, including
    /// payloads that would inflate past the size cap.
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
}
