use crate::Endpoint;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote endpoint has no established link.
    #[error("no connected link to {0}")]
    NotConnected(Endpoint),

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Binding the socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// The datagram exceeds what a single frame can carry.
    #[error("datagram too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },

    /// Too many reliable frames to this endpoint are still unacknowledged.
    #[error("too many unacknowledged frames to {0}")]
    Congested(Endpoint),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
