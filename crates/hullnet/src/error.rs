//! Unified error type for the Hullnet server.

use std::io;
use std::path::PathBuf;

use hullnet_protocol::ProtocolError;
use hullnet_session::SessionError;
use hullnet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Server peers process inbound traffic as `Result<(), PeerError>` so `?`
/// works across layers; [`ServerPeer::update`](crate::ServerPeer::update)
/// logs a failed message and moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// A transport-level error (bind, send, shutdown).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed header, truncated body).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (identity platform failure).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid JSON for [`ServerSettings`](crate::ServerSettings).
    #[error("invalid settings in {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Automatic port forwarding could not be set up.
    #[error("port forwarding failed: {0}")]
    PortForwarding(String),

    /// A relay peer was started without an owner key to check the owner
    /// link against.
    #[error("relay peer needs an owner key")]
    OwnerKeyRequired,

    /// [`ServerPeer::start`](crate::ServerPeer::start) was called twice.
    #[error("peer already started")]
    AlreadyStarted,
}
