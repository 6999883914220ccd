//! Handshake rules and timings.

use std::time::Duration;

use hullnet_protocol::ContentPackageEntry;

use crate::PasswordVerifier;

/// Configuration for the handshake.
///
/// Built from the server's settings; see `ServerSettings::handshake_config`
/// in the `hullnet` crate. Defaults describe an open server with no
/// required packages.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// The server's protocol version string.
    pub server_version: String,

    /// Packages every client must have, matched by name and hash.
    pub required_packages: Vec<ContentPackageEntry>,

    /// `None` means the server has no password and the `Password` step
    /// is skipped.
    pub password: Option<PasswordVerifier>,

    /// Reject clients that present no platform ticket. When `false`, such
    /// clients join without a platform identity.
    pub require_authentication: bool,

    /// How long a pending client may go without a valid handshake message.
    ///
    /// Default: 20 seconds.
    pub timeout: Duration,

    /// How often the current step's prompt is re-sent.
    ///
    /// Default: 1 second.
    pub resend_interval: Duration,

    /// Incorrect password attempts before the client is banned.
    ///
    /// Default: 3.
    pub max_password_retries: u8,

    /// Secret handed to the process hosting the server. The first
    /// loopback client to present it becomes the owner, and the key is
    /// then forgotten.
    pub owner_key: Option<i32>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            server_version: "1.0.0.0".into(),
            required_packages: Vec::new(),
            password: None,
            require_authentication: true,
            timeout: Duration::from_secs(20),
            resend_interval: Duration::from_secs(1),
            max_password_retries: 3,
            owner_key: None,
        }
    }
}
