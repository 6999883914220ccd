//! Server settings.
//!
//! [`ServerSettings`] is what the operator edits: a flat, serde-loadable
//! struct with defaults for everything. The peers never read it directly
//! past construction; they take what they need and hand the handshake
//! rules to the session layer through [`ServerSettings::handshake_config`].
//!
//! ```json
//! {
//!   "name": "Deep Trench",
//!   "port": 27015,
//!   "max_players": 8,
//!   "password": "hunter2",
//!   "content_packages": [
//!     { "name": "Vanilla", "hash": "3a7bd3e", "multiplayer_incompatible": true }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use hullnet_protocol::ContentPackageEntry;
use hullnet_session::{HandshakeConfig, PasswordVerifier};
use serde::{Deserialize, Serialize};

use crate::PeerError;

/// A content package installed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPackageSetting {
    pub name: String,
    pub hash: String,

    /// Clients must have this exact package (name and hash) to join.
    #[serde(default)]
    pub multiplayer_incompatible: bool,
}

/// Everything the operator can configure about the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Display name of the server.
    pub name: String,

    /// UDP port to listen on.
    ///
    /// Default: 27015.
    pub port: u16,

    /// Connected clients beyond which new connection attempts are denied.
    ///
    /// Default: 16.
    pub max_players: usize,

    /// Clients must answer a salted password challenge when set.
    pub password: Option<String>,

    /// Ask the router to forward `port` on start. Failure is logged, never
    /// fatal.
    pub enable_port_forwarding: bool,

    /// Reject clients that present no platform ticket.
    ///
    /// Default: true.
    pub require_authentication: bool,

    /// Protocol version clients are checked against.
    pub protocol_version: String,

    pub content_packages: Vec<ContentPackageSetting>,

    /// Seconds a pending client may go without a valid handshake message.
    ///
    /// Default: 20.
    pub handshake_timeout_secs: u64,

    /// Milliseconds between handshake prompt re-sends.
    ///
    /// Default: 1000.
    pub resend_interval_ms: u64,

    /// Incorrect password attempts before a ban.
    ///
    /// Default: 3.
    pub max_password_retries: u8,

    /// Seconds between relay heartbeats to connected clients.
    ///
    /// Default: 5.
    pub relay_heartbeat_interval_secs: u64,

    /// Seconds a relay client may stay silent before it is timed out.
    ///
    /// Default: 60.
    pub relay_connection_timeout_secs: u64,

    /// Secret the hosting game client proves it owns the server with. A
    /// loopback client presenting it becomes the owner; the relay owner
    /// link must present it to be accepted. Zero counts as unset.
    pub owner_key: Option<i32>,

    /// Gameplay payloads at least this long are compressed when that
    /// makes them smaller.
    ///
    /// Default: 128.
    pub compression_threshold: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "Hullnet Server".into(),
            port: 27015,
            max_players: 16,
            password: None,
            enable_port_forwarding: false,
            require_authentication: true,
            protocol_version: "1.0.0.0".into(),
            content_packages: Vec::new(),
            handshake_timeout_secs: 20,
            resend_interval_ms: 1000,
            max_password_retries: 3,
            relay_heartbeat_interval_secs: 5,
            relay_connection_timeout_secs: 60,
            owner_key: None,
            compression_threshold: 128,
        }
    }
}

impl ServerSettings {
    /// Loads settings from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PeerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PeerError::SettingsRead {
            path: path.to_owned(),
            source,
        })?;
        let settings = serde_json::from_str(&text).map_err(|source| PeerError::SettingsParse {
            path: path.to_owned(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded server settings");
        Ok(settings)
    }

    /// Clamps values that would make the server unusable.
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 {
            tracing::warn!("max_players must be at least 1, using 1");
            self.max_players = 1;
        }
        if self.max_password_retries == 0 {
            tracing::warn!("max_password_retries must be at least 1, using 1");
            self.max_password_retries = 1;
        }
        if self.handshake_timeout_secs == 0 {
            tracing::warn!("handshake_timeout_secs must be at least 1, using 1");
            self.handshake_timeout_secs = 1;
        }
        if self.resend_interval_ms == 0 {
            tracing::warn!("resend_interval_ms must be at least 1, using 100");
            self.resend_interval_ms = 100;
        }
        if self.relay_heartbeat_interval_secs == 0 {
            tracing::warn!("relay_heartbeat_interval_secs must be at least 1, using 1");
            self.relay_heartbeat_interval_secs = 1;
        }
        if self.relay_connection_timeout_secs <= self.relay_heartbeat_interval_secs {
            let fixed = self.relay_heartbeat_interval_secs * 2;
            tracing::warn!(
                timeout = self.relay_connection_timeout_secs,
                heartbeat = self.relay_heartbeat_interval_secs,
                "relay timeout must exceed the heartbeat interval, using {fixed}"
            );
            self.relay_connection_timeout_secs = fixed;
        }
        if self.password.as_deref() == Some("") {
            self.password = None;
        }
        if self.owner_key == Some(0) {
            tracing::warn!("owner_key 0 means no owner, ignoring it");
            self.owner_key = None;
        }
        self
    }

    /// The session layer's view of these settings.
    ///
    /// Only multiplayer-incompatible packages are required of clients;
    /// a package listed twice is required once.
    pub fn handshake_config(&self) -> HandshakeConfig {
        let mut seen = HashSet::new();
        let required_packages = self
            .content_packages
            .iter()
            .filter(|package| package.multiplayer_incompatible)
            .map(|package| ContentPackageEntry::new(&package.name, &package.hash))
            .filter(|entry| seen.insert(entry.clone()))
            .collect();

        HandshakeConfig {
            server_version: self.protocol_version.clone(),
            required_packages,
            password: self
                .password
                .as_deref()
                .filter(|password| !password.is_empty())
                .map(PasswordVerifier::new),
            require_authentication: self.require_authentication,
            timeout: Duration::from_secs(self.handshake_timeout_secs),
            resend_interval: Duration::from_millis(self.resend_interval_ms),
            max_password_retries: self.max_password_retries,
            owner_key: self.owner_key.filter(|key| *key != 0),
        }
    }

    pub fn relay_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.relay_heartbeat_interval_secs)
    }

    pub fn relay_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connection_timeout_secs)
    }
}
