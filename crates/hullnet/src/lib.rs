//! # Hullnet
//!
//! The connection layer of a dedicated game server.
//!
//! Hullnet accepts clients over one of two transports, runs each through
//! a handshake (name, version, content packages, platform identity,
//! optional password) and hands the rest of the server fully connected
//! [`Connection`]s to exchange gameplay messages with.
//!
//! - [`DirectServerPeer`]: clients connect straight to the server's
//!   socket, one transport link each.
//! - [`RelayServerPeer`]: clients arrive through the identity platform's
//!   relay, multiplexed over a single loopback owner link.
//!
//! Both implement [`ServerPeer`] and report what happens as [`PeerEvent`]s
//! on a channel, so the server loop doesn't care which one it runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hullnet::prelude::*;
//!
//! # async fn run() -> Result<(), PeerError> {
//! let settings = ServerSettings::default();
//! let transport = UdpTransport::bind(("0.0.0.0", settings.port)).await?;
//! let bans: Arc<dyn BanList> = Arc::new(MemoryBanList::new());
//! let (mut peer, mut events) =
//!     DirectServerPeer::new(transport, &settings, Arc::new(TrustingAuthenticator), bans);
//!
//! peer.start()?;
//! loop {
//!     peer.update(Duration::from_millis(16));
//!     while let Ok(event) = events.try_recv() {
//!         if let PeerEvent::MessageReceived { connection, data } = event {
//!             peer.send(&connection, &data, DeliveryMethod::Reliable);
//!         }
//!     }
//!     tokio::time::sleep(Duration::from_millis(16)).await;
//! }
//! # }
//! ```

mod direct;
mod error;
mod forward;
mod peer;
mod relay;
mod settings;

pub use direct::DirectServerPeer;
pub use error::PeerError;
pub use forward::{NoPortForwarding, PortForwarder, UpnpForwarder};
pub use peer::{PeerEvent, PeerEvents, ServerPeer};
pub use relay::RelayServerPeer;
pub use settings::{ContentPackageSetting, ServerSettings};

pub use hullnet_protocol::{AccountId, DisconnectReason, PeerDisconnectPacket};
pub use hullnet_session::{
    AccountInfo, Authenticator, BanList, Connection, ConnectionEndpoint, ConnectionId,
    ConnectionStatus, MemoryBanList, Revocation, TrustingAuthenticator,
};
pub use hullnet_transport::DeliveryMethod;

/// Everything a server loop needs, in one import.
pub mod prelude {
    pub use crate::{
        AccountId, AccountInfo, Authenticator, BanList, Connection, DeliveryMethod,
        DirectServerPeer, DisconnectReason, MemoryBanList, PeerDisconnectPacket, PeerError,
        PeerEvent, RelayServerPeer, ServerPeer, ServerSettings, TrustingAuthenticator,
    };
    pub use hullnet_transport::UdpTransport;
}
