//! Shared fixtures for the peer integration tests.
//!
//! Clients here are scripted: each test decides exactly which frames the
//! client sends and reads back what the server answered, so the server is
//! exercised the way a real (or hostile) client would exercise it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use hullnet::{
    AccountId, AccountInfo, Authenticator, PeerDisconnectPacket, PeerEvent, PeerEvents,
    ServerSettings,
};
use hullnet_protocol::{
    ClientIdentityPacket, ConnectionInitialization, ContentPackageEntry, PeerMessage,
    PeerPacket, RelayEnvelope, owner_hail,
};
use hullnet_session::{Revocation, SessionError};
use hullnet_transport::{DeliveryMethod, Frame, MemoryClient, MemoryNetwork};

/// One server tick.
pub const TICK: Duration = Duration::from_millis(50);

/// The owner key every test server is configured with.
pub const OWNER_KEY: i32 = 0x5eed;

pub fn server_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 27015))
}

pub fn client_addr(n: u8) -> SocketAddr {
    SocketAddr::from(([198, 51, 100, n], 5000))
}

pub fn relay_server_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 27015))
}

pub fn owner_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

pub fn settings() -> ServerSettings {
    ServerSettings {
        content_packages: vec![hullnet::ContentPackageSetting {
            name: "Vanilla".into(),
            hash: "aaaaaaaaaa".into(),
            multiplayer_incompatible: true,
        }],
        owner_key: Some(OWNER_KEY),
        ..ServerSettings::default()
    }
}

pub fn identity(name: &str, account: u64) -> ClientIdentityPacket {
    ClientIdentityPacket {
        name: name.into(),
        account: Some(AccountId(account)),
        ticket: Bytes::from_static(b"ticket"),
        version: "1.0.0.0".into(),
        packages: vec![ContentPackageEntry::new("Vanilla", "aaaaaaaaaa")],
        owner_key: None,
    }
}

pub fn step(step: ConnectionInitialization, body: Bytes) -> PeerMessage {
    PeerMessage::client(PeerPacket::Initialization { step, body })
}

pub fn identity_message(packet: &ClientIdentityPacket) -> PeerMessage {
    step(
        ConnectionInitialization::IdentityAndVersion,
        packet.encode().unwrap(),
    )
}

/// Lets spawned authentication tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn drain_events(events: &mut PeerEvents) -> Vec<PeerEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

// -- Authenticator ----------------------------------------------------------

/// Accepts every non-empty ticket and records session ends.
#[derive(Default)]
pub struct RecordingAuthenticator {
    pub ended: Mutex<Vec<AccountId>>,
    pub owners: Mutex<HashMap<AccountId, AccountId>>,
    pub revoked: Mutex<Vec<Revocation>>,
}

impl RecordingAuthenticator {
    pub fn ended(&self) -> Vec<AccountId> {
        self.ended.lock().unwrap().clone()
    }

    /// Withdraws `account` on the next handshake update.
    pub fn revoke(&self, account: u64, reason: &str) {
        self.revoked
            .lock()
            .unwrap()
            .push(Revocation::new(AccountId(account), reason));
    }
}

impl Authenticator for RecordingAuthenticator {
    async fn verify_ticket(
        &self,
        account: AccountId,
        ticket: Bytes,
    ) -> Result<AccountInfo, SessionError> {
        if ticket.is_empty() {
            return Err(SessionError::AuthFailed("empty ticket".into()));
        }
        let owner = self
            .owners
            .lock()
            .unwrap()
            .get(&account)
            .copied()
            .unwrap_or(account);
        Ok(AccountInfo { account, owner })
    }

    fn end_session(&self, account: AccountId) {
        self.ended.lock().unwrap().push(account);
    }

    fn take_revocations(&self) -> Vec<Revocation> {
        std::mem::take(&mut *self.revoked.lock().unwrap())
    }
}

// -- Direct client ----------------------------------------------------------

/// A client talking to a direct peer over a [`MemoryNetwork`].
pub struct TestClient {
    link: MemoryClient,
}

impl TestClient {
    pub fn new(net: &MemoryNetwork, addr: SocketAddr) -> Self {
        Self {
            link: net.client(addr, server_addr()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.link.local_addr()
    }

    pub fn connect(&self) {
        self.link.connect();
    }

    pub fn send(&self, message: &PeerMessage) {
        self.link
            .send(DeliveryMethod::ReliableOrdered, message.encode(None).unwrap());
    }

    pub fn send_raw(&self, payload: &'static [u8]) {
        self.link.send(DeliveryMethod::ReliableOrdered, payload);
    }

    pub fn leave(&self, packet: &PeerDisconnectPacket) {
        self.link.disconnect(&packet.encode().unwrap());
    }

    /// Every frame received so far, keepalives excluded.
    pub fn frames(&mut self) -> Vec<Frame> {
        self.link
            .drain()
            .into_iter()
            .filter(|frame| *frame != Frame::Keepalive)
            .collect()
    }
}

/// Decodes the peer messages carried by data frames.
pub fn messages(frames: &[Frame]) -> Vec<PeerMessage> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::Data { payload, .. } => PeerMessage::decode(payload.clone()).ok(),
            _ => None,
        })
        .collect()
}

/// The reason carried by a deny or disconnect frame, if any.
pub fn link_closed(frames: &[Frame]) -> Option<PeerDisconnectPacket> {
    frames.iter().find_map(|frame| match frame {
        Frame::Deny(reason) | Frame::Disconnect(reason) => {
            PeerDisconnectPacket::decode(reason.clone()).ok()
        }
        _ => None,
    })
}

// -- Relay owner ------------------------------------------------------------

/// The owner link of a relay peer, speaking for every relay client.
pub struct OwnerLink {
    link: MemoryClient,
}

impl OwnerLink {
    pub fn new(net: &MemoryNetwork, addr: SocketAddr) -> Self {
        Self {
            link: net.client(addr, relay_server_addr()),
        }
    }

    /// Connects presenting [`OWNER_KEY`].
    pub fn connect(&self) {
        self.connect_with_key(OWNER_KEY);
    }

    pub fn connect_with_key(&self, key: i32) {
        self.link.connect_with(owner_hail(key));
    }

    pub fn connect_without_key(&self) {
        self.link.connect();
    }

    pub fn keepalive(&self) {
        self.link.keepalive();
    }

    pub fn close(&self) {
        self.link.disconnect(b"owner quit");
    }

    pub fn send_as(&self, account: u64, message: PeerMessage) {
        let data = RelayEnvelope::new(AccountId(account), DeliveryMethod::ReliableOrdered, message)
            .encode(None)
            .unwrap();
        self.link.send(DeliveryMethod::ReliableOrdered, data);
    }

    pub fn send_raw(&self, payload: Bytes) {
        self.link.send(DeliveryMethod::ReliableOrdered, payload);
    }

    /// Every frame received so far, keepalives excluded.
    pub fn frames(&mut self) -> Vec<Frame> {
        self.link
            .drain()
            .into_iter()
            .filter(|frame| *frame != Frame::Keepalive)
            .collect()
    }
}

/// Decodes the relay envelopes carried by data frames.
pub fn envelopes(frames: &[Frame]) -> Vec<RelayEnvelope> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::Data { payload, .. } => RelayEnvelope::decode(payload.clone()).ok(),
            _ => None,
        })
        .collect()
}

/// The disconnect packets sent to `account`.
pub fn disconnects_for(envelopes: &[RelayEnvelope], account: u64) -> Vec<PeerDisconnectPacket> {
    envelopes
        .iter()
        .filter(|envelope| envelope.account == AccountId(account))
        .filter_map(|envelope| match &envelope.message.packet {
            PeerPacket::Disconnect(packet) => Some(packet.clone()),
            _ => None,
        })
        .collect()
}
