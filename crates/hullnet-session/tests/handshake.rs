//! Integration tests for the shared handshake state machine.
//!
//! These drive a `Handshake` directly, the way a peer would: add a client,
//! feed it step messages, tick it, and inspect the actions it returns.
//! Authentication runs on spawned tasks, so tests `settle()` the runtime
//! before the tick that should observe a verification result.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use hullnet_protocol::{
    AccountId, ClientIdentityPacket, ConnectionInitialization, ContentPackageEntry,
    DisconnectReason, PasswordPrompt, PasswordResponse, PeerMessage, PeerPacket,
};
use hullnet_session::{
    AccountInfo, Authenticator, BanList, Handshake, HandshakeAction, HandshakeConfig,
    MemoryBanList, PasswordVerifier, Revocation, SessionError, hash_password, salted_hash,
};
use tokio::sync::Semaphore;
use tokio::time::Instant;

// -- Helpers ----------------------------------------------------------------

/// Records every verification and session end, and can hold verifications
/// until released.
#[derive(Default)]
struct RecordingAuthenticator {
    started: Mutex<Vec<AccountId>>,
    ended: Mutex<Vec<AccountId>>,
    owners: Mutex<HashMap<AccountId, AccountId>>,
    rejected: Mutex<HashSet<AccountId>>,
    unreachable: Mutex<HashSet<AccountId>>,
    revoked: Mutex<Vec<Revocation>>,
    gate: Option<Semaphore>,
}

impl RecordingAuthenticator {
    fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(100);
        }
    }

    fn started(&self) -> Vec<AccountId> {
        self.started.lock().unwrap().clone()
    }

    fn ended(&self) -> Vec<AccountId> {
        self.ended.lock().unwrap().clone()
    }

    fn revoke(&self, account: AccountId, reason: &str) {
        self.revoked.lock().unwrap().push(Revocation::new(account, reason));
    }
}

impl Authenticator for RecordingAuthenticator {
    async fn verify_ticket(
        &self,
        account: AccountId,
        _ticket: Bytes,
    ) -> Result<AccountInfo, SessionError> {
        self.started.lock().unwrap().push(account);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if self.rejected.lock().unwrap().contains(&account) {
            return Err(SessionError::AuthFailed("ticket expired".into()));
        }
        if self.unreachable.lock().unwrap().contains(&account) {
            return Err(SessionError::AuthUnavailable("platform offline".into()));
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

struct Harness {
    hs: Handshake<SocketAddr, RecordingAuthenticator>,
    auth: Arc<RecordingAuthenticator>,
    bans: Arc<MemoryBanList>,
    now: Instant,
}

impl Harness {
    fn new(config: HandshakeConfig) -> Self {
        Self::with_auth(config, RecordingAuthenticator::default())
    }

    fn with_auth(config: HandshakeConfig, auth: RecordingAuthenticator) -> Self {
        let auth = Arc::new(auth);
        let bans = Arc::new(MemoryBanList::new());
        let hs = Handshake::new(config, Arc::clone(&auth), bans.clone() as Arc<dyn BanList>);
        Self {
            hs,
            auth,
            bans,
            now: Instant::now(),
        }
    }

    fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    fn update(&mut self) -> Vec<HandshakeAction<SocketAddr>> {
        self.hs.update(self.now)
    }

    fn step(
        &mut self,
        key: SocketAddr,
        step: ConnectionInitialization,
        body: Bytes,
    ) -> Vec<HandshakeAction<SocketAddr>> {
        self.hs.handle_step(key, step, body, self.now)
    }

    /// Adds a client and walks it past `ConnectionStarted`.
    fn connect(&mut self, key: SocketAddr) {
        assert!(self.hs.add(key, Some(key.ip()), None, self.now));
        self.step(key, ConnectionInitialization::ConnectionStarted, Bytes::new());
    }

    fn identify(&mut self, key: SocketAddr, packet: &ClientIdentityPacket) -> Vec<HandshakeAction<SocketAddr>> {
        self.step(
            key,
            ConnectionInitialization::IdentityAndVersion,
            packet.encode().unwrap(),
        )
    }

    fn answer_password(&mut self, key: SocketAddr, password: &str, salt: i32) -> Vec<HandshakeAction<SocketAddr>> {
        let hash = salted_hash(&hash_password(password), salt);
        let body = PasswordResponse {
            hash: Bytes::copy_from_slice(&hash),
        }
        .encode()
        .unwrap();
        self.step(key, ConnectionInitialization::Password, body)
    }
}

/// Lets spawned authentication tasks run to completion.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn addr(last: u8) -> SocketAddr {
    SocketAddr::from(([203, 0, 113, last], 27015))
}

fn alice() -> ClientIdentityPacket {
    ClientIdentityPacket {
        name: "Alice".into(),
        account: Some(AccountId(1001)),
        ticket: Bytes::from_static(b"ticket"),
        version: "1.0.0.0".into(),
        packages: vec![ContentPackageEntry::new("Vanilla", "aaaaaaaaaa")],
        owner_key: None,
    }
}

fn local(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn owners(actions: &[HandshakeAction<SocketAddr>]) -> Vec<&hullnet_session::Connection> {
    actions
        .iter()
        .filter_map(|action| match action {
            HandshakeAction::OwnerDetermined(connection) => Some(connection),
            _ => None,
        })
        .collect()
}

fn config() -> HandshakeConfig {
    HandshakeConfig {
        server_version: "1.0.0.0".into(),
        required_packages: vec![ContentPackageEntry::new("Vanilla", "aaaaaaaaaa")],
        ..HandshakeConfig::default()
    }
}

fn password_config(password: &str) -> HandshakeConfig {
    HandshakeConfig {
        password: Some(PasswordVerifier::new(password)),
        ..config()
    }
}

fn rejection(actions: &[HandshakeAction<SocketAddr>]) -> Option<&hullnet_protocol::PeerDisconnectPacket> {
    actions.iter().find_map(|action| match action {
        HandshakeAction::Reject { packet, .. } => Some(packet),
        _ => None,
    })
}

fn promotions(actions: &[HandshakeAction<SocketAddr>]) -> Vec<&hullnet_session::Connection> {
    actions
        .iter()
        .filter_map(|action| match action {
            HandshakeAction::Promote(connection) => Some(connection),
            _ => None,
        })
        .collect()
}

fn password_prompt(actions: &[HandshakeAction<SocketAddr>]) -> Option<PasswordPrompt> {
    actions.iter().find_map(|action| match action {
        HandshakeAction::Send {
            message:
                PeerMessage {
                    packet:
                        PeerPacket::Initialization {
                            step: ConnectionInitialization::Password,
                            body,
                        },
                    ..
                },
            ..
        } => PasswordPrompt::decode(body.clone()).ok(),
        _ => None,
    })
}

// =========================================================================
// Promotion
// =========================================================================

#[tokio::test]
async fn test_valid_handshake_promotes_alice_once() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    let actions = h.identify(addr(1), &alice());
    assert!(actions.is_empty(), "nothing to do while authenticating");
    settle().await;

    let actions = h.update();
    let promoted = promotions(&actions);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].name, "Alice");
    assert_eq!(promoted[0].account_id(), Some(AccountId(1001)));
    assert!(actions.contains(&HandshakeAction::Send {
        key: addr(1),
        message: PeerMessage::server(PeerPacket::step(ConnectionInitialization::Success)),
    }));
    assert!(h.hs.is_empty());

    // Nothing more on later ticks.
    h.advance(Duration::from_secs(5));
    assert!(promotions(&h.update()).is_empty());
}

#[tokio::test]
async fn test_promotion_does_not_end_auth_session() {
    let mut h = Harness::new(config());
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;
    h.update();

    assert!(h.auth.ended().is_empty());
}

#[tokio::test]
async fn test_promoted_connections_get_distinct_ids() {
    let mut h = Harness::new(config());
    let bob = ClientIdentityPacket {
        name: "Bob".into(),
        account: Some(AccountId(1002)),
        ..alice()
    };
    h.connect(addr(1));
    h.connect(addr(2));
    h.identify(addr(1), &alice());
    h.identify(addr(2), &bob);
    settle().await;

    let actions = h.update();
    let promoted = promotions(&actions);
    assert_eq!(promoted.len(), 2);
    assert_ne!(promoted[0].id, promoted[1].id);
}

// =========================================================================
// Validation
// =========================================================================

#[tokio::test]
async fn test_version_mismatch_rejects_with_both_versions() {
    let mut h = Harness::new(HandshakeConfig {
        server_version: "2.0".into(),
        ..config()
    });
    h.connect(addr(1));

    let actions = h.identify(
        addr(1),
        &ClientIdentityPacket {
            version: "1.0".into(),
            ..alice()
        },
    );

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::InvalidVersion);
    assert!(packet.message.contains("1.0"));
    assert!(packet.message.contains("2.0"));
    assert!(h.hs.is_empty());
    assert!(promotions(&h.update()).is_empty());
    assert!(h.auth.started().is_empty(), "no auth for a rejected client");
}

#[tokio::test]
async fn test_invalid_name_rejects() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    let actions = h.identify(
        addr(1),
        &ClientIdentityPacket {
            name: "<script>".into(),
            ..alice()
        },
    );

    assert_eq!(
        rejection(&actions).map(|p| p.reason),
        Some(DisconnectReason::InvalidName)
    );
}

#[tokio::test]
async fn test_missing_single_package_names_it() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    let actions = h.identify(
        addr(1),
        &ClientIdentityPacket {
            packages: Vec::new(),
            ..alice()
        },
    );

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::MissingContentPackage);
    assert!(packet.message.contains("\"Vanilla\" (hash aaaaaaa)"));
}

#[tokio::test]
async fn test_missing_several_packages_lists_all() {
    let mut h = Harness::new(HandshakeConfig {
        required_packages: vec![
            ContentPackageEntry::new("Vanilla", "aaaaaaaaaa"),
            ContentPackageEntry::new("Subs", "bbbbbbbbbb"),
            ContentPackageEntry::new("Items", "cccccccccc"),
        ],
        ..config()
    });
    h.connect(addr(1));

    let actions = h.identify(addr(1), &alice());

    let packet = rejection(&actions).expect("should reject");
    assert!(packet.message.ends_with("\"Subs\" (hash bbbbbbb), \"Items\" (hash ccccccc)"));
    assert!(!packet.message.contains("Vanilla"));
}

#[tokio::test]
async fn test_malformed_identity_rejects() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    let actions = h.step(
        addr(1),
        ConnectionInitialization::IdentityAndVersion,
        Bytes::from_static(&[0, 9, 1]),
    );

    assert_eq!(
        rejection(&actions).map(|p| p.reason),
        Some(DisconnectReason::MalformedData)
    );
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_no_ticket_with_required_auth_rejects() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    let actions = h.identify(
        addr(1),
        &ClientIdentityPacket {
            ticket: Bytes::new(),
            ..alice()
        },
    );

    assert_eq!(
        rejection(&actions).map(|p| p.reason),
        Some(DisconnectReason::AuthenticationRequired)
    );
}

#[tokio::test]
async fn test_no_ticket_without_required_auth_joins_unauthenticated() {
    let mut h = Harness::new(HandshakeConfig {
        require_authentication: false,
        ..config()
    });
    h.connect(addr(1));

    h.identify(
        addr(1),
        &ClientIdentityPacket {
            ticket: Bytes::new(),
            account: None,
            ..alice()
        },
    );
    let actions = h.update();

    let promoted = promotions(&actions);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].account, None);
    assert!(h.auth.started().is_empty());
}

#[tokio::test]
async fn test_auth_failure_rejects_and_ends_session_once() {
    let auth = RecordingAuthenticator::default();
    auth.rejected.lock().unwrap().insert(AccountId(1001));
    let mut h = Harness::with_auth(config(), auth);
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    let actions = h.update();

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::AuthenticationFailed);
    assert!(packet.message.contains("ticket expired"));
    assert_eq!(h.auth.ended(), vec![AccountId(1001)]);
}

#[tokio::test]
async fn test_platform_unreachable_without_required_auth_joins_unauthenticated() {
    let auth = RecordingAuthenticator::default();
    auth.unreachable.lock().unwrap().insert(AccountId(1001));
    let mut h = Harness::with_auth(
        HandshakeConfig {
            require_authentication: false,
            ..config()
        },
        auth,
    );
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    let actions = h.update();

    let promoted = promotions(&actions);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].account, None);
    assert_eq!(h.auth.ended(), vec![AccountId(1001)], "session closed right away");
}

#[tokio::test]
async fn test_platform_unreachable_with_required_auth_rejects() {
    let auth = RecordingAuthenticator::default();
    auth.unreachable.lock().unwrap().insert(AccountId(1001));
    let mut h = Harness::with_auth(config(), auth);
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    let actions = h.update();

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::AuthenticationFailed);
    assert!(packet.message.contains("platform offline"));
    assert_eq!(h.auth.ended(), vec![AccountId(1001)]);
}

#[tokio::test]
async fn test_revoked_account_is_rejected_while_pending() {
    let mut h = Harness::new(password_config("hunter2"));
    reach_password(&mut h, addr(1)).await;

    h.auth.revoke(AccountId(1001), "licence refunded");
    let actions = h.update();

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::AuthenticationFailed);
    assert_eq!(packet.message, "licence refunded");
    assert!(actions.contains(&HandshakeAction::Revoke {
        account: AccountId(1001),
        packet: packet.clone(),
    }));
    assert!(h.hs.is_empty());
    assert_eq!(h.auth.ended(), vec![AccountId(1001)]);
}

#[tokio::test]
async fn test_revocation_during_auth_drops_client_and_ignores_result() {
    let mut h = Harness::with_auth(config(), RecordingAuthenticator::held());
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    h.auth.revoke(AccountId(1001), "session kicked");
    assert!(rejection(&h.update()).is_some());

    h.auth.release();
    settle().await;
    assert!(promotions(&h.update()).is_empty());
}

#[tokio::test]
async fn test_revocation_for_another_account_leaves_client_alone() {
    let mut h = Harness::new(password_config("hunter2"));
    reach_password(&mut h, addr(1)).await;

    h.auth.revoke(AccountId(5), "not you");
    let actions = h.update();

    assert!(rejection(&actions).is_none());
    assert!(h.hs.contains(addr(1)));
    assert!(matches!(
        actions.as_slice(),
        [HandshakeAction::Revoke { account: AccountId(5), .. }]
    ));
}

#[tokio::test]
async fn test_identity_resent_during_auth_starts_one_session() {
    let mut h = Harness::with_auth(config(), RecordingAuthenticator::held());
    h.connect(addr(1));

    h.identify(addr(1), &alice());
    h.identify(addr(1), &alice());
    settle().await;
    assert_eq!(h.auth.started(), vec![AccountId(1001)]);

    h.auth.release();
    settle().await;
    assert_eq!(promotions(&h.update()).len(), 1);
}

#[tokio::test]
async fn test_removal_during_auth_ends_session_and_ignores_late_result() {
    let mut h = Harness::with_auth(config(), RecordingAuthenticator::held());
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    assert!(h.hs.remove(addr(1), &DisconnectReason::Disconnected.into()));
    assert_eq!(h.auth.ended(), vec![AccountId(1001)]);

    // Same address comes back before the old verification finishes.
    h.hs.add(addr(1), Some(addr(1).ip()), None, h.now);
    h.auth.release();
    settle().await;

    let actions = h.update();
    assert!(promotions(&actions).is_empty());
    assert_eq!(
        h.hs.get(addr(1)).map(|c| c.step),
        Some(ConnectionInitialization::ConnectionStarted)
    );
    assert_eq!(h.auth.ended(), vec![AccountId(1001)]);
}

#[tokio::test]
async fn test_banned_licence_owner_rejected_after_auth() {
    let auth = RecordingAuthenticator::default();
    auth.owners
        .lock()
        .unwrap()
        .insert(AccountId(1001), AccountId(7));
    let mut h = Harness::with_auth(config(), auth);
    h.bans.ban_account(AccountId(7), "owner cheated", None);
    h.connect(addr(1));
    h.identify(addr(1), &alice());
    settle().await;

    let actions = h.update();

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::Banned);
    assert_eq!(packet.message, "owner cheated");
}

// =========================================================================
// Password
// =========================================================================

/// Drives a client to the password step and returns the first prompt.
async fn reach_password(h: &mut Harness, key: SocketAddr) -> PasswordPrompt {
    h.connect(key);
    h.identify(key, &alice());
    settle().await;
    let actions = h.update();
    password_prompt(&actions).expect("should prompt for password")
}

#[tokio::test]
async fn test_three_wrong_passwords_ban_account_and_ip() {
    let mut h = Harness::new(password_config("hunter2"));
    let prompt = reach_password(&mut h, addr(1)).await;
    let salt = prompt.salt.expect("salt issued");
    assert_eq!(prompt.retries, 0);

    let first = h.answer_password(addr(1), "wrong", salt);
    assert_eq!(password_prompt(&first).map(|p| p.retries), Some(1));
    let second = h.answer_password(addr(1), "wrong", salt);
    assert_eq!(password_prompt(&second).map(|p| p.retries), Some(2));
    let third = h.answer_password(addr(1), "wrong", salt);

    let packet = rejection(&third).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::TooManyFailedLogins);
    assert!(h.bans.account_ban(AccountId(1001)).is_some());
    assert!(h.bans.ip_ban(addr(1).ip()).is_some());
    assert!(h.hs.is_empty());
}

#[tokio::test]
async fn test_two_wrong_then_correct_password_promotes_without_ban() {
    let mut h = Harness::new(password_config("hunter2"));
    let salt = reach_password(&mut h, addr(1)).await.salt.unwrap();

    h.answer_password(addr(1), "wrong", salt);
    h.answer_password(addr(1), "nope", salt);
    let actions = h.answer_password(addr(1), "hunter2", salt);
    assert!(rejection(&actions).is_none());

    let actions = h.update();
    assert_eq!(promotions(&actions).len(), 1);
    assert!(h.bans.is_empty());
}

#[tokio::test]
async fn test_password_prompt_resend_keeps_salt() {
    let mut h = Harness::new(password_config("hunter2"));
    let first = reach_password(&mut h, addr(1)).await;

    let mut salts = vec![first.salt];
    for _ in 0..3 {
        h.advance(Duration::from_millis(1100));
        let prompt = password_prompt(&h.update()).expect("prompt re-sent");
        salts.push(prompt.salt);
    }
    salts.push(password_prompt(&h.answer_password(addr(1), "wrong", first.salt.unwrap())).unwrap().salt);

    assert!(salts.iter().all(|salt| *salt == first.salt));
}

#[tokio::test]
async fn test_password_malformed_response_rejects() {
    let mut h = Harness::new(password_config("hunter2"));
    reach_password(&mut h, addr(1)).await;

    let actions = h.step(addr(1), ConnectionInitialization::Password, Bytes::new());

    assert_eq!(
        rejection(&actions).map(|p| p.reason),
        Some(DisconnectReason::MalformedData)
    );
}

// =========================================================================
// Timers and bans
// =========================================================================

#[tokio::test]
async fn test_silent_client_times_out_at_any_step() {
    let mut h = Harness::new(password_config("hunter2"));
    h.hs.add(addr(1), Some(addr(1).ip()), None, h.now);
    reach_password(&mut h, addr(2)).await;

    h.advance(Duration::from_secs(21));
    let actions = h.update();

    let timed_out: Vec<_> = actions
        .iter()
        .filter_map(|action| match action {
            HandshakeAction::Reject { key, packet } if packet.reason == DisconnectReason::Timeout => {
                Some(*key)
            }
            _ => None,
        })
        .collect();
    assert_eq!(timed_out, vec![addr(1), addr(2)]);
    assert!(h.hs.is_empty());
}

#[tokio::test]
async fn test_valid_message_pushes_back_timeout() {
    let mut h = Harness::new(config());
    h.hs.add(addr(1), None, None, h.now);

    h.advance(Duration::from_secs(15));
    h.step(addr(1), ConnectionInitialization::ConnectionStarted, Bytes::new());
    h.advance(Duration::from_secs(15));

    assert!(rejection(&h.update()).is_none());
    assert!(h.hs.contains(addr(1)));
}

#[tokio::test]
async fn test_prompt_resent_every_interval() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    assert!(h.update().is_empty(), "prompt was just sent");
    h.advance(Duration::from_millis(1001));
    let actions = h.update();
    assert_eq!(
        actions,
        vec![HandshakeAction::Send {
            key: addr(1),
            message: PeerMessage::server(PeerPacket::step(
                ConnectionInitialization::IdentityAndVersion
            )),
        }]
    );
}

#[tokio::test]
async fn test_ban_during_handshake_removes_on_next_tick() {
    let mut h = Harness::new(config());
    h.connect(addr(1));

    h.bans.ban_ip(addr(1).ip(), "admin said so", None);
    let actions = h.update();

    let packet = rejection(&actions).expect("should reject");
    assert_eq!(packet.reason, DisconnectReason::Banned);
    assert_eq!(packet.message, "admin said so");
}

#[tokio::test]
async fn test_unrelated_ip_is_not_affected_by_ban() {
    let mut h = Harness::new(config());
    h.connect(addr(1));
    h.bans.ban_ip(IpAddr::from([198, 51, 100, 1]), "someone else", None);

    assert!(rejection(&h.update()).is_none());
}

// =========================================================================
// Ownership
// =========================================================================

fn owner_config(key: i32) -> HandshakeConfig {
    HandshakeConfig {
        owner_key: Some(key),
        ..config()
    }
}

#[tokio::test]
async fn test_local_client_with_owner_key_becomes_owner_once() {
    let mut h = Harness::new(owner_config(4242));
    let with_key = ClientIdentityPacket {
        owner_key: Some(4242),
        ..alice()
    };
    h.connect(local(1));
    h.identify(local(1), &with_key);
    settle().await;

    let actions = h.update();
    let owner = owners(&actions);
    assert_eq!(owner.len(), 1);
    assert_eq!(owner[0].id, promotions(&actions)[0].id);

    // The key is spent: the same claim from a second local client is ignored.
    h.connect(local(2));
    h.identify(local(2), &with_key);
    settle().await;
    let actions = h.update();
    assert_eq!(promotions(&actions).len(), 1);
    assert!(owners(&actions).is_empty());
}

#[tokio::test]
async fn test_remote_client_with_owner_key_is_not_owner() {
    let mut h = Harness::new(owner_config(4242));
    h.connect(addr(1));
    h.identify(
        addr(1),
        &ClientIdentityPacket {
            owner_key: Some(4242),
            ..alice()
        },
    );
    settle().await;

    let actions = h.update();
    assert_eq!(promotions(&actions).len(), 1);
    assert!(owners(&actions).is_empty());
}

#[tokio::test]
async fn test_local_client_with_wrong_owner_key_is_not_owner() {
    let mut h = Harness::new(owner_config(4242));
    h.connect(local(1));
    h.identify(
        local(1),
        &ClientIdentityPacket {
            owner_key: Some(1),
            ..alice()
        },
    );
    settle().await;

    assert!(owners(&h.update()).is_empty());
}
