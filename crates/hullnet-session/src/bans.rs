//! Ban list collaborator.
//!
//! The connection layer only queries and appends to the ban list; storing
//! it across restarts is someone else's job. [`MemoryBanList`] is the
//! in-process implementation the server uses unless it is given another.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use hullnet_protocol::AccountId;
use tokio::time::Instant;

use crate::AccountInfo;

/// Ban lookups by IP address and by platform identity.
///
/// Methods take `&self`: the list is shared between the peer and whatever
/// administers it, so implementations use interior mutability.
pub trait BanList: Send + Sync + 'static {
    /// The ban reason if `ip` is banned.
    fn ip_ban(&self, ip: IpAddr) -> Option<String>;

    /// The ban reason if `account` is banned.
    fn account_ban(&self, account: AccountId) -> Option<String>;

    /// Bans an address. `duration` of `None` bans permanently.
    fn ban_ip(&self, ip: IpAddr, reason: &str, duration: Option<Duration>);

    /// Bans an account. `duration` of `None` bans permanently.
    fn ban_account(&self, account: AccountId, reason: &str, duration: Option<Duration>);

    fn unban_ip(&self, ip: IpAddr);

    fn unban_account(&self, account: AccountId);

    /// Checks an address and a verified identity (account and licence
    /// owner) together. Returns the first ban reason found.
    fn check(&self, ip: Option<IpAddr>, account: Option<&AccountInfo>) -> Option<String> {
        if let Some(reason) = ip.and_then(|ip| self.ip_ban(ip)) {
            return Some(reason);
        }
        account
            .into_iter()
            .flat_map(AccountInfo::ids)
            .find_map(|id| self.account_ban(id))
    }
}

#[derive(Debug, Clone)]
struct BanEntry {
    reason: String,
    expires: Option<Instant>,
}

impl BanEntry {
    fn new(reason: &str, duration: Option<Duration>) -> Self {
        Self {
            reason: reason.to_owned(),
            expires: duration.map(|d| Instant::now() + d),
        }
    }

    fn is_active(&self, now: Instant) -> bool {
        self.expires.is_none_or(|expires| now < expires)
    }
}

#[derive(Debug, Default)]
struct Bans {
    ips: HashMap<IpAddr, BanEntry>,
    accounts: HashMap<AccountId, BanEntry>,
}

/// An in-memory [`BanList`]. Expired bans are dropped lazily on lookup.
#[derive(Debug, Default)]
pub struct MemoryBanList {
    bans: Mutex<Bans>,
}

impl MemoryBanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bans currently recorded, expired or not.
    pub fn len(&self) -> usize {
        let bans = self.lock();
        bans.ips.len() + bans.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bans> {
        self.bans.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lookup<K: std::hash::Hash + Eq>(map: &mut HashMap<K, BanEntry>, key: &K) -> Option<String> {
    let now = Instant::now();
    match map.get(key) {
        Some(entry) if entry.is_active(now) => Some(entry.reason.clone()),
        Some(_) => {
            map.remove(key);
            None
        }
        None => None,
    }
}

impl BanList for MemoryBanList {
    fn ip_ban(&self, ip: IpAddr) -> Option<String> {
        lookup(&mut self.lock().ips, &ip)
    }

    fn account_ban(&self, account: AccountId) -> Option<String> {
        lookup(&mut self.lock().accounts, &account)
    }

    fn ban_ip(&self, ip: IpAddr, reason: &str, duration: Option<Duration>) {
        tracing::info!(%ip, reason, "IP banned");
        self.lock().ips.insert(ip, BanEntry::new(reason, duration));
    }

    fn ban_account(&self, account: AccountId, reason: &str, duration: Option<Duration>) {
        tracing::info!(%account, reason, "account banned");
        self.lock()
            .accounts
            .insert(account, BanEntry::new(reason, duration));
    }

    fn unban_ip(&self, ip: IpAddr) {
        self.lock().ips.remove(&ip);
    }

    fn unban_account(&self, account: AccountId) {
        self.lock().accounts.remove(&account);
    }
}
