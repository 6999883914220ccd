//! Server password checks.
//!
//! The server keeps only `SHA-256(password)`. For each pending client it
//! issues a random salt once, and the client answers with
//! `SHA-256(SHA-256(password) ‖ salt)`, the salt as four little-endian
//! bytes. The plain password never crosses the wire and a captured answer
//! is useless against another salt.

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};

/// Checks salted password answers against the server password.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordVerifier {
    hash: [u8; 32],
}

impl PasswordVerifier {
    pub fn new(password: &str) -> Self {
        Self {
            hash: hash_password(password),
        }
    }

    /// Whether `response` is the correct answer for `salt`.
    pub fn verify(&self, salt: i32, response: &[u8]) -> bool {
        let expected = salted_hash(&self.hash, salt);
        constant_time_eq(&expected, response)
    }
}

impl fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordVerifier").finish_non_exhaustive()
    }
}

/// `SHA-256(password)`.
pub fn hash_password(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// `SHA-256(password_hash ‖ salt_le)`: what a client sends back.
pub fn salted_hash(password_hash: &[u8], salt: i32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password_hash);
    hasher.update(salt.to_le_bytes());
    hasher.finalize().into()
}

/// A fresh random salt.
pub fn generate_salt() -> i32 {
    rand::rng().random()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
