//! Step payloads exchanged during the connection handshake.
//!
//! Only the steps that carry data have a type here. The server's
//! `ConnectionStarted`, `IdentityAndVersion` and `Success` prompts have an
//! empty body; the step tag alone says what the server wants next.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::AccountId;
use crate::{ProtocolError, wire};

/// One entry of a client's content-package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentPackageEntry {
    pub name: String,
    pub hash: String,
}

impl ContentPackageEntry {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// The client's `IdentityAndVersion` submission.
///
/// ```text
/// [name: u16-len str][account: u64, 0 = none][ticket: u16-len bytes]
/// [version: u16-len str][package count: u16]([name str][hash str])*
/// [owner key: i32, 0 = none, may be omitted]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentityPacket {
    pub name: String,
    pub account: Option<AccountId>,
    /// Platform authentication ticket. Empty when the client has none.
    pub ticket: Bytes,
    pub version: String,
    pub packages: Vec<ContentPackageEntry>,
    /// The key the hosting process was started with. Only the local
    /// owner of the server knows it.
    pub owner_key: Option<i32>,
}

impl ClientIdentityPacket {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        wire::put_string(&mut buf, &self.name)?;
        buf.put_u64(AccountId::to_wire(self.account));
        wire::put_blob(&mut buf, &self.ticket)?;
        wire::put_string(&mut buf, &self.version)?;
        let count = u16::try_from(self.packages.len()).map_err(|_| ProtocolError::TooLong {
            len: self.packages.len(),
            max: wire::MAX_FIELD_LEN,
        })?;
        buf.put_u16(count);
        for package in &self.packages {
            wire::put_string(&mut buf, &package.name)?;
            wire::put_string(&mut buf, &package.hash)?;
        }
        buf.put_i32(self.owner_key.unwrap_or(0));
        Ok(buf.freeze())
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let name = wire::get_string(&mut body)?;
        let account = AccountId::from_wire(wire::get_u64(&mut body)?);
        let ticket = wire::get_blob(&mut body)?;
        let version = wire::get_string(&mut body)?;
        let count = wire::get_u16(&mut body)?;
        // Each entry is at least two empty strings.
        wire::ensure(&body, usize::from(count) * 4)?;
        let mut packages = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name = wire::get_string(&mut body)?;
            let hash = wire::get_string(&mut body)?;
            packages.push(ContentPackageEntry { name, hash });
        }
        // Older clients stop after the manifest.
        let owner_key = if body.is_empty() {
            None
        } else {
            Some(wire::get_i32(&mut body)?).filter(|key| *key != 0)
        };
        Ok(Self {
            name,
            account,
            ticket,
            version,
            packages,
            owner_key,
        })
    }
}

/// The hail the owner process attaches to its link request on the relay
/// transport: the owner key, big-endian.
pub fn owner_hail(key: i32) -> Bytes {
    Bytes::copy_from_slice(&key.to_be_bytes())
}

/// Reads an owner hail. Anything but a non-zero four-byte key is `None`.
pub fn parse_owner_hail(hail: &[u8]) -> Option<i32> {
    let key = i32::from_be_bytes(hail.try_into().ok()?);
    (key != 0).then_some(key)
}

/// The server's `Password` prompt.
///
/// ```text
/// [has_salt: u8][salt: i32, only if has_salt][retries: u8]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPrompt {
    pub salt: Option<i32>,
    /// Incorrect attempts so far.
    pub retries: u8,
}

impl PasswordPrompt {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6);
        match self.salt {
            Some(salt) => {
                buf.put_u8(1);
                buf.put_i32(salt);
            }
            None => buf.put_u8(0),
        }
        buf.put_u8(self.retries);
        buf.freeze()
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let salt = match wire::get_u8(&mut body)? {
            0 => None,
            _ => Some(wire::get_i32(&mut body)?),
        };
        let retries = wire::get_u8(&mut body)?;
        Ok(Self { salt, retries })
    }
}

/// The client's answer to a [`PasswordPrompt`]: the salted password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResponse {
    pub hash: Bytes,
}

impl PasswordResponse {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(2 + self.hash.len());
        wire::put_blob(&mut buf, &self.hash)?;
        Ok(buf.freeze())
    }

    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            hash: wire::get_blob(&mut body)?,
        })
    }
}
