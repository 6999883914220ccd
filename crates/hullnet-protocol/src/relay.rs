//! Relay envelope framing.
//!
//! On the relay transport every remote client shares the one owner link,
//! so each packet is prefixed with the account it is from (inbound) or
//! for (outbound), and with the delivery method the relay should use for
//! the last hop.
//!
//! ```text
//! [account u64 BE][header u8][delivery u8][body...]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use hullnet_transport::DeliveryMethod;

use crate::header::PacketHeader;
use crate::packet::PeerMessage;
use crate::types::AccountId;
use crate::{ProtocolError, wire};

/// A peer message addressed by platform identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub account: AccountId,
    pub method: DeliveryMethod,
    pub message: PeerMessage,
}

impl RelayEnvelope {
    pub fn new(account: AccountId, method: DeliveryMethod, message: PeerMessage) -> Self {
        Self {
            account,
            method,
            message,
        }
    }

    pub fn encode(&self, compression_threshold: Option<usize>) -> Result<Bytes, ProtocolError> {
        let (header, body) = self.message.encode_parts(compression_threshold)?;
        let mut buf = BytesMut::with_capacity(10 + body.len());
        buf.put_u64(self.account.0);
        buf.put_u8(header.encode());
        buf.put_u8(self.method.to_u8());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decodes the account prefix only, so a bad body can still be
    /// attributed to its sender.
    pub fn peek_account(data: &[u8]) -> Option<AccountId> {
        let raw: [u8; 8] = data.get(..8)?.try_into().ok()?;
        AccountId::from_wire(u64::from_be_bytes(raw))
    }

    pub fn decode(mut data: Bytes) -> Result<Self, ProtocolError> {
        let account =
            AccountId::from_wire(wire::get_u64(&mut data)?).ok_or(ProtocolError::MissingAccount)?;
        let header = PacketHeader::decode(wire::get_u8(&mut data)?)?;
        let method_tag = wire::get_u8(&mut data)?;
        let method = DeliveryMethod::from_u8(method_tag)
            .ok_or(ProtocolError::UnknownDeliveryMethod(method_tag))?;
        let message = PeerMessage::decode_parts(header, data)?;
        Ok(Self {
            account,
            method,
            message,
        })
    }
}
