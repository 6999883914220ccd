//! Transport-level frames.
//!
//! Every datagram starts with a one-byte frame kind. Only `Data` frames
//! carry anything the layers above care about; the rest implement the
//! connect / approve / deny / disconnect handshake of the link itself and
//! the acknowledgements of the reliable channels.
//!
//! ```text
//! 0x01 Connect     [hail...]
//! 0x02 Accept
//! 0x03 Deny        [reason...]
//! 0x04 Data        [method u8][sequence u16][payload...]
//! 0x05 Disconnect  [reason...]
//! 0x06 Keepalive
//! 0x07 Ack         [method u8][sequence u16]
//! ```
//!
//! Unreliable data frames carry sequence `0`, which the receiver ignores.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::DeliveryMethod;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

/// Bytes a data frame adds in front of its payload.
pub const DATA_HEADER_LEN: usize = 4;

/// Largest payload a single data frame may carry.
pub const MAX_FRAME_PAYLOAD: usize = MAX_DATAGRAM - DATA_HEADER_LEN;

const KIND_CONNECT: u8 = 0x01;
const KIND_ACCEPT: u8 = 0x02;
const KIND_DENY: u8 = 0x03;
const KIND_DATA: u8 = 0x04;
const KIND_DISCONNECT: u8 = 0x05;
const KIND_KEEPALIVE: u8 = 0x06;
const KIND_ACK: u8 = 0x07;

/// One transport-level datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Asks for a link. The hail is handed to whoever approves it.
    Connect(Bytes),
    Accept,
    Deny(Bytes),
    Data {
        method: DeliveryMethod,
        sequence: u16,
        payload: Bytes,
    },
    Disconnect(Bytes),
    Keepalive,
    /// Confirms a reliable data frame.
    Ack {
        method: DeliveryMethod,
        sequence: u16,
    },
}

impl Frame {
    /// A data frame for the unreliable channel.
    pub fn unreliable(payload: impl Into<Bytes>) -> Self {
        Self::Data {
            method: DeliveryMethod::Unreliable,
            sequence: 0,
            payload: payload.into(),
        }
    }

    /// Serializes the frame into a datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + self.body_len());
        match self {
            Self::Connect(hail) => {
                buf.put_u8(KIND_CONNECT);
                buf.put_slice(hail);
            }
            Self::Accept => buf.put_u8(KIND_ACCEPT),
            Self::Deny(reason) => {
                buf.put_u8(KIND_DENY);
                buf.put_slice(reason);
            }
            Self::Data {
                method,
                sequence,
                payload,
            } => {
                buf.put_u8(KIND_DATA);
                buf.put_u8(method.to_u8());
                buf.put_u16(*sequence);
                buf.put_slice(payload);
            }
            Self::Disconnect(reason) => {
                buf.put_u8(KIND_DISCONNECT);
                buf.put_slice(reason);
            }
            Self::Keepalive => buf.put_u8(KIND_KEEPALIVE),
            Self::Ack { method, sequence } => {
                buf.put_u8(KIND_ACK);
                buf.put_u8(method.to_u8());
                buf.put_u16(*sequence);
            }
        }
        buf.freeze()
    }

    /// Parses a datagram. Returns `None` for empty or unrecognized input;
    /// stray datagrams are dropped rather than treated as errors.
    pub fn decode(datagram: Bytes) -> Option<Self> {
        let kind = *datagram.first()?;
        let mut body = datagram.slice(1..);
        match kind {
            KIND_CONNECT => Some(Self::Connect(body)),
            KIND_ACCEPT => Some(Self::Accept),
            KIND_DENY => Some(Self::Deny(body)),
            KIND_DATA => {
                let (method, sequence) = channel_prefix(&mut body)?;
                Some(Self::Data {
                    method,
                    sequence,
                    payload: body,
                })
            }
            KIND_DISCONNECT => Some(Self::Disconnect(body)),
            KIND_KEEPALIVE => Some(Self::Keepalive),
            KIND_ACK => {
                let (method, sequence) = channel_prefix(&mut body)?;
                (method != DeliveryMethod::Unreliable).then_some(Self::Ack { method, sequence })
            }
            _ => None,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Self::Connect(bytes) | Self::Deny(bytes) | Self::Disconnect(bytes) => bytes.len(),
            Self::Data { payload, .. } => payload.len(),
            _ => 0,
        }
    }
}

fn channel_prefix(body: &mut Bytes) -> Option<(DeliveryMethod, u16)> {
    if body.remaining() < 3 {
        return None;
    }
    let method = DeliveryMethod::from_u8(body.get_u8())?;
    Some((method, body.get_u16()))
}
