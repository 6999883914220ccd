//! Peer packet framing: a [`PacketHeader`] byte followed by a body whose
//! shape the header determines.
//!
//! ```text
//! init step   [header][step u8][step payload...]
//! disconnect  [header][reason u8][u16-len message]
//! heartbeat   [header]
//! gameplay    [header][u32 length][payload, zstd if IS_COMPRESSED]
//! ```
//!
//! The direct transport sends exactly these bytes. The relay transport
//! wraps the same header and body in a [`RelayEnvelope`](crate::RelayEnvelope).

use bytes::{BufMut, Bytes, BytesMut};

use crate::compression;
use crate::header::{ConnectionInitialization, PacketHeader};
use crate::types::PeerDisconnectPacket;
use crate::{ProtocolError, wire};

/// The body of a peer packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerPacket {
    /// A handshake step. `body` is the step payload, see
    /// [`handshake`](crate::handshake) for the types that parse it.
    Initialization {
        step: ConnectionInitialization,
        body: Bytes,
    },
    Disconnect(PeerDisconnectPacket),
    Heartbeat,
    /// An opaque, already-decompressed gameplay payload.
    Gameplay(Bytes),
}

impl PeerPacket {
    /// A handshake step with no payload.
    pub fn step(step: ConnectionInitialization) -> Self {
        Self::Initialization {
            step,
            body: Bytes::new(),
        }
    }
}

/// A [`PeerPacket`] plus its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    pub from_server: bool,
    pub packet: PeerPacket,
}

impl PeerMessage {
    pub fn server(packet: PeerPacket) -> Self {
        Self {
            from_server: true,
            packet,
        }
    }

    pub fn client(packet: PeerPacket) -> Self {
        Self {
            from_server: false,
            packet,
        }
    }

    /// Builds the header and body. Gameplay payloads at least
    /// `compression_threshold` bytes long are compressed when that helps;
    /// `None` never compresses.
    pub fn encode_parts(
        &self,
        compression_threshold: Option<usize>,
    ) -> Result<(PacketHeader, Bytes), ProtocolError> {
        let mut header = if self.from_server {
            PacketHeader::IS_SERVER_MESSAGE
        } else {
            PacketHeader::NONE
        };

        let body = match &self.packet {
            PeerPacket::Initialization { step, body } => {
                header |= PacketHeader::IS_CONNECTION_INITIALIZATION_STEP;
                let mut buf = BytesMut::with_capacity(1 + body.len());
                buf.put_u8(step.to_u8());
                buf.put_slice(body);
                buf.freeze()
            }
            PeerPacket::Disconnect(packet) => {
                header |= PacketHeader::IS_DISCONNECT_MESSAGE;
                packet.encode()?
            }
            PeerPacket::Heartbeat => {
                header |= PacketHeader::IS_HEARTBEAT_MESSAGE;
                Bytes::new()
            }
            PeerPacket::Gameplay(payload) => {
                let compressed = compression_threshold
                    .and_then(|threshold| compression::compress_if_smaller(payload, threshold));
                let payload = match compressed {
                    Some(compressed) => {
                        header |= PacketHeader::IS_COMPRESSED;
                        compressed
                    }
                    None => payload.clone(),
                };
                let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::TooLong {
                    len: payload.len(),
                    max: u32::MAX as usize,
                })?;
                let mut buf = BytesMut::with_capacity(4 + payload.len());
                buf.put_u32(len);
                buf.put_slice(&payload);
                buf.freeze()
            }
        };

        Ok((header, body))
    }

    /// Encodes as `[header][body]`.
    pub fn encode(&self, compression_threshold: Option<usize>) -> Result<Bytes, ProtocolError> {
        let (header, body) = self.encode_parts(compression_threshold)?;
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(header.encode());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Interprets `body` according to an already-parsed header.
    pub fn decode_parts(header: PacketHeader, mut body: Bytes) -> Result<Self, ProtocolError> {
        let from_server = header.contains(PacketHeader::IS_SERVER_MESSAGE);

        let packet = if header.contains(PacketHeader::IS_CONNECTION_INITIALIZATION_STEP) {
            let step = ConnectionInitialization::from_u8(wire::get_u8(&mut body)?)?;
            PeerPacket::Initialization { step, body }
        } else if header.contains(PacketHeader::IS_DISCONNECT_MESSAGE) {
            PeerPacket::Disconnect(PeerDisconnectPacket::decode(body)?)
        } else if header.contains(PacketHeader::IS_HEARTBEAT_MESSAGE) {
            PeerPacket::Heartbeat
        } else {
            let declared = wire::get_u32(&mut body)? as usize;
            if declared != body.len() {
                return Err(ProtocolError::LengthMismatch {
                    declared,
                    actual: body.len(),
                });
            }
            if header.contains(PacketHeader::IS_COMPRESSED) {
                PeerPacket::Gameplay(compression::decompress(
                    &body,
                    compression::MAX_DECOMPRESSED_SIZE,
                )?)
            } else {
                PeerPacket::Gameplay(body)
            }
        };

        Ok(Self {
            from_server,
            packet,
        })
    }

    /// Decodes `[header][body]`.
    pub fn decode(mut data: Bytes) -> Result<Self, ProtocolError> {
        let header = PacketHeader::decode(wire::get_u8(&mut data)?)?;
        Self::decode_parts(header, data)
    }
}
