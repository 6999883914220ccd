//! Gameplay payload compression (zstd).

use bytes::Bytes;

use crate::ProtocolError;

/// Compression level used for outgoing payloads.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Largest size a compressed payload may inflate to. Anything bigger is
/// treated as malformed.
pub const MAX_DECOMPRESSED_SIZE: usize = 1024 * 1024;

pub fn compress(data: &[u8]) -> Result<Bytes, ProtocolError> {
    zstd::encode_all(data, COMPRESSION_LEVEL)
        .map(Bytes::from)
        .map_err(ProtocolError::Compression)
}

/// Decompresses `data`, failing if the result would exceed `max_size`.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Bytes, ProtocolError> {
    zstd::bulk::decompress(data, max_size)
        .map(Bytes::from)
        .map_err(ProtocolError::Compression)
}

/// Compresses `data` if it is at least `threshold` bytes and compression
/// actually makes it smaller. Returns `None` when the payload should go
/// out as-is.
pub fn compress_if_smaller(data: &[u8], threshold: usize) -> Option<Bytes> {
    if data.len() < threshold {
        return None;
    }
    match compress(data) {
        Ok(compressed) if compressed.len() < data.len() => Some(compressed),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "compression failed, sending uncompressed");
            None
        }
    }
}
