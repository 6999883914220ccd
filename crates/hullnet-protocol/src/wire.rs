//! Primitive field readers and writers.
//!
//! All integers are big-endian. Strings and byte blobs carry a `u16`
//! length prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Longest string or blob a `u16` length prefix can describe.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

pub(crate) fn ensure(buf: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut Bytes) -> Result<u64, ProtocolError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

pub(crate) fn get_i32(buf: &mut Bytes) -> Result<i32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub(crate) fn get_blob(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = usize::from(get_u16(buf)?);
    ensure(buf, len)?;
    Ok(buf.split_to(len))
}

pub(crate) fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let raw = get_blob(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

pub(crate) fn put_blob(buf: &mut BytesMut, data: &[u8]) -> Result<(), ProtocolError> {
    let len = u16::try_from(data.len()).map_err(|_| ProtocolError::TooLong {
        len: data.len(),
        max: MAX_FIELD_LEN,
    })?;
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    put_blob(buf, value.as_bytes())
}
