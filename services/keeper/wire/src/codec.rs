//! Record encoding and decoding.
//!
//! Every record is a plain concatenation of big-endian fields. Variable
//! length fields (buffers, strings, vectors) carry an `i32` length prefix
//! where `-1` stands for null.

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A value that can be written to and read from a packet body.
///
/// `encode` is object safe so heterogeneous records can be handed to a
/// transport as `&[&dyn Record]`, including across an await.
pub trait Record: Send + Sync {
    /// Append the encoded record to `buf`
    fn encode(&self, buf: &mut BytesMut);

    /// Read one record from the front of `buf`
    fn decode(buf: &mut Bytes) -> Result<Self, WireError>
    where
        Self: Sized;
}

/// Raw bytes are already encoded and are copied through untouched.
/// Decoding takes whatever remains of the body.
impl Record for Bytes {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(buf.split_to(buf.len()))
    }
}

/// The empty record, used for replies that carry no body.
impl Record for () {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(())
    }
}

/// Encode a set of records into one contiguous body
pub fn encode_records(records: &[&dyn Record]) -> Bytes {
    let mut buf = BytesMut::new();
    for record in records {
        record.encode(&mut buf);
    }
    buf.freeze()
}

/// Read a big-endian `i32`
pub fn get_i32(buf: &mut Bytes) -> Result<i32, WireError> {
    if buf.remaining() < 4 {
        return Err(WireError::Incomplete);
    }
    Ok(buf.get_i32())
}

/// Read a big-endian `i64`
pub fn get_i64(buf: &mut Bytes) -> Result<i64, WireError> {
    if buf.remaining() < 8 {
        return Err(WireError::Incomplete);
    }
    Ok(buf.get_i64())
}

/// Read a one-byte boolean
pub fn get_bool(buf: &mut Bytes) -> Result<bool, WireError> {
    if !buf.has_remaining() {
        return Err(WireError::Incomplete);
    }
    Ok(buf.get_u8() != 0)
}

/// Read a length-prefixed buffer; null comes back as `None`
pub fn get_buffer(buf: &mut Bytes) -> Result<Option<Bytes>, WireError> {
    let len = get_i32(buf)?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(WireError::Length(n)),
        n => {
            let n = n as usize;
            if buf.remaining() < n {
                return Err(WireError::Incomplete);
            }
            Ok(Some(buf.split_to(n)))
        }
    }
}

/// Read a length-prefixed UTF-8 string; null comes back as `None`
pub fn get_string(buf: &mut Bytes) -> Result<Option<String>, WireError> {
    match get_buffer(buf)? {
        Some(raw) => String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| WireError::Utf8),
        None => Ok(None),
    }
}

/// Read a vector of strings; null comes back as an empty vector
pub fn get_string_vec(buf: &mut Bytes) -> Result<Vec<String>, WireError> {
    let count = get_i32(buf)?;
    if count == -1 {
        return Ok(Vec::new());
    }
    if count < 0 {
        return Err(WireError::Length(count));
    }

    // Each element needs at least its own length prefix
    if buf.remaining() < count as usize * 4 {
        return Err(WireError::Incomplete);
    }

    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(get_string(buf)?.unwrap_or_default());
    }
    Ok(out)
}

/// Write a one-byte boolean
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

/// Write a length-prefixed buffer; `None` is written as null
pub fn put_buffer(buf: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        None => buf.put_i32(-1),
    }
}

/// Write a length-prefixed UTF-8 string
pub fn put_string(buf: &mut BytesMut, value: &str) {
    put_buffer(buf, Some(value.as_bytes()));
}

/// Write a vector of strings
pub fn put_string_vec(buf: &mut BytesMut, values: &[String]) {
    buf.put_i32(values.len() as i32);
    for value in values {
        put_string(buf, value);
    }
}
