//! Length-prefixed packet framing.
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len        | length of bytes that follow|
//! +----------------------+----------------------------+
//! | records              | header record, then body   |
//! +----------------------+----------------------------+
//! ```

use crate::codec::Record;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Maximum frame size (4 MiB default, 16 MiB hard limit)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;
/// Hard maximum frame size limit (16 MiB)
pub const HARD_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode records into a single length-prefixed frame
pub fn encode_frame(records: &[&dyn Record], max_frame_size: usize) -> Result<Bytes, crate::WireError> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u32(0);
    for record in records {
        record.encode(&mut buf);
    }

    let body_len = buf.len() - 4;
    if body_len > max_frame_size.min(HARD_MAX_FRAME_SIZE) {
        return Err(crate::WireError::Size(body_len));
    }
    buf[..4].copy_from_slice(&(body_len as u32).to_be_bytes());

    Ok(buf.freeze())
}

/// Frame decoder for parsing incoming packets
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a decoder with a custom size limit (capped at the hard limit)
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(HARD_MAX_FRAME_SIZE),
        }
    }

    /// Decode one packet body from a buffer.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered; consumed bytes are
    /// removed from `buf`, so partial reads can simply be appended.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, crate::WireError> {
        // Need at least 4 bytes for frame length
        if buf.len() < 4 {
            return Ok(None);
        }

        // Peek at frame length
        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if frame_len > self.max_frame_size {
            return Err(crate::WireError::Size(frame_len));
        }

        if buf.len() < 4 + frame_len {
            return Ok(None);
        }

        buf.advance(4);
        trace!("Decoded frame of {} bytes", frame_len);
        Ok(Some(buf.split_to(frame_len).freeze()))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
