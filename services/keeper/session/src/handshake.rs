//! Session handshake.
//!
//! Every new connection starts with a headerless connect request. A fresh
//! session sends zeroed credentials; a resumed one sends the id, password
//! and last zxid it holds so the server can reattach it.

use crate::error::KeeperResult;
use bytes::{Bytes, BytesMut};
use keeper_wire::{ConnectRequest, ConnectResponse, FrameDecoder, Record};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Credentials carried from one connection to the next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Server assigned session id, 0 until the first handshake
    pub session_id: i64,
    /// Session password, empty until the first handshake
    pub passwd: Bytes,
    /// Highest zxid observed in a reply
    pub last_zxid_seen: i64,
}

impl Credentials {
    /// Whether a session has been established yet
    pub fn is_resumable(&self) -> bool {
        self.session_id != 0
    }
}

/// Result of a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// The server accepted (or resumed) the session
    Accepted {
        /// Timeout the server settled on
        negotiated: Duration,
        /// Session id
        session_id: i64,
        /// Session password
        passwd: Bytes,
    },
    /// The server no longer knows the session
    Rejected,
}

/// Build the connect request for the next connection
pub fn connect_request(timeout: Duration, credentials: &Credentials) -> ConnectRequest {
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let mut request = ConnectRequest::new(timeout_ms);
    if credentials.is_resumable() {
        request.last_zxid_seen = credentials.last_zxid_seen;
        request.session_id = credentials.session_id;
        request.passwd = credentials.passwd.clone();
    }
    request
}

/// Decode and interpret the server's connect response
pub fn parse_connect_response(mut body: Bytes) -> KeeperResult<Handshake> {
    let response = ConnectResponse::decode(&mut body)?;
    if response.timeout_ms <= 0 {
        return Ok(Handshake::Rejected);
    }

    Ok(Handshake::Accepted {
        negotiated: Duration::from_millis(response.timeout_ms as u64),
        session_id: response.session_id,
        passwd: response.passwd,
    })
}

/// Read one frame body from the socket.
///
/// Bytes already buffered are decoded before reading more, so a frame that
/// arrived together with the previous one is returned without touching the
/// socket. Cancel safe: partial data stays in `buffer`.
pub async fn recv_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    buffer: &mut BytesMut,
) -> Result<Bytes, anyhow::Error> {
    loop {
        if let Some(body) = decoder.decode(buffer)? {
            return Ok(body);
        }

        let bytes_read = reader.read_buf(buffer).await?;
        if bytes_read == 0 {
            anyhow::bail!("EOF while reading frame");
        }

        trace!(
            "Read {} bytes, buffer now has {} bytes",
            bytes_read,
            buffer.len()
        );
    }
}
