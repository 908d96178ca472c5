//! Record encoding, length-prefixed framing, headers and protocol records for keeper.
//!
//! This crate provides the low-level wire protocol of the coordination
//! service client: how records are laid out, how packets are framed on the
//! socket, and the handful of records the session engine needs to speak for
//! itself (handshake, keepalive, watch notifications, authentication).
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len        | length of bytes that follow|
//! +----------------------+----------------------------+
//! | RequestHeader /      | xid + opcode, or           |
//! | ReplyHeader          | xid + zxid + err           |
//! +----------------------+----------------------------+
//! | body                 | operation specific record  |
//! +----------------------+----------------------------+
//! ```
//!
//! The handshake is the exception: the connect request and response are
//! sent without a header.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod proto;

// Re-export main types
pub use codec::{encode_records, Record};
pub use error::WireError;
pub use frame::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, HARD_MAX_FRAME_SIZE};
pub use header::{
    ErrorCode, OpCode, ReplyHeader, RequestHeader, AUTH_XID, PING_XID, SET_WATCHES_XID,
    WATCH_EVENT_XID,
};
pub use proto::{
    AuthPacket, ConnectRequest, ConnectResponse, ExistsResponse, GetChildrenResponse,
    GetDataResponse, PathRequest, SetWatches, Stat, WatcherEvent, SESSION_PASSWD_LEN,
};
