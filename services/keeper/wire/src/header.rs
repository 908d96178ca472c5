//! Request and reply headers, operation codes and server error codes.

use crate::codec::{get_i32, get_i64, Record};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply xid used for server-initiated watch notifications
pub const WATCH_EVENT_XID: i32 = -1;
/// Request and reply xid of keepalive pings
pub const PING_XID: i32 = -2;
/// Request and reply xid of authentication packets
pub const AUTH_XID: i32 = -4;
/// Request and reply xid of the watch re-arm packet sent after reconnecting
pub const SET_WATCHES_XID: i32 = -8;

/// Operation codes carried in the request header
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Server notification
    Notification = 0,
    /// Create a node
    Create = 1,
    /// Delete a node
    Delete = 2,
    /// Test for existence
    Exists = 3,
    /// Read node data
    GetData = 4,
    /// Write node data
    SetData = 5,
    /// Read node ACL
    GetAcl = 6,
    /// Write node ACL
    SetAcl = 7,
    /// List children
    GetChildren = 8,
    /// Sync with the leader
    Sync = 9,
    /// Keepalive
    Ping = 11,
    /// List children with stat
    GetChildren2 = 12,
    /// Version check inside a multi
    Check = 13,
    /// Multi-operation transaction
    Multi = 14,
    /// Add authentication credentials
    Auth = 100,
    /// Re-arm watches after reconnect
    SetWatches = 101,
    /// SASL exchange
    Sasl = 102,
    /// Session creation (server internal)
    CreateSession = -10,
    /// Close the session
    CloseSession = -11,
    /// Error placeholder in multi results
    Error = -1,
}

impl TryFrom<i32> for OpCode {
    type Error = crate::WireError;

    fn try_from(value: i32) -> Result<Self, crate::WireError> {
        match value {
            0 => Ok(OpCode::Notification),
            1 => Ok(OpCode::Create),
            2 => Ok(OpCode::Delete),
            3 => Ok(OpCode::Exists),
            4 => Ok(OpCode::GetData),
            5 => Ok(OpCode::SetData),
            6 => Ok(OpCode::GetAcl),
            7 => Ok(OpCode::SetAcl),
            8 => Ok(OpCode::GetChildren),
            9 => Ok(OpCode::Sync),
            11 => Ok(OpCode::Ping),
            12 => Ok(OpCode::GetChildren2),
            13 => Ok(OpCode::Check),
            14 => Ok(OpCode::Multi),
            100 => Ok(OpCode::Auth),
            101 => Ok(OpCode::SetWatches),
            102 => Ok(OpCode::Sasl),
            -10 => Ok(OpCode::CreateSession),
            -11 => Ok(OpCode::CloseSession),
            -1 => Ok(OpCode::Error),
            _ => Err(crate::WireError::OpCode(value)),
        }
    }
}

/// Error codes returned in the reply header.
///
/// Unknown codes are kept verbatim so callers can still report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Success
    Ok,
    /// System and server-side errors
    SystemError,
    /// A runtime inconsistency was found
    RuntimeInconsistency,
    /// A data inconsistency was found
    DataInconsistency,
    /// Connection to the server has been lost
    ConnectionLoss,
    /// Error while marshalling or unmarshalling data
    MarshallingError,
    /// Operation is unimplemented
    Unimplemented,
    /// Operation timeout
    OperationTimeout,
    /// Invalid arguments
    BadArguments,
    /// API errors
    ApiError,
    /// Node does not exist
    NoNode,
    /// Not authenticated
    NoAuth,
    /// Version conflict
    BadVersion,
    /// Ephemeral nodes may not have children
    NoChildrenForEphemerals,
    /// The node already exists
    NodeExists,
    /// The node has children
    NotEmpty,
    /// The session has been expired by the server
    SessionExpired,
    /// Invalid callback specified
    InvalidCallback,
    /// Invalid ACL specified
    InvalidAcl,
    /// Client authentication failed
    AuthFailed,
    /// Any code not listed above
    Unknown(i32),
}

impl ErrorCode {
    /// Numeric code as sent on the wire
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::SystemError => -1,
            ErrorCode::RuntimeInconsistency => -2,
            ErrorCode::DataInconsistency => -3,
            ErrorCode::ConnectionLoss => -4,
            ErrorCode::MarshallingError => -5,
            ErrorCode::Unimplemented => -6,
            ErrorCode::OperationTimeout => -7,
            ErrorCode::BadArguments => -8,
            ErrorCode::ApiError => -100,
            ErrorCode::NoNode => -101,
            ErrorCode::NoAuth => -102,
            ErrorCode::BadVersion => -103,
            ErrorCode::NoChildrenForEphemerals => -108,
            ErrorCode::NodeExists => -110,
            ErrorCode::NotEmpty => -111,
            ErrorCode::SessionExpired => -112,
            ErrorCode::InvalidCallback => -113,
            ErrorCode::InvalidAcl => -114,
            ErrorCode::AuthFailed => -115,
            ErrorCode::Unknown(code) => code,
        }
    }

    /// Short snake_case name used in log and error messages
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::SystemError => "system_error",
            ErrorCode::RuntimeInconsistency => "runtime_inconsistency",
            ErrorCode::DataInconsistency => "data_inconsistency",
            ErrorCode::ConnectionLoss => "connection_lost",
            ErrorCode::MarshallingError => "marshalling_error",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::OperationTimeout => "operation_timeout",
            ErrorCode::BadArguments => "bad_arguments",
            ErrorCode::ApiError => "api_error",
            ErrorCode::NoNode => "no_node",
            ErrorCode::NoAuth => "no_auth",
            ErrorCode::BadVersion => "bad_version",
            ErrorCode::NoChildrenForEphemerals => "no_children_for_ephemerals",
            ErrorCode::NodeExists => "node_exists",
            ErrorCode::NotEmpty => "not_empty",
            ErrorCode::SessionExpired => "session_expired",
            ErrorCode::InvalidCallback => "invalid_callback",
            ErrorCode::InvalidAcl => "invalid_acl",
            ErrorCode::AuthFailed => "auth_failed",
            ErrorCode::Unknown(_) => "unknown",
        }
    }

    /// True for the success code
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        match code {
            0 => ErrorCode::Ok,
            -1 => ErrorCode::SystemError,
            -2 => ErrorCode::RuntimeInconsistency,
            -3 => ErrorCode::DataInconsistency,
            -4 => ErrorCode::ConnectionLoss,
            -5 => ErrorCode::MarshallingError,
            -6 => ErrorCode::Unimplemented,
            -7 => ErrorCode::OperationTimeout,
            -8 => ErrorCode::BadArguments,
            -100 => ErrorCode::ApiError,
            -101 => ErrorCode::NoNode,
            -102 => ErrorCode::NoAuth,
            -103 => ErrorCode::BadVersion,
            -108 => ErrorCode::NoChildrenForEphemerals,
            -110 => ErrorCode::NodeExists,
            -111 => ErrorCode::NotEmpty,
            -112 => ErrorCode::SessionExpired,
            -113 => ErrorCode::InvalidCallback,
            -114 => ErrorCode::InvalidAcl,
            -115 => ErrorCode::AuthFailed,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rc={}(:{})", self.code(), self.name())
    }
}

/// Header preceding every client request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Transaction id correlating request and reply
    pub xid: i32,
    /// Operation code
    pub opcode: OpCode,
}

impl RequestHeader {
    /// Create a new request header
    pub fn new(xid: i32, opcode: OpCode) -> Self {
        Self { xid, opcode }
    }

    /// The fixed keepalive request
    pub fn ping() -> Self {
        Self::new(PING_XID, OpCode::Ping)
    }
}

impl Record for RequestHeader {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.xid);
        buf.put_i32(self.opcode as i32);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, crate::WireError> {
        let xid = get_i32(buf)?;
        let opcode = OpCode::try_from(get_i32(buf)?)?;
        Ok(Self { xid, opcode })
    }
}

/// Header preceding every server reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    /// Xid of the request being answered, or a reserved xid
    pub xid: i32,
    /// Last transaction id seen by the server
    pub zxid: i64,
    /// Result code
    pub err: ErrorCode,
}

impl ReplyHeader {
    /// Create a new reply header
    pub fn new(xid: i32, zxid: i64, err: ErrorCode) -> Self {
        Self { xid, zxid, err }
    }
}

impl Record for ReplyHeader {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.xid);
        buf.put_i64(self.zxid);
        buf.put_i32(self.err.code());
    }

    fn decode(buf: &mut Bytes) -> Result<Self, crate::WireError> {
        let xid = get_i32(buf)?;
        let zxid = get_i64(buf)?;
        let err = ErrorCode::from(get_i32(buf)?);
        Ok(Self { xid, zxid, err })
    }
}
