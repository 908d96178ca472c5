//! Protocol records exchanged during and after the session handshake.

use crate::codec::{
    get_bool, get_buffer, get_i32, get_i64, get_string, get_string_vec, put_bool, put_buffer,
    put_string, put_string_vec, Record,
};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Length of the session password handed out by the server
pub const SESSION_PASSWD_LEN: usize = 16;

/// First record sent on every new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol version (always 0)
    pub protocol_version: i32,
    /// Last zxid observed by the client, 0 for a new session
    pub last_zxid_seen: i64,
    /// Requested session timeout in milliseconds
    pub timeout_ms: i32,
    /// Session to resume, 0 for a new session
    pub session_id: i64,
    /// Password of the session to resume
    pub passwd: Bytes,
}

impl ConnectRequest {
    /// Request for a brand new session
    pub fn new(timeout_ms: i32) -> Self {
        Self {
            protocol_version: 0,
            last_zxid_seen: 0,
            timeout_ms,
            session_id: 0,
            passwd: Bytes::from_static(&[0; SESSION_PASSWD_LEN]),
        }
    }
}

impl Record for ConnectRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.protocol_version);
        buf.put_i64(self.last_zxid_seen);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        put_buffer(buf, Some(&self.passwd));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            protocol_version: get_i32(buf)?,
            last_zxid_seen: get_i64(buf)?,
            timeout_ms: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_buffer(buf)?.unwrap_or_default(),
        })
    }
}

/// Server answer to a [`ConnectRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Protocol version
    pub protocol_version: i32,
    /// Negotiated timeout in milliseconds; non-positive means the session is gone
    pub timeout_ms: i32,
    /// Session identifier
    pub session_id: i64,
    /// Session password
    pub passwd: Bytes,
}

impl Record for ConnectResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.protocol_version);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        put_buffer(buf, Some(&self.passwd));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        // Newer servers append a read-only flag, which is ignored
        Ok(Self {
            protocol_version: get_i32(buf)?,
            timeout_ms: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_buffer(buf)?.unwrap_or_default(),
        })
    }
}

/// Body of a watch notification (reply xid -1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    /// Event type code
    pub event_type: i32,
    /// Keeper state code
    pub state: i32,
    /// Path of the node involved
    pub path: String,
}

impl Record for WatcherEvent {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.event_type);
        buf.put_i32(self.state);
        put_string(buf, &self.path);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            event_type: get_i32(buf)?,
            state: get_i32(buf)?,
            path: get_string(buf)?.unwrap_or_default(),
        })
    }
}

/// Authentication credentials (request xid -4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    /// Auth type, always 0
    pub auth_type: i32,
    /// Scheme name, e.g. `digest`
    pub scheme: String,
    /// Scheme specific credentials
    pub auth: Bytes,
}

impl Record for AuthPacket {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.auth_type);
        put_string(buf, &self.scheme);
        put_buffer(buf, Some(&self.auth));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            auth_type: get_i32(buf)?,
            scheme: get_string(buf)?.unwrap_or_default(),
            auth: get_buffer(buf)?.unwrap_or_default(),
        })
    }
}

/// Watch re-arm request sent after a reconnect (request xid -8)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetWatches {
    /// Zxid the watches were valid at
    pub relative_zxid: i64,
    /// Paths with data watches
    pub data_watches: Vec<String>,
    /// Paths with exists watches
    pub exist_watches: Vec<String>,
    /// Paths with child watches
    pub child_watches: Vec<String>,
}

impl Record for SetWatches {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.relative_zxid);
        put_string_vec(buf, &self.data_watches);
        put_string_vec(buf, &self.exist_watches);
        put_string_vec(buf, &self.child_watches);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            relative_zxid: get_i64(buf)?,
            data_watches: get_string_vec(buf)?,
            exist_watches: get_string_vec(buf)?,
            child_watches: get_string_vec(buf)?,
        })
    }
}

/// Node metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stat {
    /// Zxid of the change that created the node
    pub czxid: i64,
    /// Zxid of the last modification
    pub mzxid: i64,
    /// Creation time (ms since epoch)
    pub ctime: i64,
    /// Modification time (ms since epoch)
    pub mtime: i64,
    /// Data version
    pub version: i32,
    /// Children version
    pub cversion: i32,
    /// ACL version
    pub aversion: i32,
    /// Owning session for ephemeral nodes, else 0
    pub ephemeral_owner: i64,
    /// Length of the data field
    pub data_length: i32,
    /// Number of children
    pub num_children: i32,
    /// Zxid of the last child change
    pub pzxid: i64,
}

impl Record for Stat {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.czxid);
        buf.put_i64(self.mzxid);
        buf.put_i64(self.ctime);
        buf.put_i64(self.mtime);
        buf.put_i32(self.version);
        buf.put_i32(self.cversion);
        buf.put_i32(self.aversion);
        buf.put_i64(self.ephemeral_owner);
        buf.put_i32(self.data_length);
        buf.put_i32(self.num_children);
        buf.put_i64(self.pzxid);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            czxid: get_i64(buf)?,
            mzxid: get_i64(buf)?,
            ctime: get_i64(buf)?,
            mtime: get_i64(buf)?,
            version: get_i32(buf)?,
            cversion: get_i32(buf)?,
            aversion: get_i32(buf)?,
            ephemeral_owner: get_i64(buf)?,
            data_length: get_i32(buf)?,
            num_children: get_i32(buf)?,
            pzxid: get_i64(buf)?,
        })
    }
}

/// Request body shared by exists, get-data and get-children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    /// Node path
    pub path: String,
    /// Whether the server should arm a watch
    pub watch: bool,
}

impl PathRequest {
    /// Create a new path request
    pub fn new(path: impl Into<String>, watch: bool) -> Self {
        Self {
            path: path.into(),
            watch,
        }
    }
}

impl Record for PathRequest {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.path);
        put_bool(buf, self.watch);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            path: get_string(buf)?.unwrap_or_default(),
            watch: get_bool(buf)?,
        })
    }
}

/// Reply to an exists request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExistsResponse {
    /// Node metadata
    pub stat: Stat,
}

impl Record for ExistsResponse {
    fn encode(&self, buf: &mut BytesMut) {
        self.stat.encode(buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            stat: Stat::decode(buf)?,
        })
    }
}

/// Reply to a get-data request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataResponse {
    /// Node contents
    pub data: Bytes,
    /// Node metadata
    pub stat: Stat,
}

impl Record for GetDataResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_buffer(buf, Some(&self.data));
        self.stat.encode(buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            data: get_buffer(buf)?.unwrap_or_default(),
            stat: Stat::decode(buf)?,
        })
    }
}

/// Reply to a get-children request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetChildrenResponse {
    /// Child node names
    pub children: Vec<String>,
}

impl Record for GetChildrenResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_string_vec(buf, &self.children);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            children: get_string_vec(buf)?,
        })
    }
}
