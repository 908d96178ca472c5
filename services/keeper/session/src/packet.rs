//! In-flight requests.
//!
//! A [`Packet`] lives in the session's pending queue from submission until
//! its reply is matched or the session fails it. Completing a packet consumes
//! it, so a packet can produce at most one outcome.

use crate::error::{KeeperError, KeeperResult};
use crate::watch::{WatchType, Watcher};
use bytes::Bytes;
use keeper_wire::{OpCode, RequestHeader};
use std::fmt;

/// Receives the outcome of a request: the undecoded reply body or an error
pub type Completion = Box<dyn FnOnce(KeeperResult<Bytes>) + Send>;

/// A deferred user callback, run by the binding
pub type Invocation = Box<dyn FnOnce() + Send>;

/// Handle describing a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedOp {
    /// Transaction id assigned to the request
    pub xid: i32,
    /// Operation code
    pub opcode: OpCode,
}

/// Watch to register once the reply arrives
#[derive(Debug, Clone)]
pub struct PendingWatch {
    /// Registry category
    pub watch_type: WatchType,
    /// Node path
    pub path: String,
    /// Resolved watcher
    pub watcher: Watcher,
}

/// A single in-flight request
pub struct Packet {
    /// Transaction id
    pub xid: i32,
    /// Operation code
    pub opcode: OpCode,
    /// Serialized request body, if any
    pub request: Option<Bytes>,
    /// Watch armed by this request
    pub watch: Option<PendingWatch>,
    completion: Option<Completion>,
}

impl Packet {
    /// Create a new packet
    pub fn new(xid: i32, opcode: OpCode, request: Option<Bytes>, completion: Option<Completion>) -> Self {
        Self {
            xid,
            opcode,
            request,
            watch: None,
            completion,
        }
    }

    /// Attach a watch registration
    pub fn with_watch(mut self, watch: Option<PendingWatch>) -> Self {
        self.watch = watch;
        self
    }

    /// Header sent in front of the body
    pub fn header(&self) -> RequestHeader {
        RequestHeader::new(self.xid, self.opcode)
    }

    /// Consume the packet and produce the callback delivering its outcome
    pub fn complete(mut self, outcome: KeeperResult<Bytes>) -> Invocation {
        match self.completion.take() {
            Some(completion) => Box::new(move || completion(outcome)),
            None => Box::new(|| {}),
        }
    }

    /// Shorthand for completing with an error
    pub fn fail(self, reason: KeeperError) -> Invocation {
        self.complete(Err(reason))
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("xid", &self.xid)
            .field("opcode", &self.opcode)
            .field("request_len", &self.request.as_ref().map(Bytes::len))
            .field("watch", &self.watch)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}
