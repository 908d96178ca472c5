//! Recording fakes of the driver contracts, and reply builders.

#![allow(missing_docs)]

use crate::address::ServerAddress;
use crate::binding::{Binding, Connection};
use crate::error::KeeperResult;
use crate::packet::{Completion, Invocation};
use crate::watch::WatchEvent;
use bytes::{Bytes, BytesMut};
use keeper_wire::{encode_records, ConnectResponse, ErrorCode, Record, ReplyHeader, WatcherEvent, WATCH_EVENT_XID};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingEvent {
    Connect,
    Invoke,
}

/// Binding that records connect attempts and holds callbacks until asked
#[derive(Default)]
pub struct RecordingBinding {
    connects: Mutex<Vec<(ServerAddress, Duration, Duration)>>,
    invocations: Mutex<Vec<Invocation>>,
    events: Mutex<Vec<BindingEvent>>,
}

impl RecordingBinding {
    pub fn connects(&self) -> Vec<(ServerAddress, Duration, Duration)> {
        self.connects.lock().clone()
    }

    pub fn events(&self) -> Vec<BindingEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Run every held callback in order, returning how many ran
    pub fn run_invocations(&self) -> usize {
        let invocations: Vec<Invocation> = self.invocations.lock().drain(..).collect();
        let count = invocations.len();
        for invocation in invocations {
            invocation();
        }
        count
    }
}

impl Binding for RecordingBinding {
    fn connect(&self, address: ServerAddress, delay: Duration, timeout: Duration) {
        self.connects.lock().push((address, delay, timeout));
        self.events.lock().push(BindingEvent::Connect);
    }

    fn invoke(&self, callback: Invocation) {
        self.invocations.lock().push(callback);
        self.events.lock().push(BindingEvent::Invoke);
    }
}

/// Connection that keeps every packet it is asked to send
#[derive(Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<Bytes>>,
    disconnects: AtomicUsize,
}

impl RecordingConnection {
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Connection for RecordingConnection {
    fn send_records(&self, records: &[&dyn Record]) {
        self.sent.lock().push(encode_records(records));
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Completion that stores its outcome
pub fn outcomes() -> (Completion, Arc<Mutex<Vec<KeeperResult<Bytes>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let completion: Completion = Box::new(move |outcome| sink.lock().push(outcome));
    (completion, seen)
}

pub fn connect_response(timeout_ms: i32, session_id: i64) -> Bytes {
    let response = ConnectResponse {
        protocol_version: 0,
        timeout_ms,
        session_id,
        passwd: Bytes::from_static(b"0123456789abcdef"),
    };
    encode_records(&[&response])
}

pub fn reply(xid: i32, zxid: i64, err: ErrorCode, body: &[&dyn Record]) -> Bytes {
    let mut buf = BytesMut::new();
    ReplyHeader::new(xid, zxid, err).encode(&mut buf);
    for record in body {
        record.encode(&mut buf);
    }
    buf.freeze()
}

pub fn watch_notification(event_type: WatchEvent, path: &str) -> Bytes {
    let event = WatcherEvent {
        event_type: event_type as i32,
        state: 3,
        path: path.to_string(),
    };
    reply(WATCH_EVENT_XID, -1, ErrorCode::Ok, &[&event])
}
