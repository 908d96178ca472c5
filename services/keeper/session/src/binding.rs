//! Contracts between the session and whatever drives its I/O.
//!
//! The session never opens sockets or runs callbacks itself. A [`Binding`]
//! establishes transports and schedules callbacks; a [`Connection`] is one
//! live transport. The driver calls back into the session through
//! `prime_connection`, `receive_records` and `disconnected`, always under
//! the session lock.

use crate::address::ServerAddress;
use crate::packet::Invocation;
use keeper_wire::Record;
use std::time::Duration;

/// One live transport
pub trait Connection: Send + Sync {
    /// Queue the records as a single framed packet
    fn send_records(&self, records: &[&dyn Record]);

    /// Tear the transport down; the driver reports it via `disconnected`
    fn disconnect(&self);
}

/// Scheduling and transport policy a session runs under
pub trait Binding: Send + Sync {
    /// Establish a transport to `address` after `delay`, then prime the session.
    ///
    /// If the handshake has not completed within `timeout` the attempt is
    /// abandoned and the session is told it was disconnected. Must not call
    /// back into the session synchronously.
    fn connect(&self, address: ServerAddress, delay: Duration, timeout: Duration);

    /// Run a user callback under the binding's concurrency model.
    ///
    /// Must not run the callback synchronously on the caller's stack.
    fn invoke(&self, callback: Invocation);
}
