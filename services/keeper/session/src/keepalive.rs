//! Keepalive timing.
//!
//! The read side of a connection waits at most one ping interval for data.
//! The first idle window sends a ping; a second consecutive one means the
//! server is gone and the connection is dropped.

use std::time::Duration;

/// Ping interval for a negotiated session timeout.
///
/// Two missed windows still fit well inside the timeout the server enforces.
pub fn ping_interval(negotiated: Duration) -> Duration {
    negotiated * 2 / 7
}

/// What the read loop should do after an idle window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Send a ping and keep waiting
    Ping,
    /// Give up on the connection
    Drop,
}

/// Idle window counter for one connection
#[derive(Debug, Default)]
pub struct Keepalive {
    idle_windows: u32,
}

impl Keepalive {
    /// Create a fresh counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Any received packet resets the counter
    pub fn on_data(&mut self) {
        self.idle_windows = 0;
    }

    /// Record an idle window
    pub fn on_idle(&mut self) -> IdleAction {
        self.idle_windows += 1;
        if self.idle_windows >= 2 {
            IdleAction::Drop
        } else {
            IdleAction::Ping
        }
    }
}
