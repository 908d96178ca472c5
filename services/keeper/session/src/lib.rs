//! Session engine for the keeper coordination client.
//!
//! This crate keeps one logical session alive across a sequence of TCP
//! connections to an ensemble of servers. It multiplexes concurrent requests
//! over that session, matches replies to requests strictly in send order,
//! delivers one-shot watch notifications exactly once, and reconnects until
//! the session formally expires.
//!
//! ## Features
//!
//! - **Session state machine**: handshake, resume, expiry and close ordering
//! - **Pending queue**: xid allocation and in-order reply matching
//! - **Watch registry**: data, exists and children watches, re-armed on reconnect
//! - **Tokio driver**: dialer, writer and read loops with keepalive, callbacks on a separate task
//! - **Client handle**: awaitable or blocking request completions
//!
//! ## Example
//!
//! ```rust,no_run
//! use keeper_session::{AddressList, Keeper, SessionConfig, Watcher};
//!
//! # async fn example() -> Result<(), keeper_session::KeeperError> {
//! let addresses = AddressList::parse("zk1:2181,zk2:2181,zk3:2181")?;
//! let watcher = Watcher::callback(|event| {
//!     println!("{:?} {:?} {}", event.state, event.event_type, event.path);
//! });
//!
//! let keeper = Keeper::connect(addresses, SessionConfig::default(), Some(watcher))?;
//!
//! // `true` arms the default watcher
//! let node = keeper.get_data("/app/config", true)?.await?;
//! println!("{} bytes", node.data.len());
//!
//! keeper.close()?.await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod binding;
pub mod client;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod packet;
pub mod session;
pub mod transport;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main types
pub use address::{AddressList, ServerAddress, DEFAULT_PORT};
pub use binding::{Binding, Connection};
pub use client::{Keeper, Pending};
pub use error::{KeeperError, KeeperResult};
pub use handshake::{connect_request, parse_connect_response, recv_frame, Credentials, Handshake};
pub use keepalive::{ping_interval, IdleAction, Keepalive};
pub use packet::{Completion, Invocation, Packet, PendingWatch, QueuedOp};
pub use session::{ClientState, KeeperState, Session, SessionConfig};
pub use transport::{TokioBinding, TokioConnection};
pub use watch::{
    WatchArg, WatchEvent, WatchHandler, WatchRegistry, WatchRequest, WatchType, WatchedEvent,
    Watcher,
};
