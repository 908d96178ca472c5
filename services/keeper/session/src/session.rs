//! The session state machine.
//!
//! A [`Session`] is one logical client session that outlives any single TCP
//! connection. It owns transaction id allocation, the pending queue, the
//! watch registry and the connection lifecycle:
//!
//! ```text
//! unstarted -> disconnected <-> connected
//!                   |               |
//!                   +---> expired <-+---> auth_failed
//! ```
//!
//! The session holds no locks and performs no I/O of its own. Every entry
//! point is called by the client handle or the driver while holding the one
//! lock that guards the session, and every user callback leaves through
//! [`Binding::invoke`].

use crate::address::AddressList;
use crate::binding::{Binding, Connection};
use crate::error::{KeeperError, KeeperResult};
use crate::handshake::{self, Credentials, Handshake};
use crate::keepalive;
use crate::packet::{Completion, Invocation, Packet, PendingWatch, QueuedOp};
use crate::watch::{WatchArg, WatchEvent, WatchRegistry, WatchRequest, WatchType, WatchedEvent, Watcher};
use bytes::Bytes;
use keeper_wire::{
    AuthPacket, ErrorCode, OpCode, Record, ReplyHeader, RequestHeader, SetWatches, WatcherEvent,
    AUTH_XID, DEFAULT_MAX_FRAME_SIZE, PING_XID, SET_WATCHES_XID, WATCH_EVENT_XID,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Server observed state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeeperState {
    /// No live connection, still resumable
    Disconnected,
    /// Handshake completed on the current connection
    Connected,
    /// The server rejected our credentials; terminal
    AuthFailed,
    /// The session is gone; terminal
    Expired,
}

impl KeeperState {
    /// Wire code used in watch notifications
    pub fn code(self) -> i32 {
        match self {
            KeeperState::Disconnected => 0,
            KeeperState::Connected => 3,
            KeeperState::AuthFailed => 4,
            KeeperState::Expired => -112,
        }
    }

    /// Whether the state can never be left
    pub fn is_terminal(self) -> bool {
        matches!(self, KeeperState::AuthFailed | KeeperState::Expired)
    }
}

impl TryFrom<i32> for KeeperState {
    type Error = KeeperError;

    fn try_from(code: i32) -> KeeperResult<Self> {
        match code {
            0 => Ok(KeeperState::Disconnected),
            // Read-only and SASL-authenticated connections are still connected
            3 | 5 | 6 => Ok(KeeperState::Connected),
            4 => Ok(KeeperState::AuthFailed),
            -112 => Ok(KeeperState::Expired),
            _ => Err(KeeperError::Protocol(format!("unknown keeper state {code}"))),
        }
    }
}

/// Local lifecycle of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Accepting requests
    Ready,
    /// Close requested, waiting for the pending queue to drain
    Closing,
    /// Close sent, or the session expired
    Closed,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Requested session timeout
    pub timeout: Duration,
    /// Upper bound of the random delay before each connection attempt
    pub connect_delay: Duration,
    /// Handshake deadline per attempt, `timeout / 7` when unset
    pub connect_timeout: Option<Duration>,
    /// Largest frame accepted from the server
    pub max_frame_size: usize,
}

impl SessionConfig {
    /// Effective handshake deadline
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(self.timeout / 7)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            connect_delay: Duration::from_millis(200),
            connect_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// One logical client session
pub struct Session {
    binding: Arc<dyn Binding>,
    config: SessionConfig,
    addresses: AddressList,
    keeper_state: Option<KeeperState>,
    client_state: ClientState,
    credentials: Credentials,
    xid: i32,
    pending: VecDeque<Packet>,
    watches: WatchRegistry,
    default_watcher: Option<Watcher>,
    conn: Option<Arc<dyn Connection>>,
    ping_interval: Option<Duration>,
    disconnect_time: Option<Instant>,
    close_packet: Option<Packet>,
    auth: Vec<AuthPacket>,
}

impl Session {
    /// Create an unstarted session
    pub fn new(
        binding: Arc<dyn Binding>,
        addresses: AddressList,
        config: SessionConfig,
        default_watcher: Option<Watcher>,
    ) -> Self {
        Self {
            binding,
            config,
            addresses,
            keeper_state: None,
            client_state: ClientState::Ready,
            credentials: Credentials::default(),
            xid: 0,
            pending: VecDeque::new(),
            watches: WatchRegistry::new(),
            default_watcher,
            conn: None,
            ping_interval: None,
            disconnect_time: None,
            close_packet: None,
            auth: Vec::new(),
        }
    }

    /// Server observed state, `None` before `start`
    pub fn keeper_state(&self) -> Option<KeeperState> {
        self.keeper_state
    }

    /// Local lifecycle state
    pub fn client_state(&self) -> ClientState {
        self.client_state
    }

    /// Session id, 0 until the first handshake
    pub fn session_id(&self) -> i64 {
        self.credentials.session_id
    }

    /// Highest zxid seen in a matched reply
    pub fn last_zxid_seen(&self) -> i64 {
        self.credentials.last_zxid_seen
    }

    /// Whether the current connection completed its handshake
    pub fn connected(&self) -> bool {
        self.keeper_state == Some(KeeperState::Connected)
    }

    /// Ping interval derived from the last negotiated timeout
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval
    }

    /// Configuration the session was built with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of requests awaiting a reply
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Registered watches
    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// Begin connecting. Fails if the session was already started.
    pub fn start(&mut self) -> KeeperResult<()> {
        if self.keeper_state.is_some() {
            return Err(KeeperError::Protocol("session already started".to_string()));
        }

        self.keeper_state = Some(KeeperState::Disconnected);
        self.disconnect_time = Some(Instant::now());
        debug!("Starting new session");
        self.reconnect();
        Ok(())
    }

    /// Called by the driver once a transport is up: send the connect request
    pub fn prime_connection(&mut self, conn: Arc<dyn Connection>) {
        if self.keeper_state.map_or(true, KeeperState::is_terminal) {
            warn!(
                "Dropping connection primed for inactive session, keeper {:?}",
                self.keeper_state
            );
            conn.disconnect();
            return;
        }

        let request = handshake::connect_request(self.config.timeout, &self.credentials);
        debug!(
            "Priming connection for session {:#x}, last zxid {}",
            request.session_id, request.last_zxid_seen
        );
        conn.send_records(&[&request]);
        self.conn = Some(conn);
    }

    /// Called by the driver with each framed packet body.
    ///
    /// Any decode failure or protocol violation is logged and tears the
    /// transport down; recovery then follows the normal disconnect path.
    pub fn receive_records(&mut self, body: Bytes) {
        let result = match self.keeper_state {
            Some(KeeperState::Disconnected) => self.complete_connection(body),
            Some(KeeperState::Connected) => self.process_reply(body),
            other => {
                warn!("Received packet for closed session, keeper {:?}", other);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(
                "Protocol error on session {:#x}: {}",
                self.credentials.session_id, e
            );
            if let Some(conn) = &self.conn {
                conn.disconnect();
            }
        }
    }

    /// Send a keepalive if connected. The reply is matched by its reserved xid.
    pub fn ping(&mut self) {
        if !self.connected() {
            return;
        }
        if let Some(conn) = &self.conn {
            debug!("Sending ping");
            conn.send_records(&[&RequestHeader::ping()]);
        }
    }

    /// Called by the driver whenever the transport dies, whatever the cause
    pub fn disconnected(&mut self) {
        self.conn = None;
        info!(
            "Disconnected session {:#x}, keeper {:?}, client {:?}",
            self.credentials.session_id, self.keeper_state, self.client_state
        );

        if self.keeper_state.map_or(true, KeeperState::is_terminal) {
            return;
        }

        let was_connected = self.connected();
        if was_connected {
            self.disconnect_time = Some(Instant::now());
        }
        let outage = self
            .disconnect_time
            .map(|since| since.elapsed())
            .unwrap_or_default();

        if self.client_state == ClientState::Closed || outage > self.config.timeout {
            self.session_expired();
            return;
        }

        // Everything pending was already sent; its fate is unknown
        if was_connected {
            self.clear_pending_queue(KeeperError::ConnectionLost);
        }
        self.keeper_state = Some(KeeperState::Disconnected);
        if was_connected {
            self.notify_state(KeeperState::Disconnected);
        }
        self.reconnect();
    }

    /// Submit a request.
    ///
    /// The packet is sent at once when connected, otherwise it is buffered
    /// and flushed in order by the next successful handshake.
    pub fn queue_request(
        &mut self,
        opcode: OpCode,
        request: Option<Bytes>,
        watch: Option<WatchRequest>,
        completion: Option<Completion>,
    ) -> KeeperResult<QueuedOp> {
        if self.client_state != ClientState::Ready {
            return Err(KeeperError::SessionExpired);
        }

        let watch = match watch {
            Some(watch) => self.resolve_watcher(watch)?,
            None => None,
        };

        let xid = self.next_xid();
        let packet = Packet::new(xid, opcode, request, completion).with_watch(watch);
        self.queue_packet(packet);
        Ok(QueuedOp { xid, opcode })
    }

    /// Request the session be closed once every pending request has completed
    pub fn close(&mut self, completion: Option<Completion>) -> KeeperResult<QueuedOp> {
        if self.client_state != ClientState::Ready {
            return Err(KeeperError::SessionExpired);
        }

        let xid = self.next_xid();
        self.close_packet = Some(Packet::new(xid, OpCode::CloseSession, None, completion));
        self.client_state = ClientState::Closing;

        // The server drops the socket right after a close, so nothing may follow it
        self.queue_close_packet_if_necessary();
        Ok(QueuedOp {
            xid,
            opcode: OpCode::CloseSession,
        })
    }

    /// Add credentials, sent now if connected and after every future handshake
    pub fn add_auth(&mut self, scheme: impl Into<String>, auth: Bytes) -> KeeperResult<()> {
        if self.client_state != ClientState::Ready {
            return Err(KeeperError::SessionExpired);
        }

        let packet = AuthPacket {
            auth_type: 0,
            scheme: scheme.into(),
            auth,
        };
        if self.connected() {
            self.send_auth(&packet);
        }
        self.auth.push(packet);
        Ok(())
    }

    fn reconnect(&mut self) {
        let address = self.addresses.rotate();
        let delay = self.config.connect_delay.mul_f64(rand::random::<f64>());
        let timeout = self.config.connect_timeout();

        debug!(
            "Connecting session {:#x} to {} with delay {:?}, timeout {:?}",
            self.credentials.session_id, address, delay, timeout
        );
        self.binding.connect(address, delay, timeout);
    }

    fn complete_connection(&mut self, body: Bytes) -> KeeperResult<()> {
        let (negotiated, session_id, passwd) = match handshake::parse_connect_response(body)? {
            Handshake::Rejected => {
                self.session_expired();
                if let Some(conn) = &self.conn {
                    conn.disconnect();
                }
                return Ok(());
            }
            Handshake::Accepted {
                negotiated,
                session_id,
                passwd,
            } => (negotiated, session_id, passwd),
        };

        let ping_interval = keepalive::ping_interval(negotiated);
        self.keeper_state = Some(KeeperState::Connected);
        self.ping_interval = Some(ping_interval);
        self.credentials.session_id = session_id;
        self.credentials.passwd = passwd;
        info!(
            "Connected session {:#x}, timeout {:?}, ping {:?}",
            session_id, negotiated, ping_interval
        );

        self.rearm_watches();
        for packet in &self.auth {
            self.send_auth(packet);
        }

        debug!("Sending {} queued packets", self.pending.len());
        for packet in &self.pending {
            self.send_packet(packet);
        }

        self.queue_close_packet_if_necessary();
        self.notify_state(KeeperState::Connected);
        Ok(())
    }

    fn session_expired(&mut self) {
        self.clear_pending_queue(KeeperError::SessionExpired);
        if let Some(close) = self.close_packet.take() {
            self.invoke(close.fail(KeeperError::SessionExpired));
        }

        let closed_by_client = self.client_state == ClientState::Closed;
        if closed_by_client {
            info!(
                "Session closed {:#x}, keeper {:?}",
                self.credentials.session_id, self.keeper_state
            );
        } else {
            warn!(
                "Session expired {:#x}, keeper {:?}, client {:?}",
                self.credentials.session_id, self.keeper_state, self.client_state
            );
        }

        self.keeper_state = Some(KeeperState::Expired);
        self.client_state = ClientState::Closed;
        self.watches.clear();
        if !closed_by_client {
            self.notify_state(KeeperState::Expired);
        }
    }

    fn process_reply(&mut self, mut body: Bytes) -> KeeperResult<()> {
        let header = ReplyHeader::decode(&mut body)?;
        debug!(
            "Reply header xid {} zxid {} {}",
            header.xid, header.zxid, header.err
        );

        match header.xid {
            PING_XID => debug!("Ping reply"),
            AUTH_XID => self.process_auth_reply(header),
            SET_WATCHES_XID => {
                if !header.err.is_ok() {
                    warn!("Watch re-arm rejected: {}", header.err);
                }
            }
            WATCH_EVENT_XID => {
                let event = WatcherEvent::decode(&mut body)?;
                self.process_watch_notification(event)?;
            }
            xid => {
                // Replies come back in send order, so the head must match
                let packet = self.pending.pop_front().ok_or_else(|| {
                    KeeperError::Protocol(format!("reply xid {xid} with nothing pending"))
                })?;

                if packet.xid != xid {
                    error!(
                        "Bad xid, expected {} received {}",
                        packet.xid, xid
                    );
                    self.invoke(packet.fail(KeeperError::ConnectionLost));
                    if let Some(conn) = &self.conn {
                        conn.disconnect();
                    }
                    return Ok(());
                }

                self.credentials.last_zxid_seen = self.credentials.last_zxid_seen.max(header.zxid);

                let watch = packet.watch.clone();
                let outcome = if header.err.is_ok() {
                    Ok(body)
                } else {
                    Err(KeeperError::from(header.err))
                };
                self.invoke(packet.complete(outcome));

                if let Some(watch) = watch {
                    // Exists watches also arm on a missing node
                    let arms = header.err.is_ok()
                        || (header.err == ErrorCode::NoNode && watch.watch_type == WatchType::Exists);
                    if arms {
                        self.watches.register(watch.watch_type, watch.path, watch.watcher);
                    }
                }

                self.queue_close_packet_if_necessary();
            }
        }
        Ok(())
    }

    fn process_auth_reply(&mut self, header: ReplyHeader) {
        if header.err.is_ok() {
            debug!("Authentication accepted");
            return;
        }

        warn!(
            "Authentication failed for session {:#x}: {}",
            self.credentials.session_id, header.err
        );
        self.keeper_state = Some(KeeperState::AuthFailed);
        self.client_state = ClientState::Closed;
        self.clear_pending_queue(KeeperError::AuthFailed);
        if let Some(close) = self.close_packet.take() {
            self.invoke(close.fail(KeeperError::AuthFailed));
        }
        self.watches.clear();
        self.notify_state(KeeperState::AuthFailed);

        if let Some(conn) = &self.conn {
            conn.disconnect();
        }
    }

    fn process_watch_notification(&mut self, event: WatcherEvent) -> KeeperResult<()> {
        let watched = WatchedEvent {
            event_type: WatchEvent::try_from(event.event_type)?,
            state: KeeperState::try_from(event.state)?,
            path: event.path,
        };

        if watched.event_type == WatchEvent::None {
            if let Some(watcher) = self.default_watcher.clone() {
                self.invoke(Box::new(move || watcher.notify(&watched)));
            }
            return Ok(());
        }

        let watchers = self.watches.take(watched.event_type, &watched.path);
        debug!(
            "Watch event {:?} on {} fires {} watchers",
            watched.event_type,
            watched.path,
            watchers.len()
        );

        for watcher in watchers {
            let event = watched.clone();
            self.invoke(Box::new(move || watcher.notify(&event)));
        }
        Ok(())
    }

    fn resolve_watcher(&self, request: WatchRequest) -> KeeperResult<Option<PendingWatch>> {
        let watcher = match request.watcher {
            WatchArg::None => return Ok(None),
            WatchArg::Default => self.default_watcher.clone().ok_or_else(|| {
                KeeperError::InvalidArgument("no default watcher configured".to_string())
            })?,
            WatchArg::Watcher(watcher) => watcher,
        };

        Ok(Some(PendingWatch {
            watch_type: request.watch_type,
            path: request.path,
            watcher,
        }))
    }

    fn rearm_watches(&self) {
        if self.watches.is_empty() {
            return;
        }

        let set_watches = SetWatches {
            relative_zxid: self.credentials.last_zxid_seen,
            data_watches: self.watches.paths(WatchType::Data),
            exist_watches: self.watches.paths(WatchType::Exists),
            child_watches: self.watches.paths(WatchType::Children),
        };
        debug!("Re-arming {} watches", self.watches.len());
        if let Some(conn) = &self.conn {
            conn.send_records(&[
                &RequestHeader::new(SET_WATCHES_XID, OpCode::SetWatches),
                &set_watches,
            ]);
        }
    }

    fn send_auth(&self, packet: &AuthPacket) {
        if let Some(conn) = &self.conn {
            debug!("Sending auth for scheme {}", packet.scheme);
            conn.send_records(&[&RequestHeader::new(AUTH_XID, OpCode::Auth), packet]);
        }
    }

    fn clear_pending_queue(&mut self, reason: KeeperError) {
        while let Some(packet) = self.pending.pop_front() {
            self.invoke(packet.fail(reason.clone()));
        }
    }

    fn queue_close_packet_if_necessary(&mut self) {
        if !self.pending.is_empty() || !self.connected() {
            return;
        }
        if let Some(packet) = self.close_packet.take() {
            debug!("Sending close packet");
            self.client_state = ClientState::Closed;
            self.queue_packet(packet);
        }
    }

    fn queue_packet(&mut self, packet: Packet) {
        debug!("Queued {:?}", packet);
        if self.connected() {
            self.send_packet(&packet);
        }
        self.pending.push_back(packet);
    }

    fn send_packet(&self, packet: &Packet) {
        let Some(conn) = &self.conn else {
            return;
        };
        let header = packet.header();
        match &packet.request {
            Some(request) => conn.send_records(&[&header, request]),
            None => conn.send_records(&[&header]),
        }
    }

    /// Next request xid, always positive; negative xids are reserved
    fn next_xid(&mut self) -> i32 {
        self.xid = match self.xid.checked_add(1) {
            Some(xid) => xid,
            None => {
                debug!("Xid space exhausted, wrapping to 1");
                1
            }
        };
        self.xid
    }

    fn invoke(&self, callback: Invocation) {
        self.binding.invoke(callback);
    }

    fn notify_state(&self, state: KeeperState) {
        if let Some(watcher) = self.default_watcher.clone() {
            self.invoke(Box::new(move || {
                watcher.notify(&WatchedEvent::session(state))
            }));
        }
    }
}
