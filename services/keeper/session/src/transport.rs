//! Tokio driver.
//!
//! [`TokioBinding`] realises the binding contract on a tokio runtime. Each
//! connection attempt is one task that dials, spawns a writer task fed by an
//! unbounded channel, primes the session and then runs the read loop until
//! the socket dies. User callbacks run on a separate event task so that a
//! slow or panicking callback never stalls packet reception.
//!
//! The session lock is only taken for short synchronous sections and never
//! held across an await, so the driver runs unchanged on a current-thread
//! runtime.

use crate::address::ServerAddress;
use crate::binding::{Binding, Connection};
use crate::error::{KeeperError, KeeperResult};
use crate::handshake::recv_frame;
use crate::keepalive::{IdleAction, Keepalive};
use crate::packet::Invocation;
use crate::session::Session;
use bytes::{Bytes, BytesMut};
use keeper_wire::{encode_frame, FrameDecoder, Record};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Binding that drives a session on a tokio runtime
pub struct TokioBinding {
    handle: Handle,
    session: OnceCell<Weak<Mutex<Session>>>,
    events: mpsc::UnboundedSender<Invocation>,
    max_frame_size: usize,
}

impl TokioBinding {
    /// Create a binding on the current runtime and start its event task
    pub fn new(max_frame_size: usize) -> KeeperResult<Arc<Self>> {
        let handle = Handle::try_current().map_err(|e| {
            KeeperError::InvalidArgument(format!("tokio binding needs a runtime: {e}"))
        })?;
        Ok(Self::with_handle(handle, max_frame_size))
    }

    /// Create a binding on an explicit runtime
    pub fn with_handle(handle: Handle, max_frame_size: usize) -> Arc<Self> {
        let (events, rx) = mpsc::unbounded_channel();
        handle.spawn(run_events(rx));
        Arc::new(Self {
            handle,
            session: OnceCell::new(),
            events,
            max_frame_size,
        })
    }

    /// Attach the session this binding drives. Only one session per binding.
    pub fn attach(&self, session: &Arc<Mutex<Session>>) -> KeeperResult<()> {
        self.session
            .set(Arc::downgrade(session))
            .map_err(|_| KeeperError::Protocol("binding already attached".to_string()))
    }
}

impl Binding for TokioBinding {
    fn connect(&self, address: ServerAddress, delay: Duration, timeout: Duration) {
        let Some(session) = self.session.get().cloned() else {
            error!("Connect requested before a session was attached");
            return;
        };

        let max_frame_size = self.max_frame_size;
        self.handle.spawn(async move {
            run_connection(session, address, delay, timeout, max_frame_size).await;
        });
    }

    fn invoke(&self, callback: Invocation) {
        if self.events.send(callback).is_err() {
            warn!("Event task stopped, dropping callback");
        }
    }
}

/// Sending side of one live socket
pub struct TokioConnection {
    frames: mpsc::UnboundedSender<Bytes>,
    shutdown: watch::Sender<bool>,
    max_frame_size: usize,
}

impl Connection for TokioConnection {
    fn send_records(&self, records: &[&dyn Record]) {
        match encode_frame(records, self.max_frame_size) {
            Ok(frame) => {
                if self.frames.send(frame).is_err() {
                    debug!("Dropping packet for closed connection");
                }
            }
            Err(e) => {
                error!("Failed to encode packet: {}", e);
                self.disconnect();
            }
        }
    }

    fn disconnect(&self) {
        self.shutdown.send_replace(true);
    }
}

async fn run_events(mut rx: mpsc::UnboundedReceiver<Invocation>) {
    while let Some(callback) = rx.recv().await {
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!("Callback panicked: {}", panic_message(panic.as_ref()));
        }
    }
    debug!("Event task finished");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn run_connection(
    session: Weak<Mutex<Session>>,
    address: ServerAddress,
    delay: Duration,
    connect_timeout: Duration,
    max_frame_size: usize,
) {
    tokio::time::sleep(delay).await;
    let deadline = Instant::now() + connect_timeout;

    let dial = TcpStream::connect((address.host.as_str(), address.port));
    match tokio::time::timeout_at(deadline, dial).await {
        Ok(Ok(stream)) => {
            info!("Connected to {}", address);
            if let Err(e) = serve(stream, &session, deadline, max_frame_size).await {
                warn!("Connection to {} closed: {}", address, e);
            }
        }
        Ok(Err(e)) => warn!("Failed to connect to {}: {}", address, e),
        Err(_) => warn!("Timed out connecting to {}", address),
    }

    if let Some(session) = session.upgrade() {
        session.lock().disconnected();
    }
}

async fn serve(
    stream: TcpStream,
    session: &Weak<Mutex<Session>>,
    deadline: Instant,
    max_frame_size: usize,
) -> Result<(), anyhow::Error> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();

    let (frames, rx) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let conn = Arc::new(TokioConnection {
        frames,
        shutdown,
        max_frame_size,
    });
    tokio::spawn(write_loop(writer, rx, shutdown_rx.clone()));

    upgrade(session)?.lock().prime_connection(conn.clone());

    let result = read_loop(&mut reader, session, shutdown_rx, deadline, max_frame_size).await;
    conn.disconnect();
    result
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!("Write failed: {}", e);
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    reader: &mut OwnedReadHalf,
    session: &Weak<Mutex<Session>>,
    mut shutdown: watch::Receiver<bool>,
    deadline: Instant,
    max_frame_size: usize,
) -> Result<(), anyhow::Error> {
    let mut decoder = FrameDecoder::with_max_frame_size(max_frame_size);
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut keepalive = Keepalive::new();

    loop {
        let ping_interval = {
            let session = upgrade(session)?;
            let session = session.lock();
            session.ping_interval().filter(|_| session.connected())
        };
        // Until the handshake completes only the connect deadline applies
        let wait_until = match ping_interval {
            Some(interval) => Instant::now() + interval,
            None => deadline,
        };

        // Frames already buffered must not outrun a local teardown
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("Connection shut down locally");
                return Ok(());
            }
            frame = tokio::time::timeout_at(wait_until, recv_frame(reader, &mut decoder, &mut buffer)) => {
                match frame {
                    Ok(Ok(body)) => {
                        if *shutdown.borrow() {
                            debug!("Discarding frame from torn down connection");
                            return Ok(());
                        }
                        keepalive.on_data();
                        upgrade(session)?.lock().receive_records(body);
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) if ping_interval.is_none() => {
                        anyhow::bail!("handshake not completed within connect timeout")
                    }
                    Err(_) => match keepalive.on_idle() {
                        IdleAction::Ping => {
                            upgrade(session)?.lock().ping();
                        }
                        IdleAction::Drop => anyhow::bail!("no response to ping"),
                    },
                }
            }
        }
    }
}

fn upgrade(session: &Weak<Mutex<Session>>) -> Result<Arc<Mutex<Session>>, anyhow::Error> {
    session
        .upgrade()
        .ok_or_else(|| anyhow::anyhow!("session dropped"))
}
