//! Client handle.
//!
//! [`Keeper`] wires a [`Session`] to the tokio driver and exposes request
//! submission. Every request returns a [`Pending`], a completion channel
//! that can be awaited or waited on from a plain thread.

use crate::address::AddressList;
use crate::error::{KeeperError, KeeperResult};
use crate::packet::{Completion, QueuedOp};
use crate::session::{KeeperState, Session, SessionConfig};
use crate::transport::TokioBinding;
use crate::watch::{WatchArg, WatchRequest, WatchType, Watcher};
use bytes::Bytes;
use keeper_wire::{
    encode_records, ErrorCode, ExistsResponse, GetChildrenResponse, GetDataResponse, OpCode,
    PathRequest, Record, Stat,
};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome of a submitted request
#[derive(Debug)]
pub struct Pending<T> {
    op: QueuedOp,
    rx: oneshot::Receiver<KeeperResult<T>>,
}

impl<T> Pending<T> {
    /// The request as it was queued
    pub fn op(&self) -> QueuedOp {
        self.op
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from inside an async context; await the
    /// `Pending` there instead.
    pub fn wait(self) -> KeeperResult<T> {
        self.rx.blocking_recv().unwrap_or(Err(KeeperError::Canceled))
    }
}

impl<T> Future for Pending<T> {
    type Output = KeeperResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(KeeperError::Canceled)))
    }
}

/// Handle to one client session
#[derive(Clone)]
pub struct Keeper {
    session: Arc<Mutex<Session>>,
}

impl Keeper {
    /// Create a session on the current tokio runtime and start connecting
    pub fn connect(
        addresses: AddressList,
        config: SessionConfig,
        default_watcher: Option<Watcher>,
    ) -> KeeperResult<Self> {
        let binding = TokioBinding::new(config.max_frame_size)?;
        let session = Arc::new(Mutex::new(Session::new(
            binding.clone(),
            addresses,
            config,
            default_watcher,
        )));
        binding.attach(&session)?;
        session.lock().start()?;
        Ok(Self { session })
    }

    /// Submit an arbitrary request and decode the reply body as `T`
    pub fn request<T>(
        &self,
        opcode: OpCode,
        body: Option<&dyn Record>,
        watch: Option<WatchRequest>,
    ) -> KeeperResult<Pending<T>>
    where
        T: Record + Send + 'static,
    {
        self.submit(opcode, body, watch, |outcome| {
            let mut body = outcome?;
            Ok(T::decode(&mut body)?)
        })
    }

    /// Node metadata, or `None` if the node does not exist.
    ///
    /// A watch set here fires on creation, deletion or data change.
    pub fn exists(&self, path: &str, watch: impl Into<WatchArg>) -> KeeperResult<Pending<Option<Stat>>> {
        let (request, watch) = path_request(WatchType::Exists, path, watch.into());
        self.submit(OpCode::Exists, Some(&request), watch, |outcome| match outcome {
            Ok(mut body) => Ok(Some(ExistsResponse::decode(&mut body)?.stat)),
            Err(KeeperError::Server(ErrorCode::NoNode)) => Ok(None),
            Err(e) => Err(e),
        })
    }

    /// Node contents and metadata
    pub fn get_data(&self, path: &str, watch: impl Into<WatchArg>) -> KeeperResult<Pending<GetDataResponse>> {
        let (request, watch) = path_request(WatchType::Data, path, watch.into());
        self.request(OpCode::GetData, Some(&request), watch)
    }

    /// Child node names
    pub fn get_children(&self, path: &str, watch: impl Into<WatchArg>) -> KeeperResult<Pending<Vec<String>>> {
        let (request, watch) = path_request(WatchType::Children, path, watch.into());
        self.submit(OpCode::GetChildren, Some(&request), watch, |outcome| {
            let mut body = outcome?;
            Ok(GetChildrenResponse::decode(&mut body)?.children)
        })
    }

    /// Add authentication credentials to the session
    pub fn add_auth(&self, scheme: &str, auth: impl Into<Bytes>) -> KeeperResult<()> {
        self.session.lock().add_auth(scheme, auth.into())
    }

    /// Close the session once outstanding requests have completed
    pub fn close(&self) -> KeeperResult<Pending<()>> {
        let (tx, rx) = oneshot::channel();
        let completion: Completion = Box::new(move |outcome| {
            let _ = tx.send(outcome.map(|_| ()));
        });
        let op = self.session.lock().close(Some(completion))?;
        debug!("Close queued as xid {}", op.xid);
        Ok(Pending { op, rx })
    }

    /// Server observed state
    pub fn state(&self) -> Option<KeeperState> {
        self.session.lock().keeper_state()
    }

    /// Session id, 0 until connected
    pub fn session_id(&self) -> i64 {
        self.session.lock().session_id()
    }

    fn submit<T, F>(
        &self,
        opcode: OpCode,
        body: Option<&dyn Record>,
        watch: Option<WatchRequest>,
        decode: F,
    ) -> KeeperResult<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce(KeeperResult<Bytes>) -> KeeperResult<T> + Send + 'static,
    {
        let request = body.map(|body| encode_records(&[body]));
        let (tx, rx) = oneshot::channel();
        let completion: Completion = Box::new(move |outcome| {
            let _ = tx.send(decode(outcome));
        });

        let op = self
            .session
            .lock()
            .queue_request(opcode, request, watch, Some(completion))?;
        Ok(Pending { op, rx })
    }
}

fn path_request(watch_type: WatchType, path: &str, watch: WatchArg) -> (PathRequest, Option<WatchRequest>) {
    let watching = !matches!(watch, WatchArg::None);
    let request = PathRequest::new(path, watching);
    let watch = watching.then(|| WatchRequest::new(watch_type, path, watch));
    (request, watch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::recv_frame;
    use crate::watch::{WatchEvent, WatchedEvent};
    use bytes::BytesMut;
    use keeper_wire::{
        encode_frame, ConnectRequest, ConnectResponse, FrameDecoder, ReplyHeader, RequestHeader,
        WatcherEvent, DEFAULT_MAX_FRAME_SIZE, WATCH_EVENT_XID,
    };
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn send_frame(stream: &mut TcpStream, records: &[&dyn Record]) {
        let frame = encode_frame(records, DEFAULT_MAX_FRAME_SIZE).unwrap();
        stream.write_all(&frame).await.unwrap();
    }

    /// Minimal server: one node `/app` holding `v1` with children `a` and `b`.
    /// A data watch on `/app` is fired right after it is set.
    async fn serve_one(listener: TcpListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let mut buffer = BytesMut::new();

        let mut body = recv_frame(&mut stream, &mut decoder, &mut buffer).await.unwrap();
        ConnectRequest::decode(&mut body).unwrap();
        let response = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 6000,
            session_id: 99,
            passwd: Bytes::from_static(b"0123456789abcdef"),
        };
        send_frame(&mut stream, &[&response]).await;

        let mut zxid = 0;
        while let Ok(mut body) = recv_frame(&mut stream, &mut decoder, &mut buffer).await {
            zxid += 1;
            let header = RequestHeader::decode(&mut body).unwrap();
            let ok = ReplyHeader::new(header.xid, zxid, ErrorCode::Ok);
            match header.opcode {
                OpCode::Exists => {
                    let request = PathRequest::decode(&mut body).unwrap();
                    if request.path == "/app" {
                        send_frame(&mut stream, &[&ok, &ExistsResponse { stat: Stat::default() }]).await;
                    } else {
                        let missing = ReplyHeader::new(header.xid, zxid, ErrorCode::NoNode);
                        send_frame(&mut stream, &[&missing]).await;
                    }
                }
                OpCode::GetData => {
                    let request = PathRequest::decode(&mut body).unwrap();
                    let data = GetDataResponse {
                        data: Bytes::from_static(b"v1"),
                        stat: Stat::default(),
                    };
                    send_frame(&mut stream, &[&ok, &data]).await;
                    if request.watch {
                        let event = WatcherEvent {
                            event_type: WatchEvent::NodeDataChanged as i32,
                            state: 3,
                            path: request.path,
                        };
                        let header = ReplyHeader::new(WATCH_EVENT_XID, -1, ErrorCode::Ok);
                        send_frame(&mut stream, &[&header, &event]).await;
                    }
                }
                OpCode::GetChildren => {
                    let children = GetChildrenResponse {
                        children: vec!["a".to_string(), "b".to_string()],
                    };
                    send_frame(&mut stream, &[&ok, &children]).await;
                }
                OpCode::CloseSession => {
                    send_frame(&mut stream, &[&ok]).await;
                    return;
                }
                other => panic!("unexpected opcode {other:?}"),
            }
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            connect_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn start_server() -> AddressList {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_one(listener));
        AddressList::parse(&format!("127.0.0.1:{port}")).unwrap()
    }

    #[tokio::test]
    async fn test_reads_and_close() {
        let addresses = start_server().await;
        let keeper = Keeper::connect(addresses, fast_config(), None).unwrap();

        let stat = keeper.exists("/app", false).unwrap().await.unwrap();
        assert_eq!(stat, Some(Stat::default()));
        assert_eq!(keeper.exists("/nope", false).unwrap().await.unwrap(), None);

        let data = keeper.get_data("/app", false).unwrap().await.unwrap();
        assert_eq!(data.data, Bytes::from_static(b"v1"));

        let children = keeper.get_children("/app", false).unwrap().await.unwrap();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(keeper.session_id(), 99);
        assert_eq!(keeper.state(), Some(KeeperState::Connected));

        keeper.close().unwrap().await.unwrap();
        assert!(matches!(
            keeper.exists("/app", false),
            Err(KeeperError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_watch_fires_through_event_task() {
        let addresses = start_server().await;
        let keeper = Keeper::connect(addresses, fast_config(), None).unwrap();

        let (tx, rx) = oneshot::channel::<WatchedEvent>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let watcher = Watcher::callback(move |event| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });

        keeper.get_data("/app", watcher).unwrap().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, WatchEvent::NodeDataChanged);
        assert_eq!(event.path, "/app");
    }

    #[test]
    fn test_blocking_wait_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let addresses = runtime.block_on(start_server());

        let keeper = {
            let _guard = runtime.enter();
            Keeper::connect(addresses, fast_config(), None).unwrap()
        };

        let children = keeper.get_children("/app", false).unwrap().wait().unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_dropped_completion_is_canceled() {
        let (tx, rx) = oneshot::channel::<KeeperResult<()>>();
        drop(tx);
        let pending = Pending {
            op: QueuedOp {
                xid: 1,
                opcode: OpCode::Sync,
            },
            rx,
        };
        assert_eq!(pending.wait(), Err(KeeperError::Canceled));
    }
}
