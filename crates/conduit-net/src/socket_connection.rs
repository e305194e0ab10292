use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{codes, ConnectionId, Error, ErrorCategory, ShutdownReason};
use conduit_pipe::{DuplexPipePair, FlushOutcome, ReadOutcome};
use conduit_transport::{
    ConnectionAbortHandle, ConnectionAddrs, ConnectionPipeOptions, FeatureBag, TransportConnection,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{classify, Classification};

/// State shared between a [`SocketConnection`]'s two loop tasks and the
/// outer handle: owns the OS socket's two halves, a shutdown lock, a
/// shutdown reason slot, and a socket-disposed flag.
///
/// An `Arc`-shared inner struct lets the receive and send loops hold their
/// own clone of the Arc while the outer [`SocketConnection`] keeps unique
/// ownership of the feature bag (dispatcher-only access, never shared with
/// the loops).
struct Inner {
    id: ConnectionId,
    /// Split into owned halves so the receive and send loops never contend
    /// on the same lock — operating-system semantics permit one concurrent
    /// reader and one concurrent writer on the same socket. Each half still
    /// sits behind its own single-slot mutex purely so `shutdown` can
    /// `take()` it without an `unsafe` union of ownership.
    read_half: AsyncMutex<Option<OwnedReadHalf>>,
    write_half: AsyncMutex<Option<OwnedWriteHalf>>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    pipes: DuplexPipePair,
    pipe_options: ConnectionPipeOptions,
    shutdown_lock: AsyncMutex<Option<ShutdownReason>>,
    disposed: AtomicBool,
    closed_token: CancellationToken,
    closed_scheduled: AtomicBool,
    closed_latch: Notify,
}

impl Inner {
    /// Guarded by the shutdown lock and idempotent. The disposed flag flips
    /// *before* the socket is torn down so that the peer loop's next syscall
    /// on the same socket is classified as an expected abort rather than
    /// unexpected.
    async fn shutdown(self: &Arc<Self>, reason: ShutdownReason) {
        let mut guard = self.shutdown_lock.lock().await;
        if guard.is_some() {
            return;
        }
        self.disposed.store(true, Ordering::SeqCst);

        let write_half = self.write_half.lock().await.take();
        if let Some(write_half) = write_half {
            if let Ok(sock_ref) = socket2::SockRef::try_from(&write_half) {
                let _ = sock_ref.shutdown(std::net::Shutdown::Both);
            }
            drop(write_half);
        }
        drop(self.read_half.lock().await.take());

        *guard = Some(reason);
    }

    /// Scheduled on a worker, never inline on the receive loop's stack,
    /// guarded by a single-shot latch.
    fn schedule_connection_closed(self: &Arc<Self>) {
        if self.closed_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.closed_token.cancel();
            inner.closed_latch.notify_one();
        });
    }
}

/// Binds one accepted TCP socket to a duplex pipe pair and drives its
/// receive/send loops.
pub struct SocketConnection {
    inner: Arc<Inner>,
    features: FeatureBag,
    receive_task: Option<JoinHandle<()>>,
    send_task: Option<JoinHandle<()>>,
}

impl SocketConnection {
    pub fn new(id: ConnectionId, socket: TcpStream, pipe_options: ConnectionPipeOptions) -> Self {
        let local_addr = socket.local_addr().ok();
        let peer_addr = socket.peer_addr().ok();
        let pipes = DuplexPipePair::new(pipe_options.inbound, pipe_options.outbound);
        let (read_half, write_half) = socket.into_split();

        Self {
            inner: Arc::new(Inner {
                id,
                read_half: AsyncMutex::new(Some(read_half)),
                write_half: AsyncMutex::new(Some(write_half)),
                local_addr,
                peer_addr,
                pipes,
                pipe_options,
                shutdown_lock: AsyncMutex::new(None),
                disposed: AtomicBool::new(false),
                closed_token: CancellationToken::new(),
                closed_scheduled: AtomicBool::new(false),
                closed_latch: Notify::new(),
            }),
            features: FeatureBag::new(),
            receive_task: None,
            send_task: None,
        }
    }

    /// Spawns the two independent loop tasks. `flush_immediately` is the
    /// hint passed when bytes were delivered alongside accept; `wait_for_data`
    /// mirrors the construction-time flag of the same name.
    pub fn start(&mut self, wait_for_data: bool, flush_immediately: bool) {
        let receive_inner = Arc::clone(&self.inner);
        self.receive_task = Some(tokio::spawn(async move {
            receive_loop(receive_inner, wait_for_data, flush_immediately).await;
        }));

        let send_inner = Arc::clone(&self.inner);
        self.send_task = Some(tokio::spawn(async move {
            send_loop(send_inner).await;
        }));
    }

    pub async fn shutdown(&self, reason: ShutdownReason) {
        self.inner.shutdown(reason).await;
    }

    /// Shuts the socket down and wakes a pending read on the
    /// application-output pipe so the send loop observes termination
    /// quickly.
    pub async fn abort(&self, reason: ShutdownReason) {
        self.inner.shutdown(reason).await;
        self.inner.pipes.transport().reader().cancel_pending_read().await;
    }

    /// Only valid after `connection-closed` has fired. Completes the
    /// transport-side pipes, awaits both loops, and drops the cancellation
    /// source.
    pub async fn dispose(&mut self) {
        self.inner.pipes.transport().writer().complete(None).await;
        self.inner.pipes.transport().reader().complete(None).await;

        if let Some(task) = self.receive_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.send_task.take() {
            let _ = task.await;
        }
    }
}

#[async_trait]
impl TransportConnection for SocketConnection {
    fn id(&self) -> ConnectionId {
        self.inner.id
    }

    fn addrs(&self) -> ConnectionAddrs {
        ConnectionAddrs {
            local: self.inner.local_addr,
            peer: self.inner.peer_addr,
        }
    }

    fn application_pipe(&self) -> &conduit_pipe::ApplicationSide {
        self.inner.pipes.application()
    }

    fn features(&self) -> &FeatureBag {
        &self.features
    }

    fn features_mut(&mut self) -> &mut FeatureBag {
        &mut self.features
    }

    fn closed(&self) -> &CancellationToken {
        &self.inner.closed_token
    }

    async fn abort(&self, reason: ShutdownReason) {
        SocketConnection::abort(self, reason).await;
    }

    fn abort_handle(&self) -> Arc<dyn ConnectionAbortHandle> {
        Arc::new(InnerAbortHandle {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn dispose(&mut self) {
        SocketConnection::dispose(self).await;
    }
}

/// The independently clonable abort/close handle `conduit-server`'s
/// `TransportConnectionManager` registers alongside each connection (see
/// `conduit_transport::ConnectionAbortHandle`). Wraps the same `Arc<Inner>`
/// the receive/send loops hold, so it can shut the socket down and cancel
/// `closed_token` concurrently with whatever the dispatcher's task is doing
/// with its own `&mut dyn TransportConnection`.
struct InnerAbortHandle {
    inner: Arc<Inner>,
}

#[async_trait]
impl ConnectionAbortHandle for InnerAbortHandle {
    async fn abort(&self, reason: ShutdownReason) {
        self.inner.shutdown(reason).await;
        self.inner.pipes.transport().reader().cancel_pending_read().await;
    }

    fn closed(&self) -> &CancellationToken {
        &self.inner.closed_token
    }
}

async fn receive_loop(inner: Arc<Inner>, wait_for_data: bool, mut flush_immediately: bool) {
    let writer = inner.pipes.transport().writer();
    let id = inner.id;

    let mut shutdown_reason: Option<ShutdownReason> = None;

    'outer: loop {
        if flush_immediately {
            debug!(target: "conduit::net::socket_connection", connection = %id, "awaiting writer flush before reading more");
            let outcome = writer.flush().await;
            debug!(target: "conduit::net::socket_connection", connection = %id, ?outcome, "writer flush returned");
            match outcome {
                FlushOutcome::Proceed => {}
                FlushOutcome::Completed | FlushOutcome::Canceled => break 'outer,
            }
        }

        if wait_for_data {
            let readable = {
                let guard = inner.read_half.lock().await;
                match guard.as_ref() {
                    Some(half) => half.readable().await,
                    None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                }
            };
            if let Err(err) = readable {
                shutdown_reason = Some(classify_and_log(&inner, id, err, "readable"));
                break 'outer;
            }
        }

        let mut buf = vec![0u8; inner.pipe_options.inbound.min_read_size()];
        let read_result = {
            use tokio::io::AsyncReadExt;
            let mut guard = inner.read_half.lock().await;
            match guard.as_mut() {
                Some(half) => half.read(&mut buf).await,
                None => Err(io::Error::from(io::ErrorKind::NotConnected)),
            }
        };

        let n = match read_result {
            Ok(n) => n,
            Err(err) => {
                shutdown_reason = Some(classify_and_log(&inner, id, err, "read"));
                break 'outer;
            }
        };

        if n == 0 {
            info!(target: "conduit::net::socket_connection", connection = %id, "peer closed connection (FIN)");
            break 'outer;
        }

        writer.write(&buf[..n]).await;
        flush_immediately = true;
    }

    let reason = shutdown_reason.unwrap_or_else(ShutdownReason::graceful_send_completion);
    writer.complete(reason.cause().map(clone_error)).await;
    inner.schedule_connection_closed();
    inner.closed_latch.notified().await;
}

async fn send_loop(inner: Arc<Inner>) {
    let reader = inner.pipes.transport().reader();
    let id = inner.id;
    let mut shutdown_reason: Option<ShutdownReason> = None;
    let mut unexpected_error: Option<Error> = None;

    loop {
        match reader.read().await {
            ReadOutcome::Canceled => break,
            ReadOutcome::Completed => break,
            ReadOutcome::Errored(_) => break,
            ReadOutcome::Data(data) => {
                if !data.is_empty() {
                    let write_result = {
                        let mut guard = inner.write_half.lock().await;
                        match guard.as_mut() {
                            Some(half) => write_all(half, &data[..]).await,
                            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
                        }
                    };
                    if let Err(err) = write_result {
                        let was_disposed = inner.disposed.load(Ordering::SeqCst);
                        let error = map_io_error(err, "write");
                        shutdown_reason = Some(ShutdownReason::from_error(error.clone_for_reason()));
                        if !was_disposed {
                            unexpected_error = Some(error);
                        }
                        reader.advance(data.len()).await;
                        break;
                    }
                }
                let len = data.len();
                reader.advance(len).await;
            }
        }
    }

    let reason = shutdown_reason.unwrap_or_else(ShutdownReason::graceful_send_completion);
    inner.shutdown(reason).await;
    reader.complete(unexpected_error).await;
    inner
        .pipes
        .transport()
        .writer()
        .cancel_pending_flush()
        .await;
    let _ = id;
}

async fn write_all(half: &mut OwnedWriteHalf, mut data: &[u8]) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;
    while !data.is_empty() {
        let n = half.write(data).await?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        data = &data[n..];
    }
    Ok(())
}

/// Classifies `err`, logs accordingly, and returns the [`ShutdownReason`]
/// the caller should record.
fn classify_and_log(inner: &Arc<Inner>, id: ConnectionId, err: io::Error, op: &str) -> ShutdownReason {
    let was_disposed = inner.disposed.load(Ordering::SeqCst);
    match classify(&err) {
        Classification::Reset => {
            if !was_disposed {
                info!(target: "conduit::net::socket_connection", connection = %id, op, "connection reset by peer");
            }
            ShutdownReason::from_error(map_io_error(err, op))
        }
        Classification::Abort => {
            if !was_disposed {
                warn!(target: "conduit::net::socket_connection", connection = %id, op, error = %err, "unexpected abort before local shutdown");
            }
            ShutdownReason::from_error(map_io_error(err, op))
        }
        Classification::Other => {
            tracing::error!(target: "conduit::net::socket_connection", connection = %id, op, error = %err, "unexpected transport error");
            ShutdownReason::from_error(map_io_error(err, op))
        }
    }
}

fn map_io_error(err: io::Error, op: &str) -> Error {
    let category = match classify(&err) {
        Classification::Reset => ErrorCategory::ConnectionReset,
        Classification::Abort => ErrorCategory::LocalAbort,
        Classification::Other => ErrorCategory::NonRetryable,
    };
    let code = match classify(&err) {
        Classification::Reset => codes::TRANSPORT_RESET,
        Classification::Abort => codes::TRANSPORT_ABORT,
        Classification::Other => codes::TRANSPORT_IO,
    };
    Error::new(code, format!("{op}: {err}"))
        .with_category(category)
        .with_cause(err)
}

/// Errors carry a non-`Clone` boxed cause; shutdown reasons and pipe
/// completions each need their own handle on the same logical error, so this
/// re-derives an equivalent value (see `conduit_pipe::pipe::clone_error` for
/// the same pattern).
trait CloneForReason {
    fn clone_for_reason(&self) -> Error;
}

impl CloneForReason for Error {
    fn clone_for_reason(&self) -> Error {
        Error::new(self.code(), self.message().to_string()).with_category(self.category().clone())
    }
}

fn clone_error(err: &Error) -> Error {
    err.clone_for_reason()
}
