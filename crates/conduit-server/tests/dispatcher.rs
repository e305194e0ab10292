use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::{codes, ConnectionId, Error, ShutdownReason};
use conduit_pipe::{ApplicationSide, DuplexPipePair, PipeOptions};
use conduit_server::{AcceptOnce, ConnectionDispatcher, TransportConnectionManager};
use conduit_transport::{
    AcceptToken, ConcurrentListener, ConnectionAbortHandle, ConnectionAddrs, FeatureBag, MiddlewareChain,
    TransportConnection,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

struct AlwaysFailsListener {
    max_accepts: usize,
    attempts: AtomicUsize,
}

#[async_trait]
impl ConcurrentListener for AlwaysFailsListener {
    fn max_accepts(&self) -> usize {
        self.max_accepts
    }

    async fn next_token(&self) -> Result<Option<AcceptToken>, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::new(codes::ACCEPT_FAILED, "simulated accept failure"))
    }

    async fn materialize(&self, _token: AcceptToken) -> Result<Box<dyn TransportConnection>, Error> {
        unreachable!("next_token always errors in this fixture")
    }
}

/// A listener whose accept always fails, bound with `max_accepts = 5`, must
/// produce exactly 5 failed attempts — one per concurrent consumer, each of
/// which then exits rather than retrying.
#[tokio::test(flavor = "multi_thread")]
async fn each_concurrent_consumer_fails_exactly_once_then_exits() {
    let manager = Arc::new(TransportConnectionManager::new());
    let dispatcher = ConnectionDispatcher::new(Arc::clone(&manager), MiddlewareChain::terminal());
    let listener = Arc::new(AlwaysFailsListener {
        max_accepts: 5,
        attempts: AtomicUsize::new(0),
    });

    dispatcher.run(Arc::clone(&listener)).await;

    assert_eq!(listener.attempts.load(Ordering::SeqCst), 5);
    assert_eq!(manager.len(), 0);
}

struct FakeAbortHandle {
    closed: CancellationToken,
}

#[async_trait]
impl ConnectionAbortHandle for FakeAbortHandle {
    async fn abort(&self, _reason: ShutdownReason) {
        self.closed.cancel();
    }

    fn closed(&self) -> &CancellationToken {
        &self.closed
    }
}

struct FakeConnection {
    id: ConnectionId,
    pipe: DuplexPipePair,
    features: FeatureBag,
    closed: CancellationToken,
}

#[async_trait]
impl TransportConnection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn addrs(&self) -> ConnectionAddrs {
        ConnectionAddrs::default()
    }

    fn application_pipe(&self) -> &ApplicationSide {
        self.pipe.application()
    }

    fn features(&self) -> &FeatureBag {
        &self.features
    }

    fn features_mut(&mut self) -> &mut FeatureBag {
        &mut self.features
    }

    fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    async fn abort(&self, _reason: ShutdownReason) {
        self.closed.cancel();
    }

    fn abort_handle(&self) -> Arc<dyn ConnectionAbortHandle> {
        Arc::new(FakeAbortHandle {
            closed: self.closed.clone(),
        })
    }

    async fn dispose(&mut self) {}
}

struct OnceAcceptor {
    connection: AsyncMutex<Option<Box<dyn TransportConnection>>>,
}

#[async_trait]
impl AcceptOnce for OnceAcceptor {
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error> {
        Ok(self.connection.lock().await.take())
    }
}

/// A successfully accepted connection is registered with the connection
/// manager before its middleware runs, and removed only after its execution
/// task (middleware + on-completed callbacks + dispose) has fully completed.
#[tokio::test(flavor = "multi_thread")]
async fn a_dispatched_connection_is_removed_once_its_execution_completes() {
    let manager = Arc::new(TransportConnectionManager::new());
    let dispatcher = ConnectionDispatcher::new(Arc::clone(&manager), MiddlewareChain::terminal());

    let connection: Box<dyn TransportConnection> = Box::new(FakeConnection {
        id: ConnectionId::new(1),
        pipe: DuplexPipePair::symmetric(PipeOptions::default()),
        features: FeatureBag::new(),
        closed: CancellationToken::new(),
    });
    let acceptor = Arc::new(OnceAcceptor {
        connection: AsyncMutex::new(Some(connection)),
    });

    dispatcher.run_single(acceptor).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while manager.len() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(manager.len(), 0);
}
