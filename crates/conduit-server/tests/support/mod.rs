use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{ConnectionId, Error, ShutdownReason};
use conduit_pipe::{ApplicationSide, DuplexPipePair, PipeOptions};
use conduit_transport::{
    ConnectionAbortHandle, ConnectionAddrs, Endpoint, FeatureBag, MultiplexedListener, MultiplexedTransportFactory,
    TransportConnection,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// An in-memory multiplexed listener/factory pair. Yields one fixed
/// in-memory connection per `bind` call, then unbinds; exists purely to
/// exercise `TransportManager::bind_multiplexed`'s wiring without a real QUIC
/// stack.
pub struct InMemoryMultiplexedFactory;

#[async_trait]
impl MultiplexedTransportFactory for InMemoryMultiplexedFactory {
    async fn bind(&self, endpoint: &Endpoint, _features: FeatureBag) -> Result<Box<dyn MultiplexedListener>, Error> {
        Ok(Box::new(InMemoryMultiplexedListener {
            endpoint: endpoint.clone(),
            yielded: AtomicBool::new(false),
            slot: AsyncMutex::new(Some(make_connection())),
        }))
    }

    fn scheme(&self) -> &'static str {
        "h3"
    }
}

struct InMemoryMultiplexedListener {
    endpoint: Endpoint,
    yielded: AtomicBool,
    slot: AsyncMutex<Option<Box<dyn TransportConnection>>>,
}

#[async_trait]
impl MultiplexedListener for InMemoryMultiplexedListener {
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error> {
        if self.yielded.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.slot.lock().await.take())
    }

    async fn unbind(&self) {
        self.yielded.store(true, Ordering::SeqCst);
    }

    async fn dispose(&self) {}

    fn local_endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }
}

fn make_connection() -> Box<dyn TransportConnection> {
    Box::new(InMemoryConnection {
        id: ConnectionId::new(1),
        pipe: DuplexPipePair::symmetric(PipeOptions::default()),
        features: FeatureBag::new(),
        closed: CancellationToken::new(),
    })
}

struct InMemoryAbortHandle {
    closed: CancellationToken,
}

#[async_trait]
impl ConnectionAbortHandle for InMemoryAbortHandle {
    async fn abort(&self, _reason: ShutdownReason) {
        self.closed.cancel();
    }

    fn closed(&self) -> &CancellationToken {
        &self.closed
    }
}

struct InMemoryConnection {
    id: ConnectionId,
    pipe: DuplexPipePair,
    features: FeatureBag,
    closed: CancellationToken,
}

#[async_trait]
impl TransportConnection for InMemoryConnection {
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
        Arc::new(InMemoryAbortHandle {
            closed: self.closed.clone(),
        })
    }

    async fn dispose(&mut self) {}
}
