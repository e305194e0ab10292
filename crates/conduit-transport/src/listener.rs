use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::Error;
use tokio::sync::Mutex;

use crate::connection::TransportConnection;
use crate::endpoint::Endpoint;

/// A single opaque accept slot produced by [`ConcurrentListener::next_token`]
/// and redeemed by [`ConcurrentListener::materialize`]: a lazy
/// multi-consumer token sequence, where each token is materialized into a
/// connection by a second call, so that `max-accepts` consumers can block on
/// the shared sequence without materializing more connections than
/// intended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AcceptToken(u64);

/// Normalizes the single-accept listener shape every transport factory
/// produces.
#[async_trait]
pub trait StreamListener: Send + Sync {
    /// One connection, or `None` on unbind.
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error>;

    async fn unbind(&self);

    async fn dispose(&self);

    fn local_endpoint(&self) -> Endpoint;

    /// A listener that supports genuine multi-consumer concurrent accept
    /// overrides this; the default falls back to [`ConcurrentAdapter`]
    /// wrapping `self`'s single-accept surface, turning a single-accept
    /// listener into a lazy sequence by looping on `accept`.
    fn max_accepts_hint(&self) -> usize {
        1
    }
}

/// The concurrent-accept capability. A listener that is naturally
/// single-accept is adapted via [`ConcurrentAdapter`] rather than
/// implementing this directly.
#[async_trait]
pub trait ConcurrentListener: Send + Sync {
    fn max_accepts(&self) -> usize;

    /// Draws the next token from the shared sequence, or `None` once the
    /// listener has unbound.
    async fn next_token(&self) -> Result<Option<AcceptToken>, Error>;

    /// Materializes a token into a connection. Each token is consumed
    /// exactly once.
    async fn materialize(&self, token: AcceptToken) -> Result<Box<dyn TransportConnection>, Error>;
}

/// Adapts any [`StreamListener`] into a [`ConcurrentListener`] of
/// `max_accepts_hint()` by looping on `accept` and stashing results behind
/// tokens.
pub struct ConcurrentAdapter<L: StreamListener + ?Sized> {
    inner: Arc<L>,
    pending: Mutex<HashMap<u64, Box<dyn TransportConnection>>>,
    next_id: AtomicU64,
}

impl<L: StreamListener + ?Sized> ConcurrentAdapter<L> {
    pub fn new(inner: Arc<L>) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl<L: StreamListener + ?Sized> ConcurrentListener for ConcurrentAdapter<L> {
    fn max_accepts(&self) -> usize {
        self.inner.max_accepts_hint()
    }

    async fn next_token(&self) -> Result<Option<AcceptToken>, Error> {
        match self.inner.accept().await? {
            Some(connection) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.pending.lock().await.insert(id, connection);
                Ok(Some(AcceptToken(id)))
            }
            None => Ok(None),
        }
    }

    async fn materialize(&self, token: AcceptToken) -> Result<Box<dyn TransportConnection>, Error> {
        self.pending
            .lock()
            .await
            .remove(&token.0)
            .ok_or_else(|| {
                Error::new(
                    conduit_core::codes::ACCEPT_FAILED,
                    "accept token materialized more than once",
                )
            })
    }
}

/// Marker used by multiplexed listener implementations that need to stash
/// arbitrary per-connection context (e.g. the client-hello info a TLS
/// handshake callback observed) without this crate knowing its shape.
pub type OpaqueContext = Box<dyn Any + Send + Sync>;
