use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::TransportConnection;

/// `(connection) -> completion`. Middleware may attach features — notably
/// [`crate::feature_bag::OnCompletedFeature`] — and may await indefinitely;
/// the dispatcher is responsible for running the chain to completion and
/// then draining on-completed callbacks.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, connection: &mut dyn TransportConnection, next: &MiddlewareChain);
}

/// A composed middleware chain: the result of right-folding
/// [`ListenOptions`](crate::listen_options::ListenOptions)'s middleware list,
/// with the terminal a function returning an already-completed result.
///
/// `MiddlewareChain` owns every inner link — an owned, composed delegate
/// rather than a borrowed slice re-walked on every call.
#[derive(Clone)]
pub struct MiddlewareChain {
    link: Option<Arc<ChainLink>>,
}

struct ChainLink {
    middleware: Arc<dyn Middleware>,
    next: MiddlewareChain,
}

impl MiddlewareChain {
    /// The terminal delegate: an immediately-completed no-op.
    pub fn terminal() -> Self {
        Self { link: None }
    }

    /// Builds a chain from a list of middlewares in *registration* order, so
    /// that the first-registered middleware ends up outermost: folds
    /// right-to-left so the first-registered middleware wraps the
    /// innermost terminal delegate.
    pub fn build(middlewares: &[Arc<dyn Middleware>]) -> Self {
        middlewares
            .iter()
            .rev()
            .fold(Self::terminal(), |next, middleware| Self {
                link: Some(Arc::new(ChainLink {
                    middleware: Arc::clone(middleware),
                    next,
                })),
            })
    }

    pub async fn run(&self, connection: &mut dyn TransportConnection) {
        match &self.link {
            Some(link) => link.middleware.handle(connection, &link.next).await,
            None => {}
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionAddrs;
    use crate::feature_bag::FeatureBag;
    use conduit_core::{ConnectionId, ShutdownReason};
    use conduit_pipe::{ApplicationSide, DuplexPipePair, PipeOptions};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct FakeConnection {
        pipe: DuplexPipePair,
        features: FeatureBag,
        closed: CancellationToken,
    }

    struct FakeAbortHandle {
        closed: CancellationToken,
    }

    #[async_trait]
    impl crate::connection::ConnectionAbortHandle for FakeAbortHandle {
        async fn abort(&self, _reason: ShutdownReason) {
            self.closed.cancel();
        }

        fn closed(&self) -> &CancellationToken {
            &self.closed
        }
    }

    #[async_trait]
    impl TransportConnection for FakeConnection {
        fn id(&self) -> ConnectionId {
            ConnectionId::new(1)
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

        fn abort_handle(&self) -> Arc<dyn crate::connection::ConnectionAbortHandle> {
            Arc::new(FakeAbortHandle {
                closed: self.closed.clone(),
            })
        }

        async fn dispose(&mut self) {}
    }

    struct RecordingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for RecordingMiddleware {
        async fn handle(&self, connection: &mut dyn TransportConnection, next: &MiddlewareChain) {
            self.order.lock().unwrap().push(self.name);
            next.run(connection).await;
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_runs_outermost() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::build(&[
            Arc::new(RecordingMiddleware {
                name: "outer",
                order: Arc::clone(&order),
            }),
            Arc::new(RecordingMiddleware {
                name: "inner",
                order: Arc::clone(&order),
            }),
        ]);

        let mut connection = FakeConnection {
            pipe: DuplexPipePair::symmetric(PipeOptions::default()),
            features: FeatureBag::new(),
            closed: CancellationToken::new(),
        };
        chain.run(&mut connection).await;
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn terminal_chain_completes_immediately() {
        let chain = MiddlewareChain::terminal();
        let mut connection = FakeConnection {
            pipe: DuplexPipePair::symmetric(PipeOptions::default()),
            features: FeatureBag::new(),
            closed: CancellationToken::new(),
        };
        chain.run(&mut connection).await;
    }
}
