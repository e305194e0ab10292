use std::any::Any;
use std::sync::Arc;

use conduit_core::ConnectionId;
use conduit_transport::{ConnectionAbortHandle, MiddlewareChain, OnCompletedFeature, TransportConnection};
use tracing::Instrument;

/// Per-accepted-connection record: the raw transport connection, the
/// composed middleware delegate, and a logging scope keyed by connection id.
/// The completion signal is simply `execute`'s returned future — the
/// dispatcher awaits it directly rather than threading a separate signal
/// through.
pub struct ManagedConnection {
    id: ConnectionId,
    connection: Box<dyn TransportConnection>,
    middleware: MiddlewareChain,
    span: tracing::Span,
}

impl ManagedConnection {
    pub fn new(mut connection: Box<dyn TransportConnection>, middleware: MiddlewareChain) -> Self {
        let id = connection.id();
        connection.features_mut().insert(OnCompletedFeature::new());
        let span = tracing::info_span!(
            target: "conduit::server::managed_connection",
            "connection",
            connection_id = %id,
        );
        Self {
            id,
            connection,
            middleware,
            span,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The independently clonable abort/close handle
    /// `TransportConnectionManager` registers alongside this connection
    /// (see `conduit_transport::ConnectionAbortHandle`).
    pub fn abort_handle(&self) -> Arc<dyn ConnectionAbortHandle> {
        self.connection.abort_handle()
    }

    /// Runs the composed middleware delegate to completion, then drains the
    /// `on-completed` callbacks in reverse registration order.
    /// `on_callback_panic` is invoked for each callback whose closure panics,
    /// so the dispatcher can apply its own fixed log message without this
    /// module needing to know about logging.
    ///
    /// Returns the connection so the dispatcher can wait for it to actually
    /// close, remove it from the connection manager, and dispose of it.
    pub async fn execute(
        mut self,
        mut on_callback_panic: impl FnMut(Box<dyn Any + Send>),
    ) -> Box<dyn TransportConnection> {
        let span = self.span.clone();
        async {
            self.middleware.run(&mut *self.connection).await;

            let callbacks = self
                .connection
                .features_mut()
                .get_mut::<OnCompletedFeature>()
                .map(std::mem::take)
                .unwrap_or_default();
            callbacks.run_all(&mut on_callback_panic);
        }
        .instrument(span)
        .await;
        self.connection
    }
}
