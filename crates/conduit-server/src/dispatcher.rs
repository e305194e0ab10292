use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{codes, Error, ShutdownReason};
use conduit_transport::{ConcurrentListener, MiddlewareChain, MultiplexedListener, TransportConnection};
use tracing::error;

use crate::connection_manager::TransportConnectionManager;
use crate::managed_connection::ManagedConnection;

/// The fixed log message emitted for a panicking `on-completed` callback.
const ON_COMPLETED_PANIC_MESSAGE: &str =
    "An error occurred running an IConnectionCompleteFeature.OnCompleted callback.";

/// Drives one endpoint's accept loop. Owns nothing about the listener
/// itself — `bind`/`stop` live on `TransportManager`; this type only turns
/// accepted connections into running [`ManagedConnection`]s.
#[derive(Clone)]
pub struct ConnectionDispatcher {
    connection_manager: Arc<TransportConnectionManager>,
    middleware: MiddlewareChain,
}

impl ConnectionDispatcher {
    pub fn new(connection_manager: Arc<TransportConnectionManager>, middleware: MiddlewareChain) -> Self {
        Self {
            connection_manager,
            middleware,
        }
    }

    /// Runs the stream accept loop to completion: spawns
    /// `listener.max_accepts()` concurrent consumers pulling from the
    /// listener's shared token sequence, and returns once every consumer has
    /// exited — either because the listener unbound, or because that
    /// consumer's own accept attempt failed (logged at critical level per
    /// concurrent consumer; terminates that accept consumer but does not
    /// crash the process).
    pub async fn run(self, listener: Arc<dyn ConcurrentListener>) {
        let max_accepts = listener.max_accepts().max(1);
        let mut consumers = Vec::with_capacity(max_accepts);
        for consumer_index in 0..max_accepts {
            let listener = Arc::clone(&listener);
            let dispatcher = self.clone();
            consumers.push(tokio::spawn(async move {
                dispatcher.run_concurrent_consumer(consumer_index, listener).await;
            }));
        }
        for consumer in consumers {
            let _ = consumer.await;
        }
    }

    async fn run_concurrent_consumer(&self, consumer_index: usize, listener: Arc<dyn ConcurrentListener>) {
        loop {
            let token = match listener.next_token().await {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(err) => {
                    log_accept_failure(consumer_index, &err);
                    break;
                }
            };
            match listener.materialize(token).await {
                Ok(connection) => self.dispatch(connection),
                Err(err) => {
                    error!(
                        target: "conduit::server::dispatcher",
                        consumer = consumer_index,
                        error = %err,
                        "accept token materialized more than once"
                    );
                }
            }
        }
    }

    /// Runs a single-consumer accept loop, used for multiplexed listeners.
    /// The multiplexed accept path always runs with a concurrency of one, so
    /// this workspace does not route multiplexed binds through
    /// [`ConcurrentListener`] at all.
    pub async fn run_single(self, listener: Arc<dyn AcceptOnce>) {
        loop {
            match listener.accept().await {
                Ok(Some(connection)) => self.dispatch(connection),
                Ok(None) => break,
                Err(err) => {
                    log_accept_failure(0, &err);
                    break;
                }
            }
        }
    }

    fn dispatch(&self, connection: Box<dyn TransportConnection>) {
        let managed = ManagedConnection::new(connection, self.middleware.clone());
        let id = managed.id();
        let done_tx = self.connection_manager.add(id, managed.abort_handle());
        let connection_manager = Arc::clone(&self.connection_manager);
        tokio::spawn(async move {
            let mut connection = managed
                .execute(|payload| {
                    let message = panic_message(&payload);
                    error!(
                        target: "conduit::server::dispatcher",
                        connection_id = %id,
                        error = %message,
                        "{ON_COMPLETED_PANIC_MESSAGE}"
                    );
                })
                .await;

            // `dispose` requires `connection-closed` to have already fired.
            // Middleware that returns without waiting on the connection's own
            // closure (e.g. a terminal handler that replies and moves on)
            // would otherwise leave the receive/send loops running forever.
            // Force the same abort the connection manager would use on a
            // shutdown survivor, then wait for the loops to actually exit.
            if !connection.closed().is_cancelled() {
                connection
                    .abort(ShutdownReason::from_error(Error::new(
                        codes::SERVER_SHUTDOWN,
                        "dispatcher: forcing abort, middleware returned before connection-closed",
                    )))
                    .await;
            }
            connection.closed().cancelled().await;

            connection_manager.remove(id);
            connection.dispose().await;
            let _ = done_tx.send(true);
        });
    }
}

fn log_accept_failure(consumer_index: usize, err: &Error) {
    error!(
        target: "conduit::server::dispatcher",
        consumer = consumer_index,
        critical = true,
        error = %err,
        "accept failed"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Unifies [`StreamListener::accept`] and [`MultiplexedListener::accept`]
/// behind one object-safe surface so [`ConnectionDispatcher::run_single`]
/// can drive either without caring which it is holding. A trait object can't
/// be coerced into a *different* trait object directly, so each listener
/// kind gets a one-field adapter rather than implementing `AcceptOnce`
/// straight on `dyn StreamListener`/`dyn MultiplexedListener`.
#[async_trait]
pub trait AcceptOnce: Send + Sync {
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error>;
}

pub struct MultiplexedAcceptAdapter(pub Arc<dyn MultiplexedListener>);

#[async_trait]
impl AcceptOnce for MultiplexedAcceptAdapter {
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error> {
        self.0.accept().await
    }
}
