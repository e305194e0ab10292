use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduit_core::Error;
use conduit_transport::{
    no_factory_error, select_multiplexed_factory, select_stream_factory, ConcurrentAdapter, ConcurrentListener,
    ConnectionPipeOptions, Endpoint, FeatureBag, ListenOptions, MultiplexedListener, MultiplexedTransportFactory,
    StreamListener, StreamTransportFactory, TlsConfig, TlsConnectionCallbackOptions,
};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::connection_manager::TransportConnectionManager;
use crate::dispatcher::{ConnectionDispatcher, MultiplexedAcceptAdapter};

enum ListenerHandle {
    Stream(Arc<dyn StreamListener>),
    Multiplexed(Arc<dyn MultiplexedListener>),
}

/// One endpoint this process currently has bound: the concrete listener, its
/// own connection manager and dispatcher task, and enough of its
/// [`ListenOptions`] to support fingerprint-partitioned stop.
struct ActiveTransport {
    endpoint: Endpoint,
    fingerprint: String,
    connection_manager: Arc<TransportConnectionManager>,
    listener: ListenerHandle,
    accept_task: JoinHandle<()>,
}

/// Owns the registered transport factories and every endpoint currently
/// bound through them.
pub struct TransportManager {
    stream_factories: Vec<Arc<dyn StreamTransportFactory>>,
    multiplexed_factories: Vec<Arc<dyn MultiplexedTransportFactory>>,
    active: Mutex<Vec<ActiveTransport>>,
}

impl TransportManager {
    pub fn new(
        stream_factories: Vec<Arc<dyn StreamTransportFactory>>,
        multiplexed_factories: Vec<Arc<dyn MultiplexedTransportFactory>>,
    ) -> Self {
        Self {
            stream_factories,
            multiplexed_factories,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Binds a stream endpoint: selects a factory, binds the raw listener,
    /// wraps it in the stream adapter so its `max-accepts` concurrent
    /// consumers share one accept sequence, and spawns a
    /// [`ConnectionDispatcher`] to drive it. Returns the kernel-resolved
    /// endpoint (port `0` becomes the assigned port).
    pub async fn bind_stream(
        &self,
        options: &ListenOptions,
        pipe_options: ConnectionPipeOptions,
    ) -> Result<Endpoint, Error> {
        let factory = select_stream_factory(&self.stream_factories, options.endpoint())
            .ok_or_else(|| no_factory_error(options.endpoint()))?;
        let listener: Arc<dyn StreamListener> = Arc::from(factory.bind(options.endpoint(), pipe_options).await?);
        let effective_endpoint = listener.local_endpoint();

        let connection_manager = Arc::new(TransportConnectionManager::new());
        let dispatcher = ConnectionDispatcher::new(Arc::clone(&connection_manager), options.build());
        let concurrent: Arc<dyn ConcurrentListener> =
            Arc::new(ConcurrentAdapter::new(Arc::clone(&listener)));
        let accept_task = tokio::spawn(dispatcher.run(concurrent));

        self.active.lock().unwrap().push(ActiveTransport {
            endpoint: effective_endpoint.clone(),
            fingerprint: options.fingerprint().to_string(),
            connection_manager,
            listener: ListenerHandle::Stream(listener),
            accept_task,
        });
        Ok(effective_endpoint)
    }

    /// Binds a multiplexed endpoint. The multiplexed accept path always runs
    /// with a concurrency of one (see `DESIGN.md`), so there is no
    /// stream-style adapter here; the feature bag handed to the factory
    /// carries [`TlsConnectionCallbackOptions`] whenever the endpoint
    /// configures TLS.
    pub async fn bind_multiplexed(&self, options: &ListenOptions) -> Result<Endpoint, Error> {
        let factory = select_multiplexed_factory(&self.multiplexed_factories, options.endpoint())
            .ok_or_else(|| no_factory_error(options.endpoint()))?;
        let features = build_multiplexed_feature_bag(options);
        let listener: Arc<dyn MultiplexedListener> = Arc::from(factory.bind(options.endpoint(), features).await?);
        let effective_endpoint = listener.local_endpoint();

        let connection_manager = Arc::new(TransportConnectionManager::new());
        let dispatcher = ConnectionDispatcher::new(Arc::clone(&connection_manager), options.build_multiplexed());
        let accept_task = tokio::spawn(dispatcher.run_single(Arc::new(MultiplexedAcceptAdapter(Arc::clone(&listener)))));

        self.active.lock().unwrap().push(ActiveTransport {
            endpoint: effective_endpoint.clone(),
            fingerprint: options.fingerprint().to_string(),
            connection_manager,
            listener: ListenerHandle::Multiplexed(listener),
            accept_task,
        });
        Ok(effective_endpoint)
    }

    /// Stops every active transport whose fingerprint is in `fingerprints`,
    /// or every active transport when `fingerprints` is `None` — a reload
    /// only needs to stop the endpoints whose configuration actually
    /// changed.
    ///
    /// Runs the same four-step protocol per transport, all transports in
    /// parallel: unbind (stop accepting new connections) while the
    /// accept-loop task is awaited; close all of that transport's
    /// connections gracefully within `deadline`, falling back to abort on
    /// timeout; dispose the listener; remove it from the active set.
    pub async fn stop(&self, fingerprints: Option<&[String]>, deadline: Duration) {
        let to_stop: Vec<ActiveTransport> = {
            let mut active = self.active.lock().unwrap();
            match fingerprints {
                Some(subset) => {
                    let mut matched = Vec::new();
                    let mut i = 0;
                    while i < active.len() {
                        if subset.iter().any(|fp| fp == &active[i].fingerprint) {
                            matched.push(active.remove(i));
                        } else {
                            i += 1;
                        }
                    }
                    matched
                }
                None => std::mem::take(&mut *active),
            }
        };

        let handles: Vec<JoinHandle<()>> = to_stop
            .into_iter()
            .map(|transport| tokio::spawn(stop_one(transport, deadline)))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn stop_one(transport: ActiveTransport, deadline: Duration) {
    match &transport.listener {
        ListenerHandle::Stream(listener) => listener.unbind().await,
        ListenerHandle::Multiplexed(listener) => listener.unbind().await,
    }
    transport.accept_task.abort();
    let _ = transport.accept_task.await;

    if !transport.connection_manager.close_all_connections(deadline).await {
        warn!(
            target: "conduit::server::transport_manager",
            endpoint = %transport.endpoint,
            "not all connections closed gracefully; aborting survivors"
        );
        if !transport.connection_manager.abort_all_connections().await {
            warn!(
                target: "conduit::server::transport_manager",
                endpoint = %transport.endpoint,
                "not all connections aborted"
            );
        }
    }

    match &transport.listener {
        ListenerHandle::Stream(listener) => listener.dispose().await,
        ListenerHandle::Multiplexed(listener) => listener.dispose().await,
    }
}

fn build_multiplexed_feature_bag(options: &ListenOptions) -> FeatureBag {
    let mut bag = FeatureBag::new();
    match options.tls() {
        Some(TlsConfig::Static(static_options)) => {
            let static_options = Arc::clone(static_options);
            let application_protocols = if static_options.application_protocols.is_empty() {
                vec!["h3".to_string()]
            } else {
                static_options.application_protocols.clone()
            };
            bag.insert(TlsConnectionCallbackOptions {
                application_protocols,
                on_connection: Arc::new(move || Arc::clone(&static_options)),
                on_connection_state: None,
            });
        }
        Some(TlsConfig::Callback(callback)) => {
            let callback = Arc::clone(callback);
            bag.insert(TlsConnectionCallbackOptions {
                application_protocols: vec!["h3".to_string()],
                on_connection: Arc::new(move || callback.on_connection()),
                on_connection_state: None,
            });
        }
        None => {
            // No TLS configured: an empty feature bag. Multiplexed binds
            // without TLS are test-only; the in-memory fixture factory is
            // the only consumer of this branch.
        }
    }
    bag
}
