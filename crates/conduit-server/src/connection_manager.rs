use std::collections::HashMap;
use std::sync::{Mutex, Arc};
use std::time::Duration;

use conduit_core::{codes, ConnectionId, Error, ShutdownReason};
use conduit_transport::ConnectionAbortHandle;
use tokio::sync::watch;
use tracing::warn;

struct Entry {
    abort: Arc<dyn ConnectionAbortHandle>,
    done: watch::Receiver<bool>,
}

/// Tracks every connection a transport currently has live: register on
/// accept, signal close or abort on shutdown, await completion with a
/// timeout. Uses a `tokio::sync::watch` completion marker per connection
/// rather than a hand-rolled timeout future.
///
/// Invariant: an entry is added before the dispatcher's execution task
/// begins observing it, and removed only after that task has fully
/// completed (`ManagedConnection::execute` returning and the connection
/// being disposed) — see `ConnectionDispatcher`.
#[derive(Default)]
pub struct TransportConnectionManager {
    connections: Mutex<HashMap<ConnectionId, Entry>>,
}

impl TransportConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `abort` under `id` and returns the sender half the caller
    /// fires once the connection's execution task has fully completed.
    pub fn add(&self, id: ConnectionId, abort: Arc<dyn ConnectionAbortHandle>) -> watch::Sender<bool> {
        let (done_tx, done_rx) = watch::channel(false);
        self.connections.lock().unwrap().insert(id, Entry { abort, done: done_rx });
        done_tx
    }

    pub fn remove(&self, id: ConnectionId) {
        self.connections.lock().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn snapshot(&self) -> Vec<(Arc<dyn ConnectionAbortHandle>, watch::Receiver<bool>)> {
        self.connections
            .lock()
            .unwrap()
            .values()
            .map(|entry| (Arc::clone(&entry.abort), entry.done.clone()))
            .collect()
    }

    /// Marks every currently-registered connection for graceful shutdown by
    /// cancelling its connection-closed token, then waits up to `timeout`
    /// for all of their execution tasks to complete. Returns `true` iff
    /// every one of them did.
    pub async fn close_all_connections(&self, timeout: Duration) -> bool {
        let snapshot = self.snapshot();
        for (abort, _) in &snapshot {
            abort.closed().cancel();
        }
        wait_all(snapshot, Some(timeout)).await
    }

    /// Invokes `abort` on every connection still registered (typically the
    /// survivors of a [`Self::close_all_connections`] that timed out) and
    /// waits unconditionally for their execution tasks to finish. Abort
    /// failure is logged and then ignored.
    pub async fn abort_all_connections(&self) -> bool {
        let snapshot = self.snapshot();
        for (abort, _) in &snapshot {
            let reason = ShutdownReason::from_error(Error::new(codes::SERVER_SHUTDOWN, "server shutdown"));
            abort.abort(reason).await;
        }
        wait_all(snapshot, None).await
    }
}

async fn wait_all(
    snapshot: Vec<(Arc<dyn ConnectionAbortHandle>, watch::Receiver<bool>)>,
    timeout: Option<Duration>,
) -> bool {
    let total = snapshot.len();
    let wait = async move {
        for (_, mut done) in snapshot {
            let _ = done.wait_for(|completed| *completed).await;
        }
    };
    match timeout {
        Some(duration) => match tokio::time::timeout(duration, wait).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    target: "conduit::server::connection_manager",
                    total,
                    "not all connections closed gracefully within the shutdown deadline"
                );
                false
            }
        },
        None => {
            wait.await;
            true
        }
    }
}
