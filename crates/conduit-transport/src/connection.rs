use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{ConnectionId, Error, ShutdownReason};
use conduit_pipe::{ApplicationSide, PipeOptions};
use tokio_util::sync::CancellationToken;

use crate::feature_bag::FeatureBag;

/// An independent, `Send + Sync` handle onto a connection's abort/close
/// signal, obtainable without the `&mut` access `TransportConnection`'s
/// feature-bag methods require.
///
/// `conduit-server::ConnectionDispatcher` holds the `Box<dyn
/// TransportConnection>` itself for the whole lifetime of the middleware
/// chain, which needs `&mut dyn TransportConnection` for as long as
/// middleware runs and may await indefinitely. `TransportConnectionManager`
/// still needs to cancel and abort connections concurrently with that
/// in-flight middleware call, which plain `&self`/`&mut self` aliasing
/// cannot express on the same object — so the connection hands out this
/// separate, independently clonable handle at registration time instead.
#[async_trait]
pub trait ConnectionAbortHandle: Send + Sync {
    async fn abort(&self, reason: ShutdownReason);

    fn closed(&self) -> &CancellationToken;
}

/// Local/remote address pair reported by a raw transport connection. Unix
/// and in-memory transports have no meaningful socket address, so both sides
/// are optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionAddrs {
    pub local: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
}

/// The contract a transport implementation (`conduit-net`'s TCP connection,
/// or a test fixture) exposes to `conduit-server` and to middleware:
/// local/remote endpoint, duplex byte pipe, feature bag, unique id,
/// `abort(reason)`, and a close signal.
///
/// This trait commits to a concrete [`ApplicationSide`] pipe handle instead
/// of an associated reader/writer type, since there is exactly one pipe
/// implementation in this workspace — a generic, GAT-based connection trait
/// would buy nothing here.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn addrs(&self) -> ConnectionAddrs;

    /// The application-facing pipe half: middleware reads what the
    /// transport received and writes what it should send.
    fn application_pipe(&self) -> &ApplicationSide;

    fn features(&self) -> &FeatureBag;

    fn features_mut(&mut self) -> &mut FeatureBag;

    /// A token cancelled exactly once, after the receive loop has completed
    /// its final flush ("connection-closed").
    fn closed(&self) -> &CancellationToken;

    /// Tears the connection down with `reason`; idempotent.
    async fn abort(&self, reason: ShutdownReason);

    /// An independently clonable handle carrying the same abort/close
    /// capability as this connection, safe to hand to
    /// `TransportConnectionManager` at registration time (see
    /// [`ConnectionAbortHandle`]).
    fn abort_handle(&self) -> Arc<dyn ConnectionAbortHandle>;

    /// Only called after `connection-closed` has fired. Completes the
    /// transport-side pipes, awaits the receive/send loops, and releases
    /// the socket.
    async fn dispose(&mut self);
}

impl fmt::Debug for ConnectionAddrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local={:?} peer={:?}", self.local, self.peer)
    }
}

/// Per-direction pipe sizing handed to a transport factory at bind time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionPipeOptions {
    pub inbound: PipeOptions,
    pub outbound: PipeOptions,
}

/// Helper alias used by factories that need to report a synchronous bind
/// failure.
pub type BindResult<T> = Result<T, Error>;
