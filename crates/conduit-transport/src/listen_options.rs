use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::middleware::{Middleware, MiddlewareChain};

/// Subset of {H1, H2, H3} an endpoint will negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolSet {
    h1: bool,
    h2: bool,
    h3: bool,
    explicitly_set: bool,
}

impl ProtocolSet {
    pub const fn all() -> Self {
        Self {
            h1: true,
            h2: true,
            h3: true,
            explicitly_set: false,
        }
    }

    pub fn with(mut self, h1: bool, h2: bool, h3: bool) -> Self {
        self.h1 = h1;
        self.h2 = h2;
        self.h3 = h3;
        self.explicitly_set = true;
        self
    }

    pub fn h1(&self) -> bool {
        self.h1
    }

    pub fn h2(&self) -> bool {
        self.h2
    }

    pub fn h3(&self) -> bool {
        self.h3
    }

    pub fn explicitly_set(&self) -> bool {
        self.explicitly_set
    }

    /// Returns a copy with the same protocol bits but `explicitly_set`
    /// cleared, used by [`ListenOptions::clone_for_ip`] so the expansion of
    /// a wildcard bind is never mistaken for user configuration.
    fn cloned_without_explicit_flag(&self) -> Self {
        Self {
            explicitly_set: false,
            ..*self
        }
    }
}

impl Default for ProtocolSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Static TLS server options, or a handshake callback invoked per
/// connection. The callback variant is a plain `Arc<dyn Fn>` rather than an
/// associated type, matching this crate's preference for object-safe seams
/// over generic, GAT-based ones.
#[derive(Clone)]
pub enum TlsConfig {
    Static(Arc<StaticTlsOptions>),
    Callback(Arc<dyn TlsHandshakeCallback>),
}

/// Placeholder for whatever opaque server-TLS options a real TLS stack
/// would require; this crate holds them without interpreting them, handing
/// them straight to a transport feature bag.
#[derive(Debug, Default)]
pub struct StaticTlsOptions {
    pub application_protocols: Vec<String>,
}

/// `onConnection(context, cancellation) -> server SSL options`.
/// `Context` is left generic to the caller via `Any`-style downcasting in
/// `conduit-net`/`conduit-server`, since the TLS context shape differs
/// between stream and multiplexed transports.
pub trait TlsHandshakeCallback: Send + Sync {
    fn on_connection(&self) -> Arc<StaticTlsOptions>;
}

/// Per-endpoint configuration.
///
/// Invariant enforced here: the middleware lists are append-only until
/// [`Self::build`] is called; nothing in this type exposes a way to mutate
/// them afterward, since `build()` consumes `&self` and returns an owned
/// [`MiddlewareChain`] rather than a mutable view.
#[derive(Clone)]
pub struct ListenOptions {
    endpoint: Endpoint,
    protocols: ProtocolSet,
    tls: Option<TlsConfig>,
    max_accepts: usize,
    suppress_alt_svc: bool,
    fingerprint: String,
    stream_middleware: Vec<Arc<dyn Middleware>>,
    multiplexed_middleware: Vec<Arc<dyn Middleware>>,
}

impl ListenOptions {
    pub fn new(endpoint: Endpoint, fingerprint: impl Into<String>) -> Self {
        Self {
            endpoint,
            protocols: ProtocolSet::all(),
            tls: None,
            max_accepts: default_max_accepts(),
            suppress_alt_svc: false,
            fingerprint: fingerprint.into(),
            stream_middleware: Vec::new(),
            multiplexed_middleware: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = endpoint;
    }

    pub fn protocols(&self) -> ProtocolSet {
        self.protocols
    }

    pub fn with_protocols(mut self, protocols: ProtocolSet) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn max_accepts(&self) -> usize {
        self.max_accepts
    }

    pub fn with_max_accepts(mut self, max_accepts: usize) -> Self {
        self.max_accepts = max_accepts.max(1);
        self
    }

    pub fn suppress_alt_svc(&self) -> bool {
        self.suppress_alt_svc
    }

    pub fn with_suppress_alt_svc(mut self, suppress: bool) -> Self {
        self.suppress_alt_svc = suppress;
        self
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Appends to the stream middleware list.
    pub fn use_stream_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.stream_middleware.push(middleware);
    }

    pub fn use_multiplexed_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.multiplexed_middleware.push(middleware);
    }

    /// Composes the stream middleware list into a chain. The multiplexed
    /// list is composed the same way via [`Self::build_multiplexed`]; the
    /// two lists are independent — an ordered list of middleware factories
    /// for stream connections, and a parallel list for multiplexed.
    pub fn build(&self) -> MiddlewareChain {
        MiddlewareChain::build(&self.stream_middleware)
    }

    pub fn build_multiplexed(&self) -> MiddlewareChain {
        MiddlewareChain::build(&self.multiplexed_middleware)
    }

    /// Produces an independent options object for a concrete `ip`, copying
    /// the middleware lists and protocol set by value without re-triggering
    /// the "explicitly set" flag or any configuration side effects.
    pub fn clone_for_ip(&self, ip: std::net::IpAddr) -> Self {
        Self {
            endpoint: self.endpoint.with_ip(ip),
            protocols: self.protocols.cloned_without_explicit_flag(),
            tls: self.tls.clone(),
            max_accepts: self.max_accepts,
            suppress_alt_svc: self.suppress_alt_svc,
            fingerprint: self.fingerprint.clone(),
            stream_middleware: self.stream_middleware.clone(),
            multiplexed_middleware: self.multiplexed_middleware.clone(),
        }
    }
}

/// `max-accepts` defaults to the number of logical CPUs.
fn default_max_accepts() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Server-wide shutdown deadline threaded through the stop protocol.
#[derive(Clone, Copy, Debug)]
pub struct ShutdownDeadline(pub Duration);

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopMiddleware;

    #[async_trait::async_trait]
    impl Middleware for NoopMiddleware {
        async fn handle(
            &self,
            connection: &mut dyn crate::connection::TransportConnection,
            next: &MiddlewareChain,
        ) {
            next.run(connection).await;
        }
    }

    #[test]
    fn clone_for_ip_does_not_set_explicit_flag() {
        let endpoint = Endpoint::Ip("[::]:8080".parse().unwrap());
        let mut options = ListenOptions::new(endpoint, "fp-1");
        options.use_stream_middleware(Arc::new(NoopMiddleware));
        let explicit = options.clone().with_protocols(ProtocolSet::all().with(true, false, false));
        assert!(explicit.protocols().explicitly_set());

        let cloned = explicit.clone_for_ip("0.0.0.0".parse().unwrap());
        assert!(!cloned.protocols().explicitly_set());
        assert_eq!(cloned.protocols().h1(), explicit.protocols().h1());
        assert_eq!(cloned.protocols().h2(), explicit.protocols().h2());
        assert_eq!(cloned.suppress_alt_svc(), explicit.suppress_alt_svc());
        assert_eq!(cloned.is_tls(), explicit.is_tls());
    }

    #[test]
    fn max_accepts_defaults_to_at_least_one() {
        let endpoint = Endpoint::Ip("127.0.0.1:0".parse().unwrap());
        let options = ListenOptions::new(endpoint, "fp-2");
        assert!(options.max_accepts() >= 1);
    }
}
