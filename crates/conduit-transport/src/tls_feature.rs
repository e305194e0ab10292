use std::any::Any;
use std::sync::Arc;

use crate::listen_options::StaticTlsOptions;

/// Published into a multiplexed bind's feature bag so the multiplexed
/// transport can complete its own TLS handshake.
///
/// `conduit-server::TransportManager` builds this from whichever
/// [`crate::listen_options::TlsConfig`] variant the endpoint's
/// [`crate::listen_options::ListenOptions`] carries: a static config is
/// wrapped in a closure that always returns the same options; a callback is
/// adapted directly. `application_protocols` defaults to `["h3"]` when the
/// static options don't name any — H3 unless told otherwise for multiplexed
/// binds.
#[derive(Clone)]
pub struct TlsConnectionCallbackOptions {
    pub application_protocols: Vec<String>,
    pub on_connection: Arc<dyn Fn() -> Arc<StaticTlsOptions> + Send + Sync>,
    /// Opaque passthrough state a caller's TLS callback wants handed back on
    /// the next invocation; this crate never inspects it.
    pub on_connection_state: Option<Arc<dyn Any + Send + Sync>>,
}
