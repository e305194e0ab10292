use async_trait::async_trait;
use conduit_transport::{
    ConnectionPipeOptions, Endpoint, FactorySelector, StreamListener, StreamTransportFactory,
};

use crate::tcp_listener::TcpListenerAdapter;

/// The only [`StreamTransportFactory`] this workspace ships: binds
/// [`Endpoint::Ip`] descriptors to a [`TcpListenerAdapter`].
#[derive(Default)]
pub struct TcpTransportFactory {
    max_accepts: Option<usize>,
}

impl TcpTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_accepts(mut self, max_accepts: usize) -> Self {
        self.max_accepts = Some(max_accepts);
        self
    }
}

struct IpOnlySelector;

impl FactorySelector for IpOnlySelector {
    fn can_bind(&self, endpoint: &Endpoint) -> bool {
        matches!(endpoint, Endpoint::Ip(_))
    }
}

#[async_trait]
impl StreamTransportFactory for TcpTransportFactory {
    async fn bind(
        &self,
        endpoint: &Endpoint,
        pipe_options: ConnectionPipeOptions,
    ) -> Result<Box<dyn StreamListener>, conduit_core::Error> {
        let max_accepts = self
            .max_accepts
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let listener = TcpListenerAdapter::bind(endpoint, max_accepts, pipe_options).await?;
        Ok(Box::new(listener))
    }

    fn as_selector(&self) -> Option<&dyn FactorySelector> {
        Some(&IpOnlySelector)
    }

    fn scheme(&self) -> &'static str {
        "http"
    }
}
