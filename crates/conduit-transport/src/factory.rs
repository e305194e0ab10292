use async_trait::async_trait;
use conduit_core::Error;

use crate::connection::ConnectionPipeOptions;
use crate::endpoint::Endpoint;
use crate::feature_bag::FeatureBag;
use crate::listener::StreamListener;

/// Optional capability a factory implements to claim or reject an endpoint
/// before `bind` is attempted. If present, a factory is consulted; if
/// absent, it is assumed to support any endpoint.
pub trait FactorySelector: Send + Sync {
    fn can_bind(&self, endpoint: &Endpoint) -> bool;
}

/// A pluggable provider that turns an endpoint into a stream listener.
#[async_trait]
pub trait StreamTransportFactory: Send + Sync {
    async fn bind(
        &self,
        endpoint: &Endpoint,
        pipe_options: ConnectionPipeOptions,
    ) -> Result<Box<dyn StreamListener>, Error>;

    /// Present iff this factory wants to opt in/out of specific endpoints
    /// rather than being tried unconditionally.
    fn as_selector(&self) -> Option<&dyn FactorySelector> {
        None
    }

    fn scheme(&self) -> &'static str {
        "http"
    }
}

/// A multiplexed listener yields connections that themselves carry multiple
/// independent streams (QUIC/H3). This workspace does not implement a real
/// QUIC transport; the trait and an in-memory fixture exist so
/// `conduit-server::TransportManager`'s multiplexed bind path is exercised.
#[async_trait]
pub trait MultiplexedListener: Send + Sync {
    async fn accept(&self) -> Result<Option<Box<dyn crate::connection::TransportConnection>>, Error>;

    async fn unbind(&self);

    async fn dispose(&self);

    fn local_endpoint(&self) -> Endpoint;
}

/// A pluggable provider that turns an endpoint plus an immutable TLS feature
/// bag into a multiplexed listener.
#[async_trait]
pub trait MultiplexedTransportFactory: Send + Sync {
    async fn bind(
        &self,
        endpoint: &Endpoint,
        features: FeatureBag,
    ) -> Result<Box<dyn MultiplexedListener>, Error>;

    fn as_selector(&self) -> Option<&dyn FactorySelector> {
        None
    }

    fn scheme(&self) -> &'static str {
        "h3"
    }
}

/// Picks the first factory in `factories` whose [`FactorySelector`] accepts
/// `endpoint`, or whose selector is absent: iterates in order, consulting
/// the optional selector capability when a factory implements it and
/// otherwise accepting the factory, taking the first match.
pub fn select_stream_factory<'a>(
    factories: &'a [std::sync::Arc<dyn StreamTransportFactory>],
    endpoint: &Endpoint,
) -> Option<&'a std::sync::Arc<dyn StreamTransportFactory>> {
    factories.iter().find(|factory| match factory.as_selector() {
        Some(selector) => selector.can_bind(endpoint),
        None => true,
    })
}

pub fn select_multiplexed_factory<'a>(
    factories: &'a [std::sync::Arc<dyn MultiplexedTransportFactory>],
    endpoint: &Endpoint,
) -> Option<&'a std::sync::Arc<dyn MultiplexedTransportFactory>> {
    factories.iter().find(|factory| match factory.as_selector() {
        Some(selector) => selector.can_bind(endpoint),
        None => true,
    })
}

/// The message returned when no factory claims an endpoint.
pub fn no_factory_error(endpoint: &Endpoint) -> Error {
    Error::new(
        conduit_core::codes::NO_FACTORY,
        format!(
            "no registered factory supports endpoint {}: {}",
            endpoint.kind(),
            endpoint
        ),
    )
}
