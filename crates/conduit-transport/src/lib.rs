#![deny(unsafe_code)]
#![doc = r#"
conduit-transport: the pluggable surface between `conduit-server` and whatever
actually moves bytes (`conduit-net`'s TCP implementation, or a test fixture).

# Why
A generic, GAT-based factory/connection pair suits an in-process, multi-runtime
framework; this crate keeps an object-safe layer only instead, since it needs
trait objects storable in a registry and has already committed to Tokio — the
GAT-generic layer would earn its complexity only if a second runtime were in
the picture.

# What
- [`endpoint`] — the endpoint descriptor and its display form.
- [`feature_bag`] — the type-keyed capability map and the on-completed
  feature.
- [`middleware`] — the middleware contract and right-to-left chain builder.
- [`listen_options`] — per-endpoint configuration.
- [`connection`] — the raw transport connection contract.
- [`listener`] — the stream/concurrent listener contracts.
- [`factory`] — the stream/multiplexed transport factory contracts.
- [`tls_feature`] — the TLS handshake callback feature published into a
  multiplexed bind's feature bag.
"#]

pub mod connection;
pub mod endpoint;
pub mod factory;
pub mod feature_bag;
pub mod listen_options;
pub mod listener;
pub mod middleware;
pub mod tls_feature;

pub use connection::{ConnectionAbortHandle, ConnectionAddrs, ConnectionPipeOptions, TransportConnection};
pub use endpoint::{Endpoint, FileHandleHint};
pub use factory::{
    no_factory_error, select_multiplexed_factory, select_stream_factory, FactorySelector,
    MultiplexedListener, MultiplexedTransportFactory, StreamTransportFactory,
};
pub use feature_bag::{FeatureBag, OnCompletedCallback, OnCompletedFeature};
pub use listen_options::{
    ListenOptions, ProtocolSet, ShutdownDeadline, StaticTlsOptions, TlsConfig, TlsHandshakeCallback,
};
pub use listener::{AcceptToken, ConcurrentAdapter, ConcurrentListener, StreamListener};
pub use middleware::{Middleware, MiddlewareChain};
pub use tls_feature::TlsConnectionCallbackOptions;
