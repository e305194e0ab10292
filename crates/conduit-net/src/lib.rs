#![deny(unsafe_code)]
#![doc = r#"
conduit-net: the Tokio TCP implementation of `conduit-transport`'s contracts.

# Why
A TCP connection needs shutdown idempotency, half-close ordering and error
classification; a listener needs an accept loop. This crate builds both
around two independent receive/send loop tasks per connection, rather than a
single request/response channel, so either direction can apply backpressure
without blocking the other.

# What
- [`socket_connection::SocketConnection`] — the per-connection receive/send
  loop pair.
- [`tcp_listener::TcpListenerAdapter`] — the listener wrapper.
- [`tcp_factory::TcpTransportFactory`] — the pluggable factory this
  workspace registers for IP endpoints.
"#]

mod classify;
mod socket_connection;
mod tcp_factory;
mod tcp_listener;

pub use socket_connection::SocketConnection;
pub use tcp_factory::TcpTransportFactory;
pub use tcp_listener::TcpListenerAdapter;
