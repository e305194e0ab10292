#![deny(unsafe_code)]
#![doc = r#"
conduit-server: the part of this workspace that turns bound listeners into
running connections, managing their middleware execution, registration and
graceful shutdown.

# Why
Draining a set of in-flight units of work on shutdown needs a
register/signal/await-with-timeout shape; the accept loop needs a
factory-selection and per-connection dispatch shape. This crate composes
both against [`conduit_transport`]'s object-safe seams.

# What
- [`managed_connection`] — one accepted connection's middleware execution
  and on-completed callback draining.
- [`dispatcher`] — the accept loop, per connection and per concurrent
  consumer.
- [`connection_manager`] — the per-transport registry of live connections,
  with graceful-close and abort-all operations.
- [`transport_manager`] — factory registration, bind, and the four-step stop
  protocol.
"#]

pub mod connection_manager;
pub mod dispatcher;
pub mod managed_connection;
pub mod transport_manager;

pub use connection_manager::TransportConnectionManager;
pub use dispatcher::{AcceptOnce, ConnectionDispatcher, MultiplexedAcceptAdapter};
pub use managed_connection::ManagedConnection;
pub use transport_manager::TransportManager;
