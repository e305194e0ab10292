#![deny(unsafe_code)]
#![doc = "conduit-core: error, identity and shutdown contracts shared by every layer of the connection transport engine."]

mod error;
mod ids;
mod shutdown;

pub use error::{codes, Error, ErrorCategory, Result};
pub use ids::{ConnectionId, ConnectionIdGenerator};
pub use shutdown::{ShutdownDirection, ShutdownReason};
