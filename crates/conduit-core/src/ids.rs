use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A 64-bit connection identity, unique within the endpoint that assigned it
/// and never reused.
///
/// # Why
/// Per-endpoint, monotonically increasing ids are cheap to generate without
/// coordination and are stable enough to key the connection manager's map
/// and to tag every log line for a connection's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-endpoint generator of monotonically increasing [`ConnectionId`]s.
///
/// One instance lives on each bound listener (`conduit-net`'s
/// `TcpListenerAdapter` holds its own); ids are never reused even after a
/// connection is removed from the transport connection manager.
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator {
    next: AtomicU64,
}

impl ConnectionIdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
