use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// The unified error type returned by every layer of the transport engine:
/// a stable `code`, a human `message`, an optional `cause` and a structured
/// [`ErrorCategory`]. One flat type rather than a tiered hierarchy, since
/// this crate has no cross-service domain boundary to preserve.
#[derive(Debug)]
pub struct Error {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn StdError + 'static))
    }
}

/// Structured classification driving the stop protocol's degrade-gracefully
/// behavior: graceful-close failure falls back to abort, and abort failure
/// is logged and ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Peer reset, local abort after shutdown, or any transient I/O fault.
    Retryable { retry_after: Duration },
    NonRetryable,
    Cancelled,
    Timeout,
    /// The protocol-level cause used when a connection is reset by the peer.
    ConnectionReset,
    /// The cause used when the local side tore the socket down first.
    LocalAbort,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod codes {
    pub const TRANSPORT_RESET: &str = "conduit.transport.reset";
    pub const TRANSPORT_ABORT: &str = "conduit.transport.abort";
    pub const TRANSPORT_IO: &str = "conduit.transport.io";
    pub const ACCEPT_FAILED: &str = "conduit.listener.accept_failed";
    pub const BIND_FAILED: &str = "conduit.listener.bind_failed";
    pub const NO_FACTORY: &str = "conduit.transport_manager.no_factory";
    pub const PIPE_CANCELLED: &str = "conduit.pipe.cancelled";
    pub const SHUTDOWN_TIMEOUT: &str = "conduit.connection_manager.drain_timeout";
    pub const SERVER_SHUTDOWN: &str = "conduit.connection_manager.server_shutdown";
}
