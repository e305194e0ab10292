use crate::error::Error;
use std::fmt;

/// Half-close direction for a byte-stream socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownDirection {
    Read,
    Write,
    Both,
}

/// The reason a [`SocketConnection`](../conduit_net/struct.SocketConnection.html)
/// was shut down.
///
/// The first error that reaches shutdown wins and is the reported reason:
/// [`ShutdownReason`] is the value stored once, under a lock, by whichever
/// of the receive/send loops calls `shutdown` first; later callers must not
/// overwrite it.
#[derive(Debug)]
pub struct ShutdownReason {
    cause: Option<Error>,
}

impl ShutdownReason {
    /// The synthetic cause recorded when the send loop completes gracefully
    /// and nothing else has already set a reason.
    pub fn graceful_send_completion() -> Self {
        Self { cause: None }
    }

    pub fn from_error(error: Error) -> Self {
        Self { cause: Some(error) }
    }

    pub fn is_graceful(&self) -> bool {
        self.cause.is_none()
    }

    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_ref()
    }

    pub fn into_cause(self) -> Option<Error> {
        self.cause
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{cause}"),
            None => write!(f, "graceful send-loop completion"),
        }
    }
}
