use std::io;

/// How a socket I/O error should be treated.
///
/// `std::io::ErrorKind` does not expose every platform-specific code a raw
/// socket can report (`Shutdown`, Windows' `OperationAborted`); this
/// classifies the stable subset that `ErrorKind` does expose, which covers
/// every case the Tokio TCP transport can actually produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Peer reset, or (on Windows) a local abort surfaced as a reset code.
    Reset,
    /// Expected once the local side has already torn the socket down.
    Abort,
    Other,
}

pub fn classify(err: &io::Error) -> Classification {
    match err.kind() {
        io::ErrorKind::ConnectionReset => Classification::Reset,
        #[cfg(windows)]
        io::ErrorKind::ConnectionAborted => Classification::Reset,
        #[cfg(not(windows))]
        io::ErrorKind::ConnectionAborted => Classification::Abort,
        io::ErrorKind::Interrupted => Classification::Abort,
        io::ErrorKind::NotConnected => Classification::Abort,
        io::ErrorKind::BrokenPipe => Classification::Abort,
        #[cfg(not(windows))]
        io::ErrorKind::InvalidInput => Classification::Abort,
        _ => Classification::Other,
    }
}
