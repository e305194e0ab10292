#![deny(unsafe_code)]
#![doc = r#"
conduit-pipe: the in-memory duplex byte pipe pair.

# Why
`SocketConnection` needs to hand the application delegate a byte stream that
is decoupled from the raw socket: the receive loop fills one direction, the
send loop drains the other, and both must be able to observe backpressure and
cancellation without blocking each other's OS-level I/O. This mirrors
`System.IO.Pipelines.Pipe`, with watermark bookkeeping built on a
counters-to-signal style of backpressure state.

# What
- [`PipeOptions`] configures the high/low watermark pair for one direction.
- [`Pipe`] is a single unidirectional byte pipe with a [`PipeReader`] and
  [`PipeWriter`] half.
- [`DuplexPipePair`] bundles two [`Pipe`]s (one per direction) and exposes
  `transport` and `application` sides: the transport's writer feeds the
  application's reader and vice versa.
"#]

mod duplex;
mod options;
mod pipe;

pub use duplex::{ApplicationSide, DuplexPipePair, TransportSide};
pub use options::PipeOptions;
pub use pipe::{FlushOutcome, Pipe, PipeReader, PipeWriter, ReadOutcome};
