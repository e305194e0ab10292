use crate::options::PipeOptions;
use crate::pipe::{Pipe, PipeReader, PipeWriter};

/// The transport-facing view of a [`DuplexPipePair`]: the transport's output
/// is input to the application, and the transport's input is output from
/// the application.
///
/// The receive loop writes incoming bytes through [`Self::writer`]; the send
/// loop reads outgoing bytes through [`Self::reader`].
#[derive(Debug, Clone)]
pub struct TransportSide {
    reader: PipeReader,
    writer: PipeWriter,
}

impl TransportSide {
    pub fn reader(&self) -> &PipeReader {
        &self.reader
    }

    pub fn writer(&self) -> &PipeWriter {
        &self.writer
    }
}

/// The application-facing view of a [`DuplexPipePair`]: the delegate reads
/// what the transport received and writes what the transport should send.
#[derive(Debug, Clone)]
pub struct ApplicationSide {
    reader: PipeReader,
    writer: PipeWriter,
}

impl ApplicationSide {
    pub fn reader(&self) -> &PipeReader {
        &self.reader
    }

    pub fn writer(&self) -> &PipeWriter {
        &self.writer
    }
}

/// Two independent [`Pipe`]s cross-wired into a transport/application
/// duplex.
///
/// `inbound` carries bytes the receive loop read off the socket to the
/// application; `outbound` carries bytes the application wrote back to the
/// send loop. Each direction has its own watermarks, since a slow reader on
/// one side must never stall writes on the other — each direction applies
/// backpressure independently.
#[derive(Debug)]
pub struct DuplexPipePair {
    transport: TransportSide,
    application: ApplicationSide,
}

impl DuplexPipePair {
    pub fn new(inbound_options: PipeOptions, outbound_options: PipeOptions) -> Self {
        let (inbound_reader, inbound_writer) = Pipe::new(inbound_options).split();
        let (outbound_reader, outbound_writer) = Pipe::new(outbound_options).split();

        Self {
            transport: TransportSide {
                reader: outbound_reader,
                writer: inbound_writer,
            },
            application: ApplicationSide {
                reader: inbound_reader,
                writer: outbound_writer,
            },
        }
    }

    /// Same watermark configuration for both directions.
    pub fn symmetric(options: PipeOptions) -> Self {
        Self::new(options, options)
    }

    pub fn transport(&self) -> &TransportSide {
        &self.transport
    }

    pub fn application(&self) -> &ApplicationSide {
        &self.application
    }

    pub fn into_parts(self) -> (TransportSide, ApplicationSide) {
        (self.transport, self.application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::ReadOutcome;

    #[tokio::test]
    async fn transport_writes_are_visible_to_application_reads() {
        let pair = DuplexPipePair::symmetric(PipeOptions::default());
        pair.transport().writer().write(b"from socket").await;
        match pair.application().reader().read().await {
            ReadOutcome::Data(data) => assert_eq!(&data[..], b"from socket"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn application_writes_are_visible_to_transport_reads() {
        let pair = DuplexPipePair::symmetric(PipeOptions::default());
        pair.application().writer().write(b"to socket").await;
        match pair.transport().reader().read().await {
            ReadOutcome::Data(data) => assert_eq!(&data[..], b"to socket"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn directions_are_independent() {
        let pair = DuplexPipePair::symmetric(PipeOptions::default());
        pair.transport().writer().write(b"inbound").await;
        // No outbound bytes written yet: the application's reader should not
        // see them echoed back, and the transport's own reader must not
        // observe what it just wrote on the other pipe.
        pair.application().writer().complete(None).await;
        match pair.transport().reader().read().await {
            ReadOutcome::Completed => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
