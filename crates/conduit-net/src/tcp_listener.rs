use async_trait::async_trait;
use conduit_core::{codes, ConnectionIdGenerator, Error};
use conduit_transport::{ConnectionPipeOptions, Endpoint, StreamListener, TransportConnection};
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;

use crate::socket_connection::SocketConnection;

/// Wraps a Tokio `TcpListener` in the [`StreamListener`] shape: a
/// `bind`/`accept`/`local_addr` surface.
///
/// `unbound` rather than an `Option`-behind-a-mutex signals "stop accepting":
/// `TokioTcpListener::accept` takes `&self`, so every concurrent consumer
/// calls it directly against the same listener and races it against the
/// token via `select!`. Gating accept through a mutex guard held across the
/// `.await` would have serialized every consumer onto one accept at a time —
/// defeating the whole point of `max-accepts` — and would have made `unbind`
/// block behind whichever consumer is currently parked in `accept()`.
///
/// Connection ids are assigned here rather than by
/// `conduit-server::ConnectionDispatcher`: the listener already owns a
/// per-endpoint, never-reused counter, and is the natural place to
/// guarantee id uniqueness for this endpoint without threading a shared
/// generator through the dispatcher and every factory. The invariant that
/// actually matters — monotonic, never-reused, per-endpoint ids — holds
/// either way.
pub struct TcpListenerAdapter {
    listener: TokioTcpListener,
    unbound: CancellationToken,
    local_endpoint: Endpoint,
    max_accepts: usize,
    pipe_options: ConnectionPipeOptions,
    ids: ConnectionIdGenerator,
}

impl TcpListenerAdapter {
    pub async fn bind(
        endpoint: &Endpoint,
        max_accepts: usize,
        pipe_options: ConnectionPipeOptions,
    ) -> Result<Self, Error> {
        let Endpoint::Ip(addr) = endpoint else {
            return Err(Error::new(
                codes::BIND_FAILED,
                "TcpListenerAdapter only binds IP endpoints",
            ));
        };

        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|err| Error::new(codes::BIND_FAILED, format!("bind failed: {err}")).with_cause(err))?;

        let local_endpoint = Endpoint::Ip(listener.local_addr().map_err(|err| {
            Error::new(codes::BIND_FAILED, format!("local_addr failed: {err}")).with_cause(err)
        })?);

        Ok(Self {
            listener,
            unbound: CancellationToken::new(),
            local_endpoint,
            max_accepts: max_accepts.max(1),
            pipe_options,
            ids: ConnectionIdGenerator::new(),
        })
    }
}

#[async_trait]
impl StreamListener for TcpListenerAdapter {
    async fn accept(&self) -> Result<Option<Box<dyn TransportConnection>>, Error> {
        if self.unbound.is_cancelled() {
            return Ok(None);
        }
        tokio::select! {
            _ = self.unbound.cancelled() => Ok(None),
            result = self.listener.accept() => match result {
                Ok((stream, _peer_addr)) => {
                    let id = self.ids.next_id();
                    let mut connection = SocketConnection::new(id, stream, self.pipe_options);
                    connection.start(true, false);
                    Ok(Some(Box::new(connection)))
                }
                Err(err) => Err(Error::new(codes::ACCEPT_FAILED, format!("accept failed: {err}")).with_cause(err)),
            },
        }
    }

    async fn unbind(&self) {
        self.unbound.cancel();
    }

    async fn dispose(&self) {
        self.unbound.cancel();
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local_endpoint.clone()
    }

    fn max_accepts_hint(&self) -> usize {
        self.max_accepts
    }
}
