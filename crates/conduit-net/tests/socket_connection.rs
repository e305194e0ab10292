use conduit_core::{ConnectionId, ShutdownReason};
use conduit_net::SocketConnection;
use conduit_pipe::{PipeOptions, ReadOutcome};
use conduit_transport::{ConnectionPipeOptions, TransportConnection};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn small_pipe_options() -> ConnectionPipeOptions {
    ConnectionPipeOptions {
        inbound: PipeOptions::new(4096, 2048, 4096),
        outbound: PipeOptions::new(4096, 2048, 4096),
    }
}

/// Graceful echo, then FIN.
#[tokio::test(flavor = "multi_thread")]
async fn graceful_echo_then_fin() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client_task = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        client.shutdown().await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        response
    });

    let (server_stream, _) = listener.accept().await.unwrap();
    let mut connection = SocketConnection::new(ConnectionId::new(1), server_stream, small_pipe_options());
    connection.start(true, false);

    let app = connection.application_pipe().clone();
    let received = match app.reader().read().await {
        ReadOutcome::Data(data) => data,
        other => panic!("expected data, got {other:?}"),
    };
    assert_eq!(&received[..], b"ping");
    app.reader().advance(received.len()).await;
    app.writer().write(&received).await;
    app.writer().complete(None).await;

    let response = client_task.await.unwrap();
    assert_eq!(response, b"ping");

    connection.closed().cancelled().await;
    connection.dispose().await;
}

/// Peer reset mid-stream surfaces as a completion carrying "connection
/// reset".
#[tokio::test(flavor = "multi_thread")]
async fn peer_reset_mid_stream_surfaces_as_reset_completion() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client_task = tokio::spawn(async move {
        let client = TcpStream::connect(addr).await.unwrap();
        client.set_linger(Some(std::time::Duration::from_secs(0))).unwrap();
        let mut client = client;
        client.write_all(b"abc").await.unwrap();
        // Dropping with SO_LINGER(0) forces an RST instead of a FIN.
        drop(client);
    });

    let (server_stream, _) = listener.accept().await.unwrap();
    let mut connection = SocketConnection::new(ConnectionId::new(2), server_stream, small_pipe_options());
    connection.start(true, false);

    let app = connection.application_pipe().clone();
    let received = match app.reader().read().await {
        ReadOutcome::Data(data) => data,
        other => panic!("expected data, got {other:?}"),
    };
    assert_eq!(&received[..], b"abc");
    app.reader().advance(received.len()).await;

    match app.reader().read().await {
        ReadOutcome::Errored(err) => assert_eq!(err.code(), "conduit.transport.reset"),
        other => panic!("expected a reset completion, got {other:?}"),
    }

    client_task.await.unwrap();
    connection.closed().cancelled().await;
    connection.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_is_idempotent_and_fires_connection_closed_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let _client = tokio::spawn(async move {
        let _client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let (server_stream, _) = listener.accept().await.unwrap();
    let mut connection = SocketConnection::new(ConnectionId::new(3), server_stream, small_pipe_options());
    connection.start(true, false);

    connection.abort(ShutdownReason::graceful_send_completion()).await;
    connection.abort(ShutdownReason::graceful_send_completion()).await;
    connection.abort(ShutdownReason::graceful_send_completion()).await;

    connection.closed().cancelled().await;
    connection.dispose().await;
}
