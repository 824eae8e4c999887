use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use skein::rpc::{
    CallMetadata, RpcError, RpcMessage, RpcRequest, RpcResponse, RpcResultStatus, ServiceKey,
};
use skein_rpc_service::{BitcodeCodec, Codec, FilterSet, LoggingFilter, MethodArgs};
use skein_rpc_service_endpoint::ServiceInvoker;
use skein_tokio_rpc_server::{RpcServer, RpcServerConfig, ServerState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn math_key() -> ServiceKey {
    ServiceKey::new("Math", "1.0.0")
}

fn math_service() -> ServiceInvoker {
    ServiceInvoker::builder(BitcodeCodec)
        .method("add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))
        .method_async("slow_add", |(a, b, delay_ms): (i64, i64, u64)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, String>(a + b)
        })
        .build()
}

fn request<Args: MethodArgs>(key: &ServiceKey, method: &str, args: Args, id: u32) -> RpcRequest {
    RpcRequest::new(key, method)
        .with_params(Args::param_types(), args.encode(&BitcodeCodec).unwrap())
        .with_correlation_id(id)
}

async fn start_server(config: RpcServerConfig) -> (Arc<RpcServer>, u16) {
    let server = Arc::new(RpcServer::new(config).with_filters(FilterSet::new().with(LoggingFilter::default())));
    server.register_service(math_key(), math_service());
    let port = server.start(0).await.unwrap();
    (server, port)
}

async fn connect(port: u16) -> (SplitSink<WsStream, Message>, SplitStream<WsStream>) {
    let (stream, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();
    stream.split()
}

async fn send(sink: &mut SplitSink<WsStream, Message>, message: RpcMessage) {
    let bytes = message.encode().unwrap();
    sink.send(Message::Binary(Bytes::from(bytes))).await.unwrap();
}

/// Next RPC frame, skipping WebSocket control messages.
async fn next_message(stream: &mut SplitStream<WsStream>) -> Option<RpcMessage> {
    let next = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Binary(bytes)) => return Some(RpcMessage::decode(&bytes).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    });
    next.await.expect("no frame within 5s")
}

async fn next_response(stream: &mut SplitStream<WsStream>) -> RpcResponse {
    match next_message(stream).await {
        Some(RpcMessage::Response(response)) => response,
        other => panic!("expected a response, got {other:?}"),
    }
}

fn decode_i64(response: RpcResponse) -> i64 {
    BitcodeCodec
        .deserialize(&response.into_result().unwrap())
        .unwrap()
}

#[tokio::test]
async fn test_lifecycle_states() {
    let server = RpcServer::new(RpcServerConfig::default());
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.port(), 0);

    let port = server.start(0).await.unwrap();
    assert_ne!(port, 0);
    assert_eq!(server.port(), port);
    assert!(server.is_running());

    assert!(matches!(server.start(0).await, Err(RpcError::AlreadyStarted)));

    server.shutdown().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.port(), 0);

    // Shutting down twice is harmless, and a stopped server can start again.
    server.shutdown().await;
    let port = server.start(0).await.unwrap();
    assert_ne!(port, 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_request_round_trip() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    send(&mut sink, RpcMessage::Request(request(&math_key(), "add", (2i64, 40i64), 7))).await;
    let response = next_response(&mut stream).await;
    assert_eq!(response.correlation_id, 7);
    assert_eq!(decode_i64(response), 42);

    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    send(&mut sink, RpcMessage::Ping(9)).await;
    assert!(matches!(next_message(&mut stream).await, Some(RpcMessage::Pong(9))));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_service_and_method_are_classified() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    let v2 = ServiceKey::new("Math", "2.0.0");
    send(&mut sink, RpcMessage::Request(request(&v2, "add", (1i64, 1i64), 1))).await;
    let response = next_response(&mut stream).await;
    assert_eq!(response.status, RpcResultStatus::ServiceNotFound);
    assert_eq!(response.error_message.as_deref(), Some("Math:2.0.0"));

    send(&mut sink, RpcMessage::Request(request(&math_key(), "sub", (1i64, 1i64), 2))).await;
    let response = next_response(&mut stream).await;
    assert_eq!(response.correlation_id, 2);
    assert_eq!(response.status, RpcResultStatus::MethodNotFound);

    send(&mut sink, RpcMessage::Request(request(&math_key(), "add", ("x".to_string(),), 3))).await;
    let response = next_response(&mut stream).await;
    assert_eq!(response.status, RpcResultStatus::ArgumentMismatch);

    server.shutdown().await;
}

#[tokio::test]
async fn test_responses_are_sent_as_requests_complete() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    send(
        &mut sink,
        RpcMessage::Request(request(&math_key(), "slow_add", (1i64, 1i64, 300u64), 1)),
    )
    .await;
    send(&mut sink, RpcMessage::Request(request(&math_key(), "add", (2i64, 2i64), 2))).await;

    let first = next_response(&mut stream).await;
    let second = next_response(&mut stream).await;
    assert_eq!(first.correlation_id, 2);
    assert_eq!(second.correlation_id, 1);
    assert_eq!(decode_i64(second), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_one_way_requests_get_no_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let server = RpcServer::new(RpcServerConfig::default());
    let key = ServiceKey::new("Events", "1.0.0");
    server.register_service(
        key.clone(),
        ServiceInvoker::builder(BitcodeCodec)
            .method("record", {
                let calls = calls.clone();
                move |(_name,): (String,)| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
            .build(),
    );
    let port = server.start(0).await.unwrap();
    let (mut sink, mut stream) = connect(port).await;

    let one_way = request(&key, "record", ("login".to_string(),), 1).with_metadata(CallMetadata {
        one_way: true,
        ..CallMetadata::default()
    });
    send(&mut sink, RpcMessage::from_request(one_way)).await;

    // The ping's pong must be the next frame: nothing was sent for the one-way call.
    send(&mut sink, RpcMessage::Ping(1)).await;
    assert!(matches!(next_message(&mut stream).await, Some(RpcMessage::Pong(1))));

    for _ in 0..50 {
        if calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_frames_do_not_close_the_connection() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    sink.send(Message::Binary(Bytes::from_static(&[1, 2, 3])))
        .await
        .unwrap();
    send(&mut sink, RpcMessage::Request(request(&math_key(), "add", (3i64, 4i64), 5))).await;
    assert_eq!(decode_i64(next_response(&mut stream).await), 7);

    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connections_are_closed() {
    let config = RpcServerConfig::default().idle_timeout(Duration::from_millis(200));
    let (server, port) = start_server(config).await;
    let (_sink, mut stream) = connect(port).await;

    assert!(next_message(&mut stream).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_busy_connections_outlive_the_idle_timeout() {
    let config = RpcServerConfig::default().idle_timeout(Duration::from_millis(200));
    let (server, port) = start_server(config).await;
    let (mut sink, mut stream) = connect(port).await;

    send(
        &mut sink,
        RpcMessage::Request(request(&math_key(), "slow_add", (2i64, 3i64, 500u64), 4)),
    )
    .await;

    let response = next_response(&mut stream).await;
    assert_eq!(response.correlation_id, 4);
    assert_eq!(decode_i64(response), 5);

    // The idle clock restarts once the connection has nothing in flight.
    assert!(next_message(&mut stream).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_requests_finish() {
    let (server, port) = start_server(RpcServerConfig::default()).await;
    let (mut sink, mut stream) = connect(port).await;

    send(
        &mut sink,
        RpcMessage::Request(request(&math_key(), "slow_add", (20i64, 22i64, 200u64), 11)),
    )
    .await;
    // Let the request reach the server before shutting down.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let shutdown = tokio::spawn({
        let server = server.clone();
        async move { server.shutdown().await }
    });

    let response = next_response(&mut stream).await;
    assert_eq!(response.correlation_id, 11);
    assert_eq!(decode_i64(response), 42);

    shutdown.await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(next_message(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_shutdown_grace_bounds_the_wait() {
    let config = RpcServerConfig::default().shutdown_grace(Duration::from_millis(100));
    let (server, port) = start_server(config).await;
    let (mut sink, mut stream) = connect(port).await;

    send(
        &mut sink,
        RpcMessage::Request(request(&math_key(), "slow_add", (1i64, 1i64, 10_000u64), 1)),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), server.shutdown())
        .await
        .expect("shutdown waited past its grace period");
    assert!(next_message(&mut stream).await.is_none());
}
