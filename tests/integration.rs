//! End-to-end scenarios (A-F) over a real TCP loopback connection.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{dial_pair, dial_pair_default, EchoHandler};
use tchannel_rpc::protocol::checksum::ChecksumType;
use tchannel_rpc::protocol::frame::FrameType;
use tchannel_rpc::protocol::message::ErrorPayload;
use tchannel_rpc::{call, Error, Handler, HandlerRegistry, HandlerResponse, OperationHandler, PeerConfig};

// Scenario A: a plain echo round trip.
#[tokio::test]
async fn scenario_a_echo_round_trip() {
    let (conn, _server) = dial_pair_default(Arc::new(EchoHandler)).await;

    let outcome = call(&conn, "svc", b"upper", b"head-bytes", b"body-bytes", Duration::from_secs(2)).await.unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.arg2, b"head-bytes");
    assert_eq!(outcome.arg3, b"body-bytes");
}

// Scenario B: no handler registered for the requested operation produces a
// BadRequest-flavored transport error, not a successful application response.
#[tokio::test]
async fn scenario_b_missing_handler_is_bad_request() {
    struct Known;

    #[async_trait::async_trait]
    impl OperationHandler for Known {
        async fn call(&self, head: Vec<u8>, body: Vec<u8>) -> tchannel_rpc::Result<HandlerResponse> {
            Ok(HandlerResponse::ok(head, body))
        }
    }

    let registry = HandlerRegistry::new();
    registry.register("svc", "known", Arc::new(Known));
    let (conn, _server) = dial_pair_default(Arc::new(registry)).await;

    let err = call(&conn, "svc", b"missing", b"", b"", Duration::from_secs(2)).await.unwrap_err();

    match err {
        Error::UnexpectedError(msg) => {
            assert!(msg.contains("bad request"), "unexpected error message: {msg}");
            assert!(msg.contains("no handler"), "unexpected error message: {msg}");
        }
        other => panic!("expected UnexpectedError wrapping BadRequest, got {other:?}"),
    }
}

// Scenario C: a payload much larger than one frame forces fragmentation and
// reassembly on both the request and response sides.
#[tokio::test]
async fn scenario_c_large_payload_round_trips_across_fragments() {
    struct LengthEcho;

    #[async_trait::async_trait]
    impl Handler for LengthEcho {
        async fn call(&self, _service: &str, _operation: Vec<u8>, _head: Vec<u8>, body: Vec<u8>) -> tchannel_rpc::Result<HandlerResponse> {
            Ok(HandlerResponse::ok(body.len().to_string().into_bytes(), body))
        }
    }

    let server_config = PeerConfig::new("server").with_max_body_size(2048).with_call_queue_depth(512);
    let client_config = PeerConfig::new("client").with_max_body_size(2048).with_write_queue_depth(1024);
    let (conn, _server) = dial_pair(server_config, client_config, Arc::new(LengthEcho)).await;

    let body = vec![0xABu8; 200_000];
    let outcome = call(&conn, "svc", b"big", b"", &body, Duration::from_secs(10)).await.unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.arg2, b"200000");
    assert_eq!(outcome.arg3, body);
}

// Scenario D: a peer advertising an unsupported protocol version is rejected
// during the handshake and the socket is closed without an InitRes.
#[tokio::test]
async fn scenario_d_version_mismatch_closes_without_response() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use tchannel_rpc::protocol::frame::Frame;
    use tchannel_rpc::protocol::message::InitPayload;
    use tchannel_rpc::Peer;

    let server = Peer::listen("127.0.0.1:0", PeerConfig::new("server"), Arc::new(EchoHandler)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let serve_handle = server.clone();
    tokio::spawn(async move {
        let _ = serve_handle.serve().await;
    });

    let mut raw = TcpStream::connect(addr).await.unwrap();
    let bad_init = InitPayload::new(0x01, "0.0.0.0:0", "impostor");
    let frame = Frame::new(0, FrameType::InitReq, bad_init.encode().unwrap());
    raw.write_all(&frame.encode(tchannel_rpc::config::DEFAULT_MAX_BODY_SIZE).unwrap()).await.unwrap();

    let mut buf = [0u8; 1];
    let n = raw.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "server should close the socket instead of replying to a version mismatch");
}

// Scenario E: two concurrent calls on one connection complete independently;
// a slow handler for one operation never blocks a fast one on the other.
#[tokio::test]
async fn scenario_e_concurrent_calls_complete_out_of_order() {
    let (conn, _server) = dial_pair_default(Arc::new(support::DelayedHandler { delay: Duration::from_millis(150) })).await;
    let conn = Arc::new(conn);

    let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();

    let slow_conn = conn.clone();
    let slow_tx = order_tx.clone();
    let slow = tokio::spawn(async move {
        let outcome = call(&slow_conn, "svc", b"slow", b"", b"", Duration::from_secs(2)).await.unwrap();
        let _ = slow_tx.send("slow");
        outcome
    });

    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast_conn = conn.clone();
    let fast_tx = order_tx.clone();
    let fast = tokio::spawn(async move {
        let outcome = call(&fast_conn, "svc", b"fast", b"", b"", Duration::from_secs(2)).await.unwrap();
        let _ = fast_tx.send("fast");
        outcome
    });
    drop(order_tx);

    let (slow_outcome, fast_outcome) = tokio::join!(slow, fast);
    assert!(slow_outcome.unwrap().ok);
    assert!(fast_outcome.unwrap().ok);

    assert_eq!(order_rx.recv().await, Some("fast"));
    assert_eq!(order_rx.recv().await, Some("slow"));
}

// Scenario F: a single-bit flip in a continuation fragment's checksum aborts
// only that call; a concurrent, uncorrupted call on the same connection
// succeeds.
#[tokio::test]
async fn scenario_f_corrupted_fragment_isolated_to_one_call() {
    let server_config = PeerConfig::new("server").with_max_body_size(600).with_call_queue_depth(512);
    let client_config = PeerConfig::new("client").with_max_body_size(600).with_write_queue_depth(512);
    let (conn, _server) = dial_pair(server_config, client_config, Arc::new(EchoHandler)).await;

    let clean = {
        let conn = conn.clone();
        tokio::spawn(async move { call(&conn, "svc", b"op", b"clean-head", b"clean-body", Duration::from_secs(2)).await })
    };

    let (mut request, mut rx) = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32).unwrap();
    let big_arg3 = vec![0x42u8; 300];
    let mut frames = request.write_arg1(b"op").unwrap();
    frames.extend(request.end_arg1().unwrap());
    frames.extend(request.write_arg2(b"head").unwrap());
    frames.extend(request.end_arg2().unwrap());
    frames.extend(request.write_arg3(&big_arg3).unwrap());
    frames.extend(request.finish().unwrap());
    assert!(frames.len() >= 2, "test setup should force more than one fragment");
    // Corrupt the checksum value of the second fragment (a CallReqCont, whose
    // header is flags:u8 + checksum_type:u8, so the checksum value starts at
    // offset 2).
    frames[1].payload[2] ^= 0xFF;
    conn.send_frames(frames).await.unwrap();

    let response = rx.recv().await.unwrap();
    assert_eq!(response.frame_type, FrameType::Error);
    let payload = ErrorPayload::decode(&response.payload).unwrap();
    assert!(payload.message.contains("checksum"), "unexpected error message: {}", payload.message);

    let clean_outcome = clean.await.unwrap().unwrap();
    assert!(clean_outcome.ok);
    assert_eq!(clean_outcome.arg2, b"clean-head");
    assert_eq!(clean_outcome.arg3, b"clean-body");
}
