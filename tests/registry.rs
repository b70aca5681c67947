//! Registry-level properties: multiplex independence (5) and id uniqueness (6).

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{dial_pair, EchoHandler};
use tchannel_rpc::protocol::checksum::ChecksumType;
use tchannel_rpc::{call, Error, PeerConfig};

// Property 5: many calls multiplexed over one connection never cross wires --
// each call's response matches the request that produced it, regardless of
// interleaving.
#[tokio::test]
async fn property_5_concurrent_calls_do_not_cross_wires() {
    let (conn, _server) = dial_pair(PeerConfig::new("server"), PeerConfig::new("client"), Arc::new(EchoHandler)).await;
    let conn = Arc::new(conn);

    let mut handles = Vec::new();
    for i in 0..12u32 {
        let conn = conn.clone();
        handles.push(tokio::spawn(async move {
            let head = format!("head-{i}").into_bytes();
            let body = format!("body-{i}").repeat(50).into_bytes();
            let outcome = call(&conn, "svc", b"op", &head, &body, Duration::from_secs(5)).await.unwrap();
            (i, head, body, outcome)
        }));
    }

    for handle in handles {
        let (i, head, body, outcome) = handle.await.unwrap();
        assert!(outcome.ok, "call {i} failed");
        assert_eq!(outcome.arg2, head, "call {i} got a mismatched head");
        assert_eq!(outcome.arg3, body, "call {i} got a mismatched body");
    }
}

// Property 6: outbound message ids are unique while live and reused only
// after the owning call releases its id.
#[tokio::test]
async fn property_6_ids_are_unique_until_released_then_reused() {
    let client_config = PeerConfig::new("client").with_max_id(3);
    let (conn, _server) = dial_pair(PeerConfig::new("server"), client_config, Arc::new(EchoHandler)).await;

    let (call1, _rx1) = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32).unwrap();
    let (call2, _rx2) = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32).unwrap();
    let (call3, _rx3) = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32).unwrap();

    assert_eq!(call1.id(), 1);
    assert_eq!(call2.id(), 2);
    assert_eq!(call3.id(), 3);

    // The allocator wraps back to 1, but id 1 is still live, so the fourth
    // allocation collides in the registry instead of silently succeeding.
    let collision = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32);
    assert_eq!(collision.unwrap_err(), Error::DuplicateRequest);

    // Releasing id 1 frees it up for reuse.
    conn.forget_outbound(call1.id());
    let (call4, _rx4) = conn.start_call("svc", 5_000, [0u8; 25], Vec::new(), ChecksumType::Crc32).unwrap();
    assert_eq!(call4.id(), 1);

    conn.forget_outbound(call2.id());
    conn.forget_outbound(call3.id());
    conn.forget_outbound(call4.id());
}
