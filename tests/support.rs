//! Shared harness for the integration tests: a couple of reusable [`Handler`]
//! impls and a helper that wires up a listening server `Peer` and a dialed
//! client `Connection` against it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tchannel_rpc::{Connection, Handler, HandlerResponse, Peer, PeerConfig, Result};

/// Answers every call by returning its own head/body unchanged.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn call(&self, _service: &str, _operation: Vec<u8>, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse> {
        Ok(HandlerResponse::ok(head, body))
    }
}

/// Answers immediately for every operation except `"slow"`, which it delays
/// by `delay` before answering -- used to exercise multiplex independence
/// (scenario E) and deadline cancellation (property 7).
pub struct DelayedHandler {
    pub delay: Duration,
}

#[async_trait]
impl Handler for DelayedHandler {
    async fn call(&self, _service: &str, operation: Vec<u8>, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse> {
        if operation == b"slow" {
            tokio::time::sleep(self.delay).await;
        }
        Ok(HandlerResponse::ok(head, body))
    }
}

/// Binds a server `Peer` serving `handler`, spawns its accept loop, then
/// dials a client connection to it. Returns the dialed connection and the
/// server `Peer` (kept around so tests can reach its tracked connections,
/// e.g. to drive a graceful close from the server side).
pub async fn dial_pair(server_config: PeerConfig, client_config: PeerConfig, handler: Arc<dyn Handler>) -> (Arc<Connection>, Arc<Peer>) {
    let server = Peer::listen("127.0.0.1:0", server_config, handler).await.unwrap();
    let addr = server.local_addr().unwrap();
    let serve_handle = server.clone();
    tokio::spawn(async move {
        let _ = serve_handle.serve().await;
    });

    let client = Peer::listen_dial_only("127.0.0.1:0", client_config).await.unwrap();
    let conn = client.dial(&addr.to_string()).await.unwrap();
    (conn, server)
}

/// [`dial_pair`] with default configs on both sides.
pub async fn dial_pair_default(handler: Arc<dyn Handler>) -> (Arc<Connection>, Arc<Peer>) {
    dial_pair(PeerConfig::new("server"), PeerConfig::new("client"), handler).await
}
