//! `Peer`: one TCP endpoint that both accepts inbound connections and dials
//! outbound ones, sharing a single [`Handler`] and [`PeerConfig`] across every
//! connection it owns.
//!
//! This module implements the "out of scope" collaborators the wire protocol
//! itself depends on: TCP listen/accept and outbound dial. The protocol
//! machinery (handshake, state machine, reader/writer loops) lives in
//! [`crate::protocol::connection`]; this module is the glue that creates
//! sockets and hands them to it.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};
use tracing_attributes::instrument;

use crate::config::PeerConfig;
use crate::error::{Error, Result};
use crate::handler::{DeclineAll, Handler};
use crate::protocol::connection::Connection;

/// A process endpoint: the listener for inbound calls, plus the shared state
/// (config, handler, and the set of live connections in either direction)
/// every `Connection` it creates is built from.
pub struct Peer {
    listener: TcpListener,
    config: Arc<PeerConfig>,
    handler: Arc<dyn Handler>,
    connections: Mutex<Vec<Arc<Connection>>>,
}

impl Peer {
    /// Binds a listener at `addr` (e.g. `"127.0.0.1:0"`) that serves every
    /// inbound call with `handler`.
    pub async fn listen(addr: &str, config: PeerConfig, handler: Arc<dyn Handler>) -> io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "peer listening");
        Ok(Arc::new(Self { listener, config: Arc::new(config), handler, connections: Mutex::new(Vec::new()) }))
    }

    /// Binds a listener that declines every inbound call; for a peer that
    /// only ever dials out.
    pub async fn listen_dial_only(addr: &str, config: PeerConfig) -> io::Result<Arc<Self>> {
        Self::listen(addr, config, Arc::new(DeclineAll)).await
    }

    /// The address actually bound, useful after binding to port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Every connection still tracked by this peer, inbound and outbound.
    /// Connections that have reached `Closed` are not removed automatically;
    /// callers that care should check [`Connection::state`].
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().unwrap().clone()
    }

    /// Accepts connections until the listener itself fails, performing the
    /// handshake for each and registering it in the connection set. Spawns a
    /// task per socket so a slow handshake never blocks other accepts.
    #[instrument(skip_all)]
    pub async fn serve(self: &Arc<Self>) -> io::Result<()> {
        loop {
            let (socket, peer_addr) = self.listener.accept().await?;
            let _ = socket.set_nodelay(true);
            let this = self.clone();
            tokio::spawn(async move {
                match this.accept_connection(socket).await {
                    Ok(conn) => debug!(peer = %peer_addr, remote = ?conn.remote(), "inbound connection established"),
                    Err(e) => error!(peer = %peer_addr, error = %e, "inbound handshake failed"),
                }
            });
        }
    }

    /// Drives one accepted socket through the handshake. Returns `anyhow::Error`
    /// like the teacher's `process_socket`: this is internal connection-plumbing,
    /// not part of the crate's structured `crate::error::Error` surface.
    async fn accept_connection(&self, socket: TcpStream) -> anyhow::Result<Arc<Connection>> {
        let local_host_port = self.listener.local_addr()?.to_string();
        let conn = Connection::accept(socket, self.config.clone(), self.handler.clone(), &local_host_port).await?;
        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }

    /// Dials out to `addr`, performs the handshake as initiator, and registers
    /// the resulting connection in this peer's connection set.
    #[instrument(skip(self))]
    pub async fn dial(&self, addr: &str) -> Result<Arc<Connection>> {
        let socket = TcpStream::connect(addr).await.map_err(|e| Error::Io(e.to_string()))?;
        let _ = socket.set_nodelay(true);
        let local_host_port =
            socket.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "0.0.0.0:0".to_string());
        let conn = Connection::connect(socket, self.config.clone(), self.handler.clone(), &local_host_port).await?;
        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResponse;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn call(&self, _service: &str, _operation: Vec<u8>, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse> {
            Ok(HandlerResponse::ok(head, body))
        }
    }

    #[tokio::test]
    async fn listen_binds_and_reports_local_addr() {
        let peer = Peer::listen("127.0.0.1:0", PeerConfig::new("test-peer"), Arc::new(Echo)).await.unwrap();
        assert!(peer.local_addr().unwrap().port() > 0);
        assert!(peer.connections().is_empty());
    }

    #[tokio::test]
    async fn dial_and_accept_establish_a_connection() {
        let server = Peer::listen("127.0.0.1:0", PeerConfig::new("server"), Arc::new(Echo)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = {
            let server = server.clone();
            tokio::spawn(async move {
                let _ = server.serve().await;
            })
        };

        let client = Peer::listen_dial_only("127.0.0.1:0", PeerConfig::new("client")).await.unwrap();
        let conn = client.dial(&addr.to_string()).await.unwrap();
        assert_eq!(conn.remote().process_name(), Some("server"));
        assert_eq!(conn.state(), crate::protocol::connection::ConnectionState::Active);

        server_task.abort();
    }
}
