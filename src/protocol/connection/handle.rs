//! The per-socket [`Connection`] handle: ties the state machine, both call
//! registries, and the id allocator to the reader/writer tasks spawned once
//! the handshake completes.

use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use super::state::{ConnectionState, ConnectionStateCell};
use super::{handshake, reader_loop, writer_loop};
use crate::config::PeerConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::protocol::call::OutboundCall;
use crate::protocol::checksum::ChecksumType;
use crate::protocol::frame::Frame;
use crate::protocol::message::call::TRACING_SIZE;
use crate::protocol::message::InitPayload;
use crate::protocol::registry::{CallRegistry, IdAllocator};

/// Which side of the Init handshake this connection performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// This process dialed out and sent the `InitReq`.
    Initiator,
    /// This process accepted the socket and waited for the peer's `InitReq`.
    Acceptor,
}

/// One multiplexed connection: the negotiated state, both call registries,
/// the outbound id allocator, and a handle to the writer loop's queue.
/// Calls placed through the same `Connection` share one socket; cloning is
/// cheap since callers hold it behind an `Arc`.
pub struct Connection {
    state: Arc<ConnectionStateCell>,
    inbound_registry: Arc<CallRegistry>,
    outbound_registry: Arc<CallRegistry>,
    id_allocator: IdAllocator,
    config: Arc<PeerConfig>,
    write_tx: mpsc::Sender<Frame>,
    remote: InitPayload,
}

impl Connection {
    async fn establish<S>(
        mut stream: S,
        config: Arc<PeerConfig>,
        handler: Arc<dyn Handler>,
        local_host_port: &str,
        role: Role,
    ) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let remote = match role {
            Role::Initiator => handshake::initiate(&mut stream, &config, local_host_port).await?,
            Role::Acceptor => handshake::accept(&mut stream, &config, local_host_port).await?,
        };

        let state = Arc::new(ConnectionStateCell::new(ConnectionState::Active));
        let inbound_registry = Arc::new(CallRegistry::new());
        let outbound_registry = Arc::new(CallRegistry::new());
        let (write_tx, write_rx) = mpsc::channel(config.write_queue_depth);

        let (read_half, write_half) = split(stream);
        tokio::spawn(reader_loop::run(
            read_half,
            state.clone(),
            inbound_registry.clone(),
            outbound_registry.clone(),
            config.clone(),
            handler,
            write_tx.clone(),
        ));
        tokio::spawn(writer_loop::run(write_half, write_rx, state.clone(), config.max_body_size));

        Ok(Arc::new(Self {
            state,
            inbound_registry,
            outbound_registry,
            id_allocator: IdAllocator::new(config.max_id),
            config,
            write_tx,
            remote,
        }))
    }

    /// Dials out over an already-connected socket: sends `InitReq`, waits for
    /// `InitRes`, then spawns the reader and writer loops.
    pub async fn connect<S>(
        stream: S,
        config: Arc<PeerConfig>,
        handler: Arc<dyn Handler>,
        local_host_port: &str,
    ) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::establish(stream, config, handler, local_host_port, Role::Initiator).await
    }

    /// Accepts an already-connected socket: waits for the peer's `InitReq`,
    /// replies with `InitRes`, then spawns the reader and writer loops.
    pub async fn accept<S>(
        stream: S,
        config: Arc<PeerConfig>,
        handler: Arc<dyn Handler>,
        local_host_port: &str,
    ) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::establish(stream, config, handler, local_host_port, Role::Acceptor).await
    }

    /// The peer's advertised `InitReq`/`InitRes` payload (process name, version).
    pub fn remote(&self) -> &InitPayload {
        &self.remote
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Allocates a fresh outbound message id, registers it with the outbound
    /// registry, and returns a writer for its request plus the receiver that
    /// will collect the matching `CallRes`/`CallResCont`/`Error` frames.
    ///
    /// Fails with [`Error::Declined`] if this connection is no longer
    /// `Active` (draining or closed).
    pub fn start_call(
        &self,
        service: impl Into<String>,
        ttl_ms: u32,
        tracing: [u8; TRACING_SIZE],
        headers: Vec<(String, String)>,
        checksum_type: ChecksumType,
    ) -> Result<(OutboundCall, mpsc::Receiver<Frame>)> {
        if self.state.get() != ConnectionState::Active {
            return Err(Error::Declined);
        }
        let id = self.id_allocator.next_id();
        let rx = self.outbound_registry.register(id, self.config.call_queue_depth)?;
        let call =
            OutboundCall::new(id, service, ttl_ms, tracing, headers, checksum_type, self.config.max_chunk_bytes());
        Ok((call, rx))
    }

    /// Queues frames for the writer loop to serialize onto the socket.
    pub async fn send_frames(&self, frames: Vec<Frame>) -> Result<()> {
        for frame in frames {
            self.write_tx.send(frame).await.map_err(|_| Error::Cancelled)?;
        }
        Ok(())
    }

    /// Non-blocking form of [`Connection::send_frames`] (property 9): fails
    /// with [`Error::SendBufferFull`] as soon as the write queue is saturated,
    /// rather than waiting for room. Frames already queued before the failing
    /// one are not rolled back — callers that need all-or-nothing delivery
    /// should treat a `SendBufferFull` mid-sequence as fatal to that call.
    pub fn try_send_frames(&self, frames: Vec<Frame>) -> Result<()> {
        for frame in frames {
            match self.write_tx.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => return Err(Error::SendBufferFull),
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(Error::Cancelled),
            }
        }
        Ok(())
    }

    /// Deregisters an outbound call once its response is complete or it has
    /// been abandoned.
    pub fn forget_outbound(&self, id: u32) {
        self.outbound_registry.remove(id);
    }

    /// Number of inbound calls currently being served.
    pub fn inflight_inbound(&self) -> usize {
        self.inbound_registry.len()
    }

    /// Begins a graceful shutdown (§4.6, property 8): no new outbound call may
    /// be started through [`Connection::start_call`], and the reader loop
    /// rejects new inbound `CallReq`s with a `Declined` error as soon as it
    /// observes the state leave `Active`. A background task advances the
    /// state to `InboundClosed` once every inbound call has finished, then to
    /// `Closed` once every outbound call has too; calls already in flight in
    /// either direction are allowed to complete.
    pub fn start_close(&self) -> Result<()> {
        self.state.transition(ConnectionState::Active, ConnectionState::StartClose)?;
        let state = self.state.clone();
        let inbound_registry = self.inbound_registry.clone();
        let outbound_registry = self.outbound_registry.clone();
        tokio::spawn(async move {
            while inbound_registry.len() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            state.force(ConnectionState::InboundClosed);
            while outbound_registry.len() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            state.force(ConnectionState::Closed);
        });
        Ok(())
    }
}
