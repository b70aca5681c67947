//! Application-facing handler trait and the per-call server loop that drives it.
//!
//! A [`Handler`] answers every call a peer's connections receive, regardless of
//! which connection or which concurrent call it arrives on — the same shape
//! [`crate::peer::Peer`] uses for both `listen` and `dial` sides, since either
//! end of a TChannel connection may receive calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;
use tracing_attributes::instrument;

use crate::config::PeerConfig;
use crate::error::{Error, Result};
use crate::protocol::call::{InboundCall, InboundResponse};
use crate::protocol::checksum::ChecksumType;
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::call::{CallContHeader, TRACING_SIZE};
use crate::protocol::message::{CallReqHeader, ResponseCode};
use crate::protocol::registry::CallRegistry;

/// The result of serving one call: whether it succeeded at the application
/// level, and the two response arguments (head, body).
pub struct HandlerResponse {
    pub ok: bool,
    pub head: Vec<u8>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn ok(head: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self { ok: true, head: head.into(), body: body.into() }
    }

    pub fn application_error(message: impl Into<Vec<u8>>) -> Self {
        Self { ok: false, head: Vec::new(), body: message.into() }
    }
}

/// Answers calls for a single logical service. `operation`, `head`, and `body`
/// are arg1, arg2, and arg3 of the received request.
///
/// Returning `Err` produces a wire `Error` frame (a system-level failure);
/// returning `Ok(HandlerResponse { ok: false, .. })` produces a normal,
/// well-formed response with the application-level failure flag set.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, service: &str, operation: Vec<u8>, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse>;
}

/// A [`Handler`] that answers every call with `Declined`; the default when a
/// peer only dials out and never serves inbound calls.
pub struct DeclineAll;

#[async_trait]
impl Handler for DeclineAll {
    async fn call(&self, _service: &str, _operation: Vec<u8>, _head: Vec<u8>, _body: Vec<u8>) -> Result<HandlerResponse> {
        Err(Error::Declined)
    }
}

/// Answers exactly one `(service, operation)` pair, registered in a
/// [`HandlerRegistry`]. `operation` is arg1, decoded as UTF-8 to match against
/// the registration key; a non-UTF-8 operation can never match and falls
/// through to `BadRequest`.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    async fn call(&self, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse>;
}

/// A [`Handler`] that dispatches by `(service, operation)` to a registered
/// [`OperationHandler`], the shape `Peer::register` is built around. Safe to
/// register handlers into while connections are already being served: the
/// table is a plain mutexed map, the same idiom `protocol::registry::CallRegistry`
/// uses for its id table.
#[derive(Default)]
pub struct HandlerRegistry {
    table: Mutex<HashMap<(String, String), Arc<dyn OperationHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }

    /// Registers `handler` to answer calls for `service`/`operation`, replacing
    /// any handler previously registered for that pair.
    pub fn register(&self, service: impl Into<String>, operation: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.table.lock().unwrap().insert((service.into(), operation.into()), handler);
    }
}

#[async_trait]
impl Handler for HandlerRegistry {
    async fn call(&self, service: &str, operation: Vec<u8>, head: Vec<u8>, body: Vec<u8>) -> Result<HandlerResponse> {
        let op_name = String::from_utf8_lossy(&operation).into_owned();
        let handler = self.table.lock().unwrap().get(&(service.to_string(), op_name.clone())).cloned();
        match handler {
            Some(handler) => handler.call(head, body).await,
            None => Err(Error::BadRequest(format!("no handler registered for {service}/{op_name}"))),
        }
    }
}

/// Drains one inbound call's fragment channel to completion, invokes `handler`,
/// and writes the response frames to `write_tx`. Spawned once per `CallReq`.
#[instrument(skip_all, fields(call_id = id))]
pub async fn serve_call(
    id: u32,
    mut rx: mpsc::Receiver<Frame>,
    write_tx: mpsc::Sender<Frame>,
    handler: Arc<dyn Handler>,
    config: Arc<PeerConfig>,
    inbound_registry: Arc<CallRegistry>,
) {
    let result = serve_call_inner(id, &mut rx, &write_tx, handler.as_ref(), &config).await;
    if let Err(e) = result {
        debug!(call_id = id, error = %e, "call failed");
        if let Some(code) = e.wire_code() {
            if let Ok(payload) = crate::protocol::message::ErrorPayload::new(code, id, e.to_string()).encode() {
                let _ = write_tx.send(Frame::new(id, FrameType::Error, payload)).await;
            }
        }
    }
    inbound_registry.remove(id);
}

/// Reads the first frame of a call (always `CallReq`), feeds it to `call`, and
/// returns the TTL it declared. The deadline only becomes known once this
/// frame has arrived, so it bounds everything from here on rather than the
/// wait for this first frame itself.
async fn read_first_frame(rx: &mut mpsc::Receiver<Frame>, call: &mut InboundCall) -> Result<(u32, [u8; TRACING_SIZE])> {
    let frame = rx.recv().await.ok_or(Error::Cancelled)?;
    match frame.frame_type {
        FrameType::CallReq => {
            let mut cursor: &[u8] = &frame.payload;
            let header = CallReqHeader::decode(&mut cursor)?;
            let ttl_ms = header.ttl_ms;
            let tracing = header.tracing;
            let size = header.checksum_type.value_size();
            let (checksum_value, chunk_stream) = split_payload(cursor, size)?;
            call.feed_first(header, checksum_value, chunk_stream)?;
            Ok((ttl_ms, tracing))
        }
        other => Err(Error::Protocol(format!("expected CallReq as first frame, got {other:?}"))),
    }
}

async fn serve_call_inner(
    id: u32,
    rx: &mut mpsc::Receiver<Frame>,
    write_tx: &mpsc::Sender<Frame>,
    handler: &dyn Handler,
    config: &PeerConfig,
) -> Result<()> {
    let mut call = InboundCall::new();
    let (ttl_ms, tracing) = read_first_frame(rx, &mut call).await?;

    // The deadline (§5) bounds everything after the first frame: reading the
    // remaining fragments, running the handler, and writing the response. A
    // call whose deadline fires anywhere in that span is reported as a
    // timeout and its id is released by the caller regardless of outcome.
    let deadline = Duration::from_millis(u64::from(ttl_ms).max(1));
    match timeout(deadline, serve_call_body(id, call, tracing, rx, write_tx, handler, config)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}

async fn serve_call_body(
    id: u32,
    mut call: InboundCall,
    tracing: [u8; TRACING_SIZE],
    rx: &mut mpsc::Receiver<Frame>,
    write_tx: &mpsc::Sender<Frame>,
    handler: &dyn Handler,
    config: &PeerConfig,
) -> Result<()> {
    while !call.is_arg3_ready() {
        let frame = rx.recv().await.ok_or(Error::Cancelled)?;
        match frame.frame_type {
            FrameType::CallReqCont => {
                let mut cursor: &[u8] = &frame.payload;
                let header = CallContHeader::decode(&mut cursor)?;
                let size = header.checksum_type.value_size();
                let (checksum_value, chunk_stream) = split_payload(cursor, size)?;
                call.feed_cont(header, checksum_value, chunk_stream)?;
            }
            FrameType::Error => return Err(Error::Cancelled),
            other => return Err(Error::Protocol(format!("unexpected frame type {other:?} on inbound call"))),
        }
    }

    let service = call.service().to_string();
    let checksum_type = call.checksum_type().unwrap_or(ChecksumType::None);
    let arg1 = call.take_arg1()?;
    let arg2 = call.take_arg2()?;
    let arg3 = call.take_arg3()?;

    let response = match handler.call(&service, arg1, arg2, arg3).await {
        Ok(r) => r,
        Err(e) => {
            if let Some(code) = e.wire_code() {
                let payload = crate::protocol::message::ErrorPayload::new(code, id, e.to_string()).encode()?;
                let _ = write_tx.send(Frame::new(id, FrameType::Error, payload)).await;
                return Ok(());
            }
            return Err(e);
        }
    };

    let code = if response.ok { ResponseCode::Ok } else { ResponseCode::Error };
    let mut outbound =
        InboundResponse::new(id, code, tracing, Vec::new(), checksum_type, config.max_chunk_bytes())?;
    let mut frames = outbound.start()?;
    frames.extend(outbound.write_arg2(&response.head)?);
    frames.extend(outbound.end_arg2()?);
    frames.extend(outbound.write_arg3(&response.body)?);
    frames.extend(outbound.finish()?);
    for frame in frames {
        write_tx.send(frame).await.map_err(|_| Error::Cancelled)?;
    }
    Ok(())
}

fn split_payload(cursor: &[u8], checksum_size: usize) -> Result<(&[u8], &[u8])> {
    if cursor.len() < checksum_size {
        return Err(Error::Protocol("truncated checksum value".to_string()));
    }
    Ok((&cursor[..checksum_size], &cursor[checksum_size..]))
}
