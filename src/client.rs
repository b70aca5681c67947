//! The caller-facing API: a whole-message `call()` for the common case, and a
//! streaming form for callers that want to produce or consume arg2/arg3
//! incrementally instead of buffering the whole argument in memory.
//!
//! Grounded on the outbound half of the teacher's xid-keyed RPC dispatch: one
//! correlation id per in-flight request, a channel the reader loop feeds, and
//! a deadline racing that channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::call::{OutboundCall, OutboundResponse};
use crate::protocol::checksum::ChecksumType;
use crate::protocol::connection::Connection;
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::call::TRACING_SIZE;
use crate::protocol::message::{CallContHeader, CallResHeader, ErrorPayload, ResponseCode};

/// Checksum type a plain [`call`] negotiates when the caller has no reason to
/// pick a specific one.
pub const DEFAULT_CHECKSUM_TYPE: ChecksumType = ChecksumType::Crc32;

/// The result of a completed call: whether the handler reported success, its
/// response headers, and its two response arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub ok: bool,
    pub headers: Vec<(String, String)>,
    pub arg2: Vec<u8>,
    pub arg3: Vec<u8>,
}

/// Sends a whole request in one call and awaits the whole response, failing
/// with [`Error::Timeout`] if `deadline` elapses first. `operation` is arg1;
/// `arg2`/`arg3` are sent as single chunks regardless of size (the fragment
/// writer splits them if they exceed the connection's chunk budget).
pub async fn call(
    conn: &Connection,
    service: impl Into<String>,
    operation: &[u8],
    arg2: &[u8],
    arg3: &[u8],
    deadline: Duration,
) -> Result<CallOutcome> {
    call_with(conn, service, operation, arg2, arg3, deadline, DEFAULT_CHECKSUM_TYPE, Vec::new()).await
}

/// Like [`call`], but with explicit control over the request's checksum type
/// and transport headers.
pub async fn call_with(
    conn: &Connection,
    service: impl Into<String>,
    operation: &[u8],
    arg2: &[u8],
    arg3: &[u8],
    deadline: Duration,
    checksum_type: ChecksumType,
    headers: Vec<(String, String)>,
) -> Result<CallOutcome> {
    let ttl_ms = deadline.as_millis().min(u32::MAX as u128) as u32;
    let (mut request, rx) = conn.start_call(service, ttl_ms, [0u8; TRACING_SIZE], headers, checksum_type)?;
    let id = request_id(&request);

    let send = async {
        let mut frames = request.write_arg1(operation)?;
        frames.extend(request.end_arg1()?);
        frames.extend(request.write_arg2(arg2)?);
        frames.extend(request.end_arg2()?);
        frames.extend(request.write_arg3(arg3)?);
        frames.extend(request.finish()?);
        conn.send_frames(frames).await
    };

    let outcome = async {
        send.await?;
        await_response(rx).await
    };

    match timeout(deadline, outcome).await {
        Ok(result) => {
            conn.forget_outbound(id);
            result
        }
        Err(_) => {
            conn.forget_outbound(id);
            Err(Error::Timeout)
        }
    }
}

/// A request whose three arguments are written incrementally, for callers
/// streaming a large arg2/arg3 without buffering it whole. Every write is
/// flushed straight to the connection's writer queue.
pub struct CallStream<'a> {
    conn: &'a Connection,
    request: OutboundCall,
    rx: mpsc::Receiver<Frame>,
    id: u32,
}

impl<'a> CallStream<'a> {
    pub fn begin(
        conn: &'a Connection,
        service: impl Into<String>,
        ttl_ms: u32,
        checksum_type: ChecksumType,
        headers: Vec<(String, String)>,
    ) -> Result<Self> {
        let (request, rx) = conn.start_call(service, ttl_ms, [0u8; TRACING_SIZE], headers, checksum_type)?;
        let id = request_id(&request);
        Ok(Self { conn, request, rx, id })
    }

    pub async fn write_arg1(&mut self, bytes: &[u8]) -> Result<()> {
        let frames = self.request.write_arg1(bytes)?;
        self.conn.send_frames(frames).await
    }

    pub async fn end_arg1(&mut self) -> Result<()> {
        let frames = self.request.end_arg1()?;
        self.conn.send_frames(frames).await
    }

    pub async fn write_arg2(&mut self, bytes: &[u8]) -> Result<()> {
        let frames = self.request.write_arg2(bytes)?;
        self.conn.send_frames(frames).await
    }

    pub async fn end_arg2(&mut self) -> Result<()> {
        let frames = self.request.end_arg2()?;
        self.conn.send_frames(frames).await
    }

    pub async fn write_arg3(&mut self, bytes: &[u8]) -> Result<()> {
        let frames = self.request.write_arg3(bytes)?;
        self.conn.send_frames(frames).await
    }

    /// Ends arg3, flushes the terminal fragment, and awaits the response
    /// (subject to `deadline`). Consumes the stream either way.
    pub async fn finish(self, deadline: Duration) -> Result<CallOutcome> {
        let CallStream { conn, mut request, rx, id } = self;
        let frames = request.finish()?;
        let outcome = async {
            conn.send_frames(frames).await?;
            await_response(rx).await
        };
        match timeout(deadline, outcome).await {
            Ok(result) => {
                conn.forget_outbound(id);
                result
            }
            Err(_) => {
                conn.forget_outbound(id);
                Err(Error::Timeout)
            }
        }
    }
}

fn request_id(call: &OutboundCall) -> u32 {
    call.id()
}

async fn await_response(mut rx: mpsc::Receiver<Frame>) -> Result<CallOutcome> {
    let mut response = OutboundResponse::new();
    loop {
        let frame = rx.recv().await.ok_or(Error::Cancelled)?;
        match frame.frame_type {
            FrameType::CallRes => {
                let mut cursor: &[u8] = &frame.payload;
                let header = CallResHeader::decode(&mut cursor)?;
                let size = header.checksum_type.value_size();
                let (checksum_value, chunk_stream) = split_payload(cursor, size)?;
                response.feed_first(header, checksum_value, chunk_stream)?;
            }
            FrameType::CallResCont => {
                let mut cursor: &[u8] = &frame.payload;
                let header = CallContHeader::decode(&mut cursor)?;
                let size = header.checksum_type.value_size();
                let (checksum_value, chunk_stream) = split_payload(cursor, size)?;
                response.feed_cont(header, checksum_value, chunk_stream)?;
            }
            FrameType::Error => {
                let payload = ErrorPayload::decode(&frame.payload)?;
                return Err(Error::UnexpectedError(format!("{}: {}", payload.code, payload.message)));
            }
            other => return Err(Error::Protocol(format!("unexpected frame type {other:?} on outbound call"))),
        }
        if response.is_arg3_ready() {
            break;
        }
    }
    let ok = response.code() == Some(ResponseCode::Ok);
    let headers = response.headers().to_vec();
    let arg2 = response.take_arg2()?;
    let arg3 = response.take_arg3()?;
    Ok(CallOutcome { ok, headers, arg2, arg3 })
}

fn split_payload(cursor: &[u8], checksum_size: usize) -> Result<(&[u8], &[u8])> {
    if cursor.len() < checksum_size {
        return Err(Error::Protocol("truncated checksum value".to_string()));
    }
    Ok((&cursor[..checksum_size], &cursor[checksum_size..]))
}
