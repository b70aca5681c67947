//! The `InitReq`/`InitRes` handshake (§4.6, §6) that must complete before any
//! call frame may be exchanged.

use tokio::io::{AsyncRead, AsyncWrite};

use super::{read_frame, write_frame};
use crate::config::{PeerConfig, RESERVED_MESSAGE_ID};
use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::InitPayload;

/// Initiator side: sends `InitReq` and waits for `InitRes`. Returns the
/// acceptor's advertised init payload.
pub async fn initiate<S>(stream: &mut S, config: &PeerConfig, local_host_port: &str) -> Result<InitPayload>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outgoing = InitPayload::new(crate::config::CURRENT_PROTOCOL_VERSION, local_host_port, &config.process_name);
    let frame = Frame::new(RESERVED_MESSAGE_ID, FrameType::InitReq, outgoing.encode()?);
    write_frame(stream, &frame, config.max_body_size).await?;

    let response = read_frame(stream, config.max_body_size).await?;
    if response.frame_type != FrameType::InitRes {
        return Err(Error::Protocol(format!("expected InitRes, got {:?}", response.frame_type)));
    }
    negotiate(&response)
}

/// Acceptor side: waits for `InitReq` and replies with `InitRes`. Returns the
/// initiator's advertised init payload.
pub async fn accept<S>(stream: &mut S, config: &PeerConfig, local_host_port: &str) -> Result<InitPayload>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_frame(stream, config.max_body_size).await?;
    if request.frame_type != FrameType::InitReq {
        return Err(Error::Protocol(format!("expected InitReq, got {:?}", request.frame_type)));
    }
    let remote = negotiate(&request)?;

    let outgoing = InitPayload::new(crate::config::CURRENT_PROTOCOL_VERSION, local_host_port, &config.process_name);
    let frame = Frame::new(RESERVED_MESSAGE_ID, FrameType::InitRes, outgoing.encode()?);
    write_frame(stream, &frame, config.max_body_size).await?;
    Ok(remote)
}

fn negotiate(frame: &Frame) -> Result<InitPayload> {
    let payload = InitPayload::decode(&frame.payload)?;
    payload.validate()?;
    if payload.version != crate::config::CURRENT_PROTOCOL_VERSION {
        return Err(Error::VersionMismatch { expected: crate::config::CURRENT_PROTOCOL_VERSION, got: payload.version });
    }
    Ok(payload)
}
