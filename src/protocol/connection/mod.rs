//! Connection plumbing (§4.6, §4.8): the state machine, the Init handshake,
//! and the reader/writer loops that drive one TCP socket's worth of
//! multiplexed calls.

pub mod handle;
pub mod handshake;
pub mod reader_loop;
pub mod state;
pub mod writer_loop;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::FRAME_HEADER_SIZE;
use crate::error::{Error, Result};
use crate::protocol::frame::Frame;

/// Reads exactly one frame (header, then its declared payload) off `reader`.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_body_size: usize) -> Result<Frame> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let (frame_type, size, id) = Frame::decode_header(&header)?;
    if size as usize > max_body_size {
        return Err(Error::Protocol(format!("frame of {size} bytes exceeds max body size {max_body_size}")));
    }
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Frame::from_parts(frame_type, id, payload))
}

/// Encodes and writes one frame to `writer`.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
    max_body_size: usize,
) -> Result<()> {
    let encoded = frame.encode(max_body_size)?;
    writer.write_all(&encoded).await?;
    Ok(())
}

pub use handle::Connection;
pub use state::{ConnectionState, ConnectionStateCell};
