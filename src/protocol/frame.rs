//! Frame definition and wire codec.
//!
//! A frame is the smallest unit transmitted on the socket: a fixed 16-byte
//! big-endian header followed by a variable-length payload.
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             size              |     type      |   reserved    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              id                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            reserved                           |
//! |                                                                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            payload...                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::config::{FRAME_HEADER_SIZE, RESERVED_MESSAGE_ID};
use crate::error::{Error, Result};

/// Frame type, identifying the purpose of the payload that follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    /// Initial handshake request, sent by the connection initiator.
    InitReq = 0x01,
    /// Initial handshake response, sent by the connection acceptor.
    InitRes = 0x02,
    /// First fragment of an outbound call.
    CallReq = 0x03,
    /// Continuation fragment of an outbound call.
    CallReqCont = 0x04,
    /// First fragment of a call response.
    CallRes = 0x13,
    /// Continuation fragment of a call response.
    CallResCont = 0x14,
    /// Connection- or call-fatal error.
    Error = 0xFF,
}

impl FrameType {
    fn from_u8(v: u8) -> Option<Self> {
        <FrameType as FromPrimitive>::from_u8(v)
    }
}

/// A decoded frame: header fields plus an owned payload buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message id this frame belongs to. `0` is reserved for connection-fatal errors.
    pub id: u32,
    /// The frame's type.
    pub frame_type: FrameType,
    /// Frame payload. Length must fit in a `u16` and not exceed the negotiated
    /// `MaxBodySize`.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a new frame. Does not validate `payload.len()` against `MaxBodySize`;
    /// that check happens in [`Frame::encode`], where the limit is known.
    pub fn new(id: u32, frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { id, frame_type, payload }
    }

    /// Total size of this frame once encoded.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encodes the frame into a fresh buffer.
    ///
    /// Fails with [`Error::EncodeError`] if the payload exceeds `max_body_size` or
    /// does not fit in the wire `size: u16` field.
    pub fn encode(&self, max_body_size: usize) -> Result<Vec<u8>> {
        if self.payload.len() > max_body_size || self.payload.len() > u16::MAX as usize {
            return Err(Error::EncodeError(format!(
                "payload of {} bytes exceeds max body size {}",
                self.payload.len(),
                max_body_size
            )));
        }
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.write_u16::<BigEndian>(self.payload.len() as u16).unwrap();
        buf.write_u8(self.frame_type as u8).unwrap();
        buf.write_u8(0).unwrap(); // reserved
        buf.write_u32::<BigEndian>(self.id).unwrap();
        buf.write_u64::<BigEndian>(0).unwrap(); // reserved
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame header from exactly [`FRAME_HEADER_SIZE`] bytes.
    ///
    /// Returns the frame type and declared payload size; the caller is responsible
    /// for then reading exactly that many payload bytes and calling
    /// [`Frame::from_parts`].
    pub fn decode_header(header: &[u8]) -> Result<(FrameType, u16, u32)> {
        if header.len() != FRAME_HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "frame header must be {FRAME_HEADER_SIZE} bytes, got {}",
                header.len()
            )));
        }
        let mut cursor = header;
        let size = cursor.read_u16::<BigEndian>()?;
        let raw_type = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let id = cursor.read_u32::<BigEndian>()?;
        let frame_type = FrameType::from_u8(raw_type)
            .ok_or_else(|| Error::Protocol(format!("unknown frame type {raw_type:#04x}")))?;
        Ok((frame_type, size, id))
    }

    /// Assembles a decoded frame from an already-validated header and the payload
    /// bytes read according to its declared size.
    pub fn from_parts(frame_type: FrameType, id: u32, payload: Vec<u8>) -> Self {
        Self { id, frame_type, payload }
    }

    /// Decodes a complete frame (header + payload) from a contiguous buffer.
    /// Fails on truncation or invalid header fields. Intended for tests and
    /// in-memory round-trip checks; the connection reader loop instead streams the
    /// header and payload separately to avoid buffering unbounded input.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(Error::Protocol("truncated frame header".into()));
        }
        let (frame_type, size, id) = Self::decode_header(&buf[..FRAME_HEADER_SIZE])?;
        let total = FRAME_HEADER_SIZE + size as usize;
        if buf.len() < total {
            return Err(Error::Protocol("truncated frame payload".into()));
        }
        let payload = buf[FRAME_HEADER_SIZE..total].to_vec();
        Ok((Self::from_parts(frame_type, id, payload), total))
    }

    /// True if this frame is a connection-fatal error (`Error` frame with id 0).
    pub fn is_connection_fatal_error(&self) -> bool {
        self.frame_type == FrameType::Error && self.id == RESERVED_MESSAGE_ID
    }
}
