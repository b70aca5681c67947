//! Outbound-direction call state machines (§4.5).
//!
//! `OutboundCall` is the write side of a request this peer initiates: arg1
//! (operation), arg2 (head), and arg3 (body) must be written in order, each
//! terminated explicitly before the next begins. `OutboundResponse` is the
//! read side of that same call's response: arg1 is conventionally empty on a
//! response and is consumed automatically, landing the caller directly at
//! arg2.

use crate::error::{Error, Result};
use crate::protocol::checksum::ChecksumType;
use crate::protocol::fragment::{EmittedFragment, FragmentReader, FragmentWriter};
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::call::{has_more_fragments, set_more_fragments, TRACING_SIZE};
use crate::protocol::message::{CallContHeader, CallReqHeader, CallResHeader, ResponseCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Arg1,
    Arg2,
    Arg3,
    Complete,
}

/// Writes a call request's three arguments, emitting `CallReq`/`CallReqCont`
/// frames as fragments fill.
pub struct OutboundCall {
    id: u32,
    writer: FragmentWriter,
    stage: WriteStage,
    first_frame_sent: bool,
    service: String,
    ttl_ms: u32,
    tracing: [u8; TRACING_SIZE],
    headers: Vec<(String, String)>,
}

impl OutboundCall {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        service: impl Into<String>,
        ttl_ms: u32,
        tracing: [u8; TRACING_SIZE],
        headers: Vec<(String, String)>,
        checksum_type: ChecksumType,
        max_chunk_bytes: usize,
    ) -> Self {
        Self {
            id,
            writer: FragmentWriter::new(checksum_type, max_chunk_bytes),
            stage: WriteStage::Arg1,
            first_frame_sent: false,
            service: service.into(),
            ttl_ms,
            tracing,
            headers,
        }
    }

    fn build_frame(&mut self, fragment: EmittedFragment) -> Result<Frame> {
        if !self.first_frame_sent {
            self.first_frame_sent = true;
            let header = CallReqHeader {
                flags: set_more_fragments(0, fragment.more_fragments),
                ttl_ms: self.ttl_ms,
                tracing: self.tracing,
                service: self.service.clone(),
                headers: self.headers.clone(),
                checksum_type: self.writer.checksum_type(),
            };
            let mut payload = header.encode()?;
            payload.extend_from_slice(&fragment.checksum_value);
            payload.extend_from_slice(&fragment.chunk_stream);
            Ok(Frame::new(self.id, FrameType::CallReq, payload))
        } else {
            let header = CallContHeader {
                flags: set_more_fragments(0, fragment.more_fragments),
                checksum_type: self.writer.checksum_type(),
            };
            let mut payload = header.encode()?;
            payload.extend_from_slice(&fragment.checksum_value);
            payload.extend_from_slice(&fragment.chunk_stream);
            Ok(Frame::new(self.id, FrameType::CallReqCont, payload))
        }
    }

    fn frames_from(&mut self, emitted: Vec<EmittedFragment>) -> Result<Vec<Frame>> {
        emitted.into_iter().map(|f| self.build_frame(f)).collect()
    }

    /// The message id this call was assigned.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn write_arg1(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.write_checked(WriteStage::Arg1, bytes)
    }

    pub fn end_arg1(&mut self) -> Result<Vec<Frame>> {
        self.end_checked(WriteStage::Arg1, WriteStage::Arg2)
    }

    pub fn write_arg2(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.write_checked(WriteStage::Arg2, bytes)
    }

    pub fn end_arg2(&mut self) -> Result<Vec<Frame>> {
        self.end_checked(WriteStage::Arg2, WriteStage::Arg3)
    }

    pub fn write_arg3(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.write_checked(WriteStage::Arg3, bytes)
    }

    /// Ends arg3 and flushes the terminal fragment, completing the request.
    pub fn finish(&mut self) -> Result<Vec<Frame>> {
        if self.stage != WriteStage::Arg3 {
            return Err(Error::StateMismatch);
        }
        let mut frames = self.frames_from(self.writer.end_argument()?)?;
        let last = self.writer.end_message()?;
        frames.push(self.build_frame(last)?);
        self.stage = WriteStage::Complete;
        Ok(frames)
    }

    fn write_checked(&mut self, expected: WriteStage, bytes: &[u8]) -> Result<Vec<Frame>> {
        if self.stage != expected {
            return Err(Error::StateMismatch);
        }
        let emitted = self.writer.write(bytes)?;
        self.frames_from(emitted)
    }

    fn end_checked(&mut self, expected: WriteStage, next: WriteStage) -> Result<Vec<Frame>> {
        if self.stage != expected {
            return Err(Error::StateMismatch);
        }
        let emitted = self.writer.end_argument()?;
        self.stage = next;
        self.frames_from(emitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStage {
    Arg1,
    Arg2,
    Arg3,
    Done,
}

/// Reads back a call's response: `code`, response headers (available as soon
/// as the first frame arrives), then arg2 and arg3. Arg1 is always present on
/// the wire but conventionally empty; it is drained automatically.
pub struct OutboundResponse {
    reader: FragmentReader,
    stage: ReadStage,
    code: Option<ResponseCode>,
    headers: Vec<(String, String)>,
}

impl OutboundResponse {
    pub fn new() -> Self {
        Self { reader: FragmentReader::new(), stage: ReadStage::Arg1, code: None, headers: Vec::new() }
    }

    pub fn feed_first(
        &mut self,
        header: CallResHeader,
        checksum_value: &[u8],
        chunk_stream: &[u8],
    ) -> Result<()> {
        self.code = Some(header.code);
        self.headers = header.headers;
        self.reader.feed(has_more_fragments(header.flags), header.checksum_type, checksum_value, chunk_stream)?;
        self.drain_arg1();
        Ok(())
    }

    pub fn feed_cont(&mut self, header: CallContHeader, checksum_value: &[u8], chunk_stream: &[u8]) -> Result<()> {
        if self.code.is_none() {
            return Err(Error::StateMismatch);
        }
        self.reader.feed(has_more_fragments(header.flags), header.checksum_type, checksum_value, chunk_stream)?;
        self.drain_arg1();
        Ok(())
    }

    fn drain_arg1(&mut self) {
        if self.stage == ReadStage::Arg1 && self.reader.is_arg_done(0) {
            self.reader.take_available(0);
            self.stage = ReadStage::Arg2;
        }
    }

    pub fn code(&self) -> Option<ResponseCode> {
        self.code
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_arg2_ready(&self) -> bool {
        self.stage != ReadStage::Arg1 && self.reader.is_arg_done(1)
    }

    pub fn is_arg3_ready(&self) -> bool {
        self.reader.is_message_done()
    }

    /// Drains and returns arg2's bytes. Errors with `StateMismatch` if called
    /// before arg2 is fully buffered.
    pub fn take_arg2(&mut self) -> Result<Vec<u8>> {
        if self.stage == ReadStage::Arg1 || !self.reader.is_arg_done(1) {
            return Err(Error::StateMismatch);
        }
        self.stage = ReadStage::Arg3;
        Ok(self.reader.take_available(1))
    }

    /// Drains and returns arg3's bytes. Errors with `StateMismatch` if called
    /// before the terminal fragment has arrived, or out of order.
    pub fn take_arg3(&mut self) -> Result<Vec<u8>> {
        if self.stage != ReadStage::Arg3 || !self.reader.is_message_done() {
            return Err(Error::StateMismatch);
        }
        self.stage = ReadStage::Done;
        Ok(self.reader.take_available(2))
    }

    pub fn is_complete(&self) -> bool {
        self.stage == ReadStage::Done
    }
}

impl Default for OutboundResponse {
    fn default() -> Self {
        Self::new()
    }
}
