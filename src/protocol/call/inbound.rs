//! Inbound-direction call state machines (§4.5).
//!
//! `InboundCall` is the read side of a request this peer received: callers
//! must read arg1 (operation), arg2 (head), and arg3 (body) strictly in
//! order. `InboundResponse` is the write side of that call's response: arg1
//! is written automatically as empty, so callers start at arg2.

use crate::error::{Error, Result};
use crate::protocol::checksum::ChecksumType;
use crate::protocol::fragment::{EmittedFragment, FragmentReader, FragmentWriter};
use crate::protocol::frame::{Frame, FrameType};
use crate::protocol::message::call::{has_more_fragments, set_more_fragments, TRACING_SIZE};
use crate::protocol::message::{CallContHeader, CallReqHeader, CallResHeader, ResponseCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStage {
    Arg1,
    Arg2,
    Arg3,
    Done,
}

/// Reads a received call request's three arguments in order. Service name,
/// TTL, tracing span, and transport headers are available as soon as the
/// first frame (`CallReq`) has been fed.
pub struct InboundCall {
    reader: FragmentReader,
    stage: ReadStage,
    service: String,
    ttl_ms: u32,
    tracing: [u8; TRACING_SIZE],
    headers: Vec<(String, String)>,
    header_seen: bool,
}

impl InboundCall {
    pub fn new() -> Self {
        Self {
            reader: FragmentReader::new(),
            stage: ReadStage::Arg1,
            service: String::new(),
            ttl_ms: 0,
            tracing: [0u8; TRACING_SIZE],
            headers: Vec::new(),
            header_seen: false,
        }
    }

    pub fn feed_first(&mut self, header: CallReqHeader, checksum_value: &[u8], chunk_stream: &[u8]) -> Result<()> {
        self.service = header.service;
        self.ttl_ms = header.ttl_ms;
        self.tracing = header.tracing;
        self.headers = header.headers;
        self.header_seen = true;
        self.reader.feed(has_more_fragments(header.flags), header.checksum_type, checksum_value, chunk_stream)
    }

    pub fn feed_cont(&mut self, header: CallContHeader, checksum_value: &[u8], chunk_stream: &[u8]) -> Result<()> {
        if !self.header_seen {
            return Err(Error::StateMismatch);
        }
        self.reader.feed(has_more_fragments(header.flags), header.checksum_type, checksum_value, chunk_stream)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn ttl_ms(&self) -> u32 {
        self.ttl_ms
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The checksum type the request negotiated, available once the first
    /// frame has been fed.
    pub fn checksum_type(&self) -> Option<ChecksumType> {
        self.reader.checksum_type()
    }

    pub fn is_arg1_ready(&self) -> bool {
        self.header_seen && self.reader.is_arg_done(0)
    }

    pub fn take_arg1(&mut self) -> Result<Vec<u8>> {
        if self.stage != ReadStage::Arg1 || !self.reader.is_arg_done(0) {
            return Err(Error::StateMismatch);
        }
        self.stage = ReadStage::Arg2;
        Ok(self.reader.take_available(0))
    }

    pub fn is_arg2_ready(&self) -> bool {
        self.stage != ReadStage::Arg1 && self.reader.is_arg_done(1)
    }

    pub fn take_arg2(&mut self) -> Result<Vec<u8>> {
        if self.stage != ReadStage::Arg2 || !self.reader.is_arg_done(1) {
            return Err(Error::StateMismatch);
        }
        self.stage = ReadStage::Arg3;
        Ok(self.reader.take_available(1))
    }

    pub fn is_arg3_ready(&self) -> bool {
        self.reader.is_message_done()
    }

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

impl Default for InboundCall {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Arg1,
    Arg2,
    Arg3,
    Complete,
}

/// Writes a response to a received call. Arg1 is written as empty
/// automatically on construction, so the first caller-visible stage is arg2.
pub struct InboundResponse {
    id: u32,
    writer: FragmentWriter,
    stage: WriteStage,
    first_frame_sent: bool,
    code: ResponseCode,
    tracing: [u8; TRACING_SIZE],
    headers: Vec<(String, String)>,
    pending_arg1: Vec<EmittedFragment>,
}

impl InboundResponse {
    pub fn new(
        id: u32,
        code: ResponseCode,
        tracing: [u8; TRACING_SIZE],
        headers: Vec<(String, String)>,
        checksum_type: ChecksumType,
        max_chunk_bytes: usize,
    ) -> Result<Self> {
        let mut writer = FragmentWriter::new(checksum_type, max_chunk_bytes);
        writer.end_argument()?;
        // arg1 is always empty here, so the marker chunk just closed never fills
        // the fragment on its own; force it out as a standalone fragment so it
        // doesn't merge into arg2's chunk (the reader only treats a fragment's
        // first chunk as a same-argument continuation).
        let pending_arg1 = writer.flush_pending().into_iter().collect();
        Ok(Self {
            id,
            writer,
            stage: WriteStage::Arg1,
            first_frame_sent: false,
            code,
            tracing,
            headers,
            pending_arg1,
        })
    }

    fn build_frame(&mut self, fragment: EmittedFragment) -> Result<Frame> {
        if !self.first_frame_sent {
            self.first_frame_sent = true;
            let header = CallResHeader {
                flags: set_more_fragments(0, fragment.more_fragments),
                code: self.code,
                tracing: self.tracing,
                headers: self.headers.clone(),
                checksum_type: self.writer.checksum_type(),
            };
            let mut payload = header.encode()?;
            payload.extend_from_slice(&fragment.checksum_value);
            payload.extend_from_slice(&fragment.chunk_stream);
            Ok(Frame::new(self.id, FrameType::CallRes, payload))
        } else {
            let header = CallContHeader {
                flags: set_more_fragments(0, fragment.more_fragments),
                checksum_type: self.writer.checksum_type(),
            };
            let mut payload = header.encode()?;
            payload.extend_from_slice(&fragment.checksum_value);
            payload.extend_from_slice(&fragment.chunk_stream);
            Ok(Frame::new(self.id, FrameType::CallResCont, payload))
        }
    }

    fn frames_from(&mut self, emitted: Vec<EmittedFragment>) -> Result<Vec<Frame>> {
        emitted.into_iter().map(|f| self.build_frame(f)).collect()
    }

    /// Drains the zero-length arg1 fragments queued at construction time; must
    /// be called once, before the first real write, so arg1's marker frames (if
    /// any) are delivered ahead of arg2's data.
    pub fn start(&mut self) -> Result<Vec<Frame>> {
        if self.stage != WriteStage::Arg1 {
            return Err(Error::StateMismatch);
        }
        self.stage = WriteStage::Arg2;
        let pending = std::mem::take(&mut self.pending_arg1);
        self.frames_from(pending)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::call::outbound::{OutboundCall, OutboundResponse};

    fn decode_cont(frame: &Frame) -> (CallContHeader, Vec<u8>, Vec<u8>) {
        let mut cursor: &[u8] = &frame.payload;
        let header = CallContHeader::decode(&mut cursor).unwrap();
        let size = header.checksum_type.value_size();
        let checksum_value = cursor[..size].to_vec();
        let chunk_stream = cursor[size..].to_vec();
        (header, checksum_value, chunk_stream)
    }

    #[test]
    fn request_round_trips_through_inbound_call() {
        let mut call = OutboundCall::new(
            7,
            "echo",
            5_000,
            [1u8; TRACING_SIZE],
            vec![("a".to_string(), "b".to_string())],
            ChecksumType::Crc32,
            1024,
        );
        let mut frames = call.write_arg1(b"ping").unwrap();
        frames.extend(call.end_arg1().unwrap());
        frames.extend(call.write_arg2(b"head").unwrap());
        frames.extend(call.end_arg2().unwrap());
        frames.extend(call.write_arg3(b"body").unwrap());
        frames.extend(call.finish().unwrap());
        assert_eq!(frames.len(), 1);

        let mut inbound = InboundCall::new();
        let mut cursor: &[u8] = &frames[0].payload;
        let header = CallReqHeader::decode(&mut cursor).unwrap();
        let size = header.checksum_type.value_size();
        let checksum_value = cursor[..size].to_vec();
        let chunk_stream = cursor[size..].to_vec();
        inbound.feed_first(header, &checksum_value, &chunk_stream).unwrap();

        assert_eq!(inbound.service(), "echo");
        assert_eq!(inbound.take_arg1().unwrap(), b"ping");
        assert_eq!(inbound.take_arg2().unwrap(), b"head");
        assert_eq!(inbound.take_arg3().unwrap(), b"body");
        assert!(inbound.is_complete());
    }

    #[test]
    fn reading_out_of_order_is_state_mismatch() {
        let mut inbound = InboundCall::new();
        assert_eq!(inbound.take_arg2(), Err(Error::StateMismatch));
    }

    #[test]
    fn response_round_trips_through_outbound_response_with_empty_arg1() {
        let mut response = InboundResponse::new(
            9,
            ResponseCode::Ok,
            [2u8; TRACING_SIZE],
            vec![],
            ChecksumType::None,
            1024,
        )
        .unwrap();
        let mut frames = response.start().unwrap();
        frames.extend(response.write_arg2(b"head").unwrap());
        frames.extend(response.end_arg2().unwrap());
        frames.extend(response.write_arg3(b"body").unwrap());
        frames.extend(response.finish().unwrap());
        // The empty arg1 marker is forced out as its own leading fragment, so a
        // small response is two frames: the marker, then the arg2+arg3 data.
        assert_eq!(frames.len(), 2);

        let mut outbound = OutboundResponse::new();
        let mut iter = frames.into_iter();
        let first = iter.next().unwrap();
        let mut cursor: &[u8] = &first.payload;
        let header = CallResHeader::decode(&mut cursor).unwrap();
        let size = header.checksum_type.value_size();
        let checksum_value = cursor[..size].to_vec();
        let chunk_stream = cursor[size..].to_vec();
        outbound.feed_first(header, &checksum_value, &chunk_stream).unwrap();
        for frame in iter {
            let (header, checksum_value, chunk_stream) = decode_cont(&frame);
            outbound.feed_cont(header, &checksum_value, &chunk_stream).unwrap();
        }

        assert_eq!(outbound.code(), Some(ResponseCode::Ok));
        assert_eq!(outbound.take_arg2().unwrap(), b"head");
        assert_eq!(outbound.take_arg3().unwrap(), b"body");
        assert!(outbound.is_complete());
    }

    #[test]
    fn multi_fragment_response_feeds_cont_frames() {
        let big = vec![3u8; 500];
        let mut response =
            InboundResponse::new(1, ResponseCode::Ok, [0u8; TRACING_SIZE], vec![], ChecksumType::Crc32, 64).unwrap();
        let mut frames = response.start().unwrap();
        frames.extend(response.write_arg2(&big).unwrap());
        frames.extend(response.end_arg2().unwrap());
        frames.extend(response.write_arg3(b"tail").unwrap());
        frames.extend(response.finish().unwrap());
        assert!(frames.len() > 1);

        let mut outbound = OutboundResponse::new();
        let mut iter = frames.into_iter();
        let first = iter.next().unwrap();
        let mut cursor: &[u8] = &first.payload;
        let header = CallResHeader::decode(&mut cursor).unwrap();
        let size = header.checksum_type.value_size();
        outbound.feed_first(header, &cursor[..size].to_vec(), &cursor[size..].to_vec()).unwrap();
        for frame in iter {
            let (header, checksum_value, chunk_stream) = decode_cont(&frame);
            outbound.feed_cont(header, &checksum_value, &chunk_stream).unwrap();
        }
        assert_eq!(outbound.take_arg2().unwrap(), big);
        assert_eq!(outbound.take_arg3().unwrap(), b"tail");
    }
}
