//! Outbound fragment writer (§4.3): turns three sequential argument byte streams
//! into a series of chunked, checksummed fragments ready to be wrapped in
//! `CallReq`/`CallReqCont` or `CallRes`/`CallResCont` frames.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::checksum::{ChecksumType, Digest};

/// One fragment's worth of output: the `MoreFragments` flag, the checksum value to
/// stamp into the fragment header, and the already-chunked byte stream to append
/// after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFragment {
    pub more_fragments: bool,
    pub checksum_value: Vec<u8>,
    pub chunk_stream: Vec<u8>,
}

/// Minimum chunk-stream budget per fragment: room for at least one chunk's 2-byte
/// length prefix plus a single payload byte, so the writer can always make
/// progress.
const MIN_CHUNK_BUDGET: usize = 4;

/// Accepts byte writes for arg1, arg2, arg3 in sequence and emits fragments
/// whenever the per-fragment chunk-stream budget is exhausted.
pub struct FragmentWriter {
    max_chunk_bytes: usize,
    digest: Digest,
    checksum_type: ChecksumType,
    /// 0, 1, or 2 while an argument is being written; 3 once `end_message` returns.
    current_arg: u8,
    /// Chunk-stream bytes accumulated for the fragment not yet flushed.
    fragment_buf: Vec<u8>,
    /// Byte offset of the 2-byte length prefix of the currently open chunk, if any.
    open_chunk_start: Option<usize>,
    ended: bool,
}

impl FragmentWriter {
    pub fn new(checksum_type: ChecksumType, max_chunk_bytes: usize) -> Self {
        assert!(max_chunk_bytes >= MIN_CHUNK_BUDGET, "fragment budget too small to make progress");
        Self {
            max_chunk_bytes,
            digest: Digest::new(checksum_type),
            checksum_type,
            current_arg: 0,
            fragment_buf: Vec::new(),
            open_chunk_start: None,
            ended: false,
        }
    }

    fn remaining_capacity(&self) -> usize {
        self.max_chunk_bytes - self.fragment_buf.len()
    }

    fn open_chunk(&mut self) {
        if self.open_chunk_start.is_none() {
            self.open_chunk_start = Some(self.fragment_buf.len());
            self.fragment_buf.extend_from_slice(&[0u8, 0u8]);
        }
    }

    /// Closes the currently open chunk, patching its length prefix. No-op if no
    /// chunk is open.
    fn close_chunk(&mut self) {
        if let Some(start) = self.open_chunk_start.take() {
            let len = self.fragment_buf.len() - (start + 2);
            BigEndian::write_u16(&mut self.fragment_buf[start..start + 2], len as u16);
        }
    }

    fn flush(&mut self, more_fragments: bool) -> EmittedFragment {
        debug_assert!(self.open_chunk_start.is_none(), "flushing with a chunk still open");
        EmittedFragment {
            more_fragments,
            checksum_value: self.digest.value(),
            chunk_stream: std::mem::take(&mut self.fragment_buf),
        }
    }

    /// Forces whatever is currently buffered out as its own fragment (with no
    /// chunk left open), rather than leaving it to merge into the next chunk
    /// written. Used by callers that need a leading marker chunk — e.g. an
    /// always-empty arg1 — to arrive as a standalone fragment, since the
    /// reader only treats a fragment's first chunk as a same-argument
    /// continuation; a later chunk in that same fragment always starts a new
    /// argument. Returns `None` if nothing is buffered.
    pub fn flush_pending(&mut self) -> Option<EmittedFragment> {
        if self.fragment_buf.is_empty() {
            return None;
        }
        Some(self.flush(true))
    }

    /// Writes `bytes` for whichever argument is currently open (`write`/`end_argument`
    /// calls must come in arg1, arg2, arg3 order; the writer does not itself track
    /// which logical argument it is, only the fragment/chunk mechanics — argument
    /// sequencing is the caller's responsibility, e.g. [`crate::protocol::call::outbound`]).
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<Vec<EmittedFragment>> {
        if self.ended {
            return Err(Error::WriteAfterComplete);
        }
        let mut emitted = Vec::new();
        while !bytes.is_empty() {
            self.open_chunk();
            let room = self.remaining_capacity();
            let take = room.min(bytes.len());
            self.fragment_buf.extend_from_slice(&bytes[..take]);
            self.digest.update(&bytes[..take]);
            bytes = &bytes[take..];
            if self.remaining_capacity() == 0 && !bytes.is_empty() {
                self.close_chunk();
                emitted.push(self.flush(true));
                // Continuing the same argument: open a fresh chunk in the new fragment.
                self.open_chunk();
            }
        }
        Ok(emitted)
    }

    /// Signals that the current argument has ended, advancing to the next one.
    /// May emit zero, one, or two fragments: one if the fragment filled exactly at
    /// the argument boundary (plus the boundary-marker fragment start), none
    /// otherwise.
    pub fn end_argument(&mut self) -> Result<Vec<EmittedFragment>> {
        if self.ended {
            return Err(Error::WriteAfterComplete);
        }
        if self.current_arg >= 3 {
            return Err(Error::StateMismatch);
        }
        if self.open_chunk_start.is_none() {
            // Argument received no bytes: it still needs its own (zero-length) chunk.
            self.open_chunk();
        }
        self.close_chunk();
        self.current_arg += 1;
        let mut emitted = Vec::new();
        if self.remaining_capacity() == 0 {
            emitted.push(self.flush(true));
            // The new fragment's first chunk would otherwise be read as "more bytes
            // of the argument that just ended"; an explicit zero-length chunk marks
            // that it has, in fact, ended exactly on the fragment boundary.
            self.open_chunk();
            self.close_chunk();
        }
        Ok(emitted)
    }

    /// Closes out the message after arg3 has ended: flushes the terminal fragment
    /// with `MoreFragments = 0`.
    pub fn end_message(&mut self) -> Result<EmittedFragment> {
        if self.ended {
            return Err(Error::WriteAfterComplete);
        }
        if self.current_arg != 3 {
            return Err(Error::StateMismatch);
        }
        self.close_chunk();
        self.ended = true;
        Ok(self.flush(false))
    }

    pub fn checksum_type(&self) -> ChecksumType {
        self.checksum_type
    }
}
