//! Inbound fragment reassembler (§4.4): turns a sequence of fragments for one
//! message id back into three argument byte streams.

use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::checksum::{ChecksumType, Digest};

/// Reassembles fragments for a single inbound or outbound message (a call request
/// or a call response — the mechanics are identical either way).
///
/// Chunks within a fragment are assigned to argument indices in ascending order:
/// the first chunk of a fragment continues whichever argument was active at the
/// end of the previous fragment, and every later chunk in the same fragment
/// advances to the next argument. A zero-length chunk contributes no bytes; at
/// position 0 that means "the carried-over argument ends here with no more
/// bytes" (the boundary case from [`super::writer`]), and at any other position
/// it means "this argument is empty."
pub struct FragmentReader {
    checksum_type: Option<ChecksumType>,
    digest: Option<Digest>,
    /// Index (0, 1, or 2) of the argument currently receiving bytes.
    current_arg: u8,
    args: [VecDeque<u8>; 3],
    terminal_done: bool,
}

impl FragmentReader {
    pub fn new() -> Self {
        Self {
            checksum_type: None,
            digest: None,
            current_arg: 0,
            args: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            terminal_done: bool::default(),
        }
    }

    fn advance_arg(&mut self) -> Result<()> {
        if self.current_arg >= 2 {
            return Err(Error::Protocol("fragment carries more than three arguments".to_string()));
        }
        self.current_arg += 1;
        Ok(())
    }

    fn push(&mut self, bytes: &[u8]) {
        self.args[self.current_arg as usize].extend(bytes.iter().copied());
    }

    /// Feeds one fragment's flags-derived `more_fragments`, checksum type/value, and
    /// chunk stream into the reassembler.
    pub fn feed(
        &mut self,
        more_fragments: bool,
        checksum_type: ChecksumType,
        checksum_value: &[u8],
        chunk_stream: &[u8],
    ) -> Result<()> {
        if self.terminal_done {
            return Err(Error::Protocol("fragment received after terminal fragment".to_string()));
        }
        match self.checksum_type {
            None => self.checksum_type = Some(checksum_type),
            Some(t) if t != checksum_type => return Err(Error::MismatchedChecksumTypes),
            Some(_) => {}
        }
        let mut digest = self.digest.take().unwrap_or_else(|| Digest::new(checksum_type));

        let mut cursor = chunk_stream;
        let mut position = 0usize;
        while !cursor.is_empty() {
            if cursor.len() < 2 {
                return Err(Error::Protocol("truncated chunk length prefix".to_string()));
            }
            let len = BigEndian::read_u16(&cursor[..2]) as usize;
            cursor = &cursor[2..];
            if cursor.len() < len {
                return Err(Error::Protocol("truncated chunk payload".to_string()));
            }
            let bytes = &cursor[..len];
            cursor = &cursor[len..];
            digest.update(bytes);

            if position == 0 {
                if bytes.is_empty() {
                    self.advance_arg()?;
                } else {
                    self.push(bytes);
                }
            } else {
                self.advance_arg()?;
                self.push(bytes);
            }
            position += 1;
        }

        digest.verify(checksum_value)?;
        self.digest = Some(digest);

        if !more_fragments {
            self.terminal_done = true;
            if self.current_arg != 2 {
                return Err(Error::IncompleteMessage);
            }
        }
        Ok(())
    }

    /// Drains and returns whatever bytes are currently buffered for `arg_index`.
    pub fn take_available(&mut self, arg_index: usize) -> Vec<u8> {
        self.args[arg_index].drain(..).collect()
    }

    /// True once `arg_index` has received all of its bytes (either a later
    /// argument has started, or the terminal fragment has been consumed).
    pub fn is_arg_done(&self, arg_index: usize) -> bool {
        arg_index < self.current_arg as usize
            || (self.terminal_done && arg_index == self.current_arg as usize)
    }

    pub fn is_message_done(&self) -> bool {
        self.terminal_done
    }

    /// The checksum type negotiated by the first fragment fed in, if any.
    pub fn checksum_type(&self) -> Option<ChecksumType> {
        self.checksum_type
    }
}

impl Default for FragmentReader {
    fn default() -> Self {
        Self::new()
    }
}
