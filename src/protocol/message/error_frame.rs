//! `Error` frame payload codec (§3, §6): code, the id being errored, and a message.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use super::headers::{read_str2, write_str2};
use crate::error::{Error, Result, WireErrorCode};

/// Decoded `Error` frame payload: `code:u8, id:u32, message:str2` per §6. `id`
/// is the message id of the call being errored, carried in the payload in
/// addition to the frame header's own `id` (the two match for every error this
/// crate emits); `id = 0` is connection-fatal per §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: WireErrorCode,
    pub id: u32,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: WireErrorCode, id: u32, message: impl Into<String>) -> Self {
        Self { code, id, message: message.into() }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(self.code as u8).unwrap();
        let mut id_bytes = [0u8; 4];
        BigEndian::write_u32(&mut id_bytes, self.id);
        buf.extend_from_slice(&id_bytes);
        write_str2(&mut buf, &self.message)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor: &[u8] = payload;
        let raw_code = cursor.read_u8()?;
        let code = num_traits::FromPrimitive::from_u8(raw_code)
            .ok_or_else(|| Error::Protocol(format!("unknown error code {raw_code:#04x}")))?;
        let id = cursor.read_u32::<BigEndian>()?;
        let message = read_str2(&mut cursor)?;
        Ok(Self { code, id, message })
    }
}
