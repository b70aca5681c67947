//! `CallReq`/`CallRes`/`*Cont` payload header codec (§3, §6).
//!
//! The payload that follows these headers is the fragment's chunk stream, decoded
//! separately by [`crate::protocol::fragment`].

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

use super::headers::{read_headers, read_str1, write_headers, write_str1};
use crate::error::{Error, Result};
use crate::protocol::checksum::ChecksumType;

/// Opaque tracing span, carried but not interpreted by this transport.
pub const TRACING_SIZE: usize = 25;

/// Bit 0 of the payload flags: more fragments for this message id follow.
pub const FLAG_MORE_FRAGMENTS: u8 = 0x01;

/// Returns `true` if `flags` has the `MoreFragments` bit set.
pub fn has_more_fragments(flags: u8) -> bool {
    flags & FLAG_MORE_FRAGMENTS != 0
}

/// Sets or clears the `MoreFragments` bit.
pub fn set_more_fragments(flags: u8, more: bool) -> u8 {
    if more {
        flags | FLAG_MORE_FRAGMENTS
    } else {
        flags & !FLAG_MORE_FRAGMENTS
    }
}

fn read_tracing(src: &mut impl Read) -> Result<[u8; TRACING_SIZE]> {
    let mut buf = [0u8; TRACING_SIZE];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_tracing(buf: &mut Vec<u8>, tracing: &[u8; TRACING_SIZE]) {
    buf.extend_from_slice(tracing);
}

/// Fixed portion of a `CallReq` frame (the first fragment of an outbound call),
/// everything up to but not including the checksum and chunk stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReqHeader {
    pub flags: u8,
    pub ttl_ms: u32,
    pub tracing: [u8; TRACING_SIZE],
    pub service: String,
    pub headers: Vec<(String, String)>,
    pub checksum_type: ChecksumType,
}

impl CallReqHeader {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(self.flags).unwrap();
        buf.write_u32::<BigEndian>(self.ttl_ms).unwrap();
        write_tracing(&mut buf, &self.tracing);
        write_str1(&mut buf, &self.service)?;
        write_headers(&mut buf, &self.headers)?;
        buf.write_u8(self.checksum_type as u8).unwrap();
        Ok(buf)
    }

    pub fn decode(src: &mut impl Read) -> Result<Self> {
        let flags = src.read_u8()?;
        let ttl_ms = src.read_u32::<BigEndian>()?;
        let tracing = read_tracing(src)?;
        let service = read_str1(src)?;
        let headers = read_headers(src)?;
        let checksum_type = ChecksumType::parse(src.read_u8()?)?;
        Ok(Self { flags, ttl_ms, tracing, service, headers, checksum_type })
    }
}

/// Application-level response status (`CallRes.code`). Distinct from transport
/// [`crate::error::WireErrorCode`]: an application error is still a well-formed
/// response, just with `code = Error` and `ok = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    Ok = 0,
    Error = 1,
}

impl ResponseCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Error),
            other => Err(Error::Protocol(format!("unknown response code {other:#04x}"))),
        }
    }
}

/// Fixed portion of a `CallRes` frame (the first fragment of a call response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResHeader {
    pub flags: u8,
    pub code: ResponseCode,
    pub tracing: [u8; TRACING_SIZE],
    pub headers: Vec<(String, String)>,
    pub checksum_type: ChecksumType,
}

impl CallResHeader {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(self.flags).unwrap();
        buf.write_u8(self.code as u8).unwrap();
        write_tracing(&mut buf, &self.tracing);
        write_headers(&mut buf, &self.headers)?;
        buf.write_u8(self.checksum_type as u8).unwrap();
        Ok(buf)
    }

    pub fn decode(src: &mut impl Read) -> Result<Self> {
        let flags = src.read_u8()?;
        let code = ResponseCode::from_u8(src.read_u8()?)?;
        let tracing = read_tracing(src)?;
        let headers = read_headers(src)?;
        let checksum_type = ChecksumType::parse(src.read_u8()?)?;
        Ok(Self { flags, code, tracing, headers, checksum_type })
    }
}

/// Fixed portion of a `CallReqCont`/`CallResCont` frame: just flags and checksum
/// type, since continuation fragments carry no per-message metadata of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContHeader {
    pub flags: u8,
    pub checksum_type: ChecksumType,
}

impl CallContHeader {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u8(self.flags).unwrap();
        buf.write_u8(self.checksum_type as u8).unwrap();
        Ok(buf)
    }

    pub fn decode(src: &mut impl Read) -> Result<Self> {
        let flags = src.read_u8()?;
        let checksum_type = ChecksumType::parse(src.read_u8()?)?;
        Ok(Self { flags, checksum_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracing() -> [u8; TRACING_SIZE] {
        [7u8; TRACING_SIZE]
    }

    #[test]
    fn call_req_header_roundtrip() {
        let header = CallReqHeader {
            flags: FLAG_MORE_FRAGMENTS,
            ttl_ms: 30_000,
            tracing: tracing(),
            service: "echo-service".to_string(),
            headers: vec![("k".to_string(), "v".to_string())],
            checksum_type: ChecksumType::Crc32,
        };
        let encoded = header.encode().unwrap();
        let mut cursor = &encoded[..];
        let decoded = CallReqHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert!(has_more_fragments(decoded.flags));
    }

    #[test]
    fn call_res_header_roundtrip() {
        let header = CallResHeader {
            flags: 0,
            code: ResponseCode::Error,
            tracing: tracing(),
            headers: vec![],
            checksum_type: ChecksumType::None,
        };
        let encoded = header.encode().unwrap();
        let mut cursor = &encoded[..];
        let decoded = CallResHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert!(!has_more_fragments(decoded.flags));
    }

    #[test]
    fn call_cont_header_roundtrip() {
        let header = CallContHeader { flags: FLAG_MORE_FRAGMENTS, checksum_type: ChecksumType::FarmHash32 };
        let encoded = header.encode().unwrap();
        let mut cursor = &encoded[..];
        let decoded = CallContHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn flag_helpers_set_and_clear() {
        assert_eq!(set_more_fragments(0, true), FLAG_MORE_FRAGMENTS);
        assert_eq!(set_more_fragments(FLAG_MORE_FRAGMENTS, false), 0);
    }
}
