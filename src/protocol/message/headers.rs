//! Length-prefixed string and header-map codecs shared by Init and Call messages.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

use crate::error::{Error, Result};

/// Writes a `str1`: a `u8` byte count followed by the UTF-8 bytes.
pub fn write_str1(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u8::MAX as usize {
        return Err(Error::EncodeError(format!("str1 value of {} bytes exceeds 255", bytes.len())));
    }
    buf.write_u8(bytes.len() as u8).unwrap();
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a `str1` from `src`.
pub fn read_str1(src: &mut impl Read) -> Result<String> {
    let len = src.read_u8()?;
    read_utf8(src, len as usize)
}

/// Writes a `str2`: a `u16` byte count followed by the UTF-8 bytes.
pub fn write_str2(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(Error::EncodeError(format!("str2 value of {} bytes exceeds 65535", bytes.len())));
    }
    buf.write_u16::<BigEndian>(bytes.len() as u16).unwrap();
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a `str2` from `src`.
pub fn read_str2(src: &mut impl Read) -> Result<String> {
    let len = src.read_u16::<BigEndian>()?;
    read_utf8(src, len as usize)
}

fn read_utf8(src: &mut impl Read, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::Protocol(format!("invalid UTF-8 in string: {e}")))
}

/// Writes a header map: `u8` pair count followed by `(str1, str1)` pairs.
/// Used by Init frames and Call/CallRes headers, both of which cap the pair count
/// at a byte.
pub fn write_headers(buf: &mut Vec<u8>, headers: &[(String, String)]) -> Result<()> {
    if headers.len() > u8::MAX as usize {
        return Err(Error::EncodeError(format!("{} headers exceeds 255", headers.len())));
    }
    buf.write_u8(headers.len() as u8).unwrap();
    for (k, v) in headers {
        write_str1(buf, k)?;
        write_str1(buf, v)?;
    }
    Ok(())
}

/// Reads a header map written by [`write_headers`].
pub fn read_headers(src: &mut impl Read) -> Result<Vec<(String, String)>> {
    let count = src.read_u8()?;
    let mut headers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let k = read_str1(src)?;
        let v = read_str1(src)?;
        headers.push((k, v));
    }
    Ok(headers)
}

/// Looks up a header value by key, matching the first occurrence.
pub fn header_get<'a>(headers: &'a [(String, String)], key: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
