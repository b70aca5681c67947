//! Rolling checksum over a message's chunk bytes, carried across fragment boundaries.
//!
//! Each fragment's checksum is computed over that fragment's own chunk bytes,
//! seeded with the digest state left by the prior fragment (the first fragment of a
//! message seeds from the type's initial state). The receiver recomputes the same
//! way and compares against the value declared in the fragment header.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::error::{Error, Result};

const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = generate_crc32_table();

const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32_POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32_update(mut state: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((state ^ byte as u32) & 0xFF) as usize;
        state = (state >> 8) ^ CRC32_TABLE[index];
    }
    state
}

/// 32-bit non-cryptographic mixing hash used for the `FarmHash32` checksum type.
/// Not bit-compatible with Google's FarmHash; it only needs to be a cheap,
/// well-distributed rolling digest for wire-level corruption detection.
fn farmhash32_update(mut state: u32, data: &[u8]) -> u32 {
    const PRIME1: u32 = 0x9E37_79B1;
    const PRIME2: u32 = 0x85EB_CA6B;
    for &byte in data {
        state ^= byte as u32;
        state = state.wrapping_mul(PRIME1);
        state = state.rotate_left(13);
        state = state.wrapping_mul(PRIME2);
    }
    state
}

/// Wire-level checksum type code, prefixing the checksum value in every
/// `CallReq`/`CallRes`/`*Cont` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ChecksumType {
    /// No checksum is carried; `value()` is always empty.
    None = 0x00,
    /// 4-byte CRC32 (IEEE 802.3 polynomial).
    Crc32 = 0x01,
    /// 4-byte FarmHash32-style mixing hash.
    FarmHash32 = 0x02,
}

impl ChecksumType {
    fn from_u8(v: u8) -> Option<Self> {
        <ChecksumType as FromPrimitive>::from_u8(v)
    }

    /// Number of bytes the checksum value occupies on the wire for this type.
    pub const fn value_size(&self) -> usize {
        match self {
            ChecksumType::None => 0,
            ChecksumType::Crc32 | ChecksumType::FarmHash32 => 4,
        }
    }

    /// The digest state a fresh message of this type starts from.
    fn initial_state(&self) -> u32 {
        match self {
            ChecksumType::None => 0,
            ChecksumType::Crc32 => 0xFFFF_FFFF,
            ChecksumType::FarmHash32 => 0x811C_9DC5,
        }
    }

    /// Parses a checksum type byte read off the wire.
    pub fn parse(raw: u8) -> Result<Self> {
        Self::from_u8(raw).ok_or_else(|| Error::Protocol(format!("unknown checksum type {raw:#04x}")))
    }
}

/// A rolling digest for one message id, seeded either fresh or from the prior
/// fragment's reported value.
#[derive(Debug, Clone, Copy)]
pub struct Digest {
    checksum_type: ChecksumType,
    state: u32,
}

impl Digest {
    /// Starts a fresh digest for the first fragment of a message.
    pub fn new(checksum_type: ChecksumType) -> Self {
        Self { checksum_type, state: checksum_type.initial_state() }
    }

    /// Resumes a digest from the prior fragment's reported value, for a
    /// continuation fragment.
    pub fn resume(checksum_type: ChecksumType, prior_value: &[u8]) -> Result<Self> {
        let state = decode_value(checksum_type, prior_value)?;
        Ok(Self { checksum_type, state })
    }

    /// Folds `bytes` (this fragment's chunk bytes) into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        self.state = match self.checksum_type {
            ChecksumType::None => 0,
            ChecksumType::Crc32 => crc32_update(self.state, bytes),
            ChecksumType::FarmHash32 => farmhash32_update(self.state, bytes),
        };
    }

    /// The wire-ready checksum value for this fragment, after all of its chunk
    /// bytes have been folded in via [`Digest::update`].
    pub fn value(&self) -> Vec<u8> {
        match self.checksum_type {
            ChecksumType::None => Vec::new(),
            ChecksumType::Crc32 => {
                let finalized = self.state ^ 0xFFFF_FFFF;
                let mut out = Vec::with_capacity(4);
                out.write_u32::<BigEndian>(finalized).unwrap();
                out
            }
            ChecksumType::FarmHash32 => {
                let mut out = Vec::with_capacity(4);
                out.write_u32::<BigEndian>(self.state).unwrap();
                out
            }
        }
    }

    /// Checks the claimed wire value against this digest's current value.
    pub fn verify(&self, claimed: &[u8]) -> Result<()> {
        if self.value() == claimed {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch)
        }
    }
}

/// Decodes a wire checksum value back into the raw digest state it represents,
/// used to resume a digest across a fragment boundary.
fn decode_value(checksum_type: ChecksumType, value: &[u8]) -> Result<u32> {
    if value.len() != checksum_type.value_size() {
        return Err(Error::Protocol(format!(
            "checksum value of {} bytes does not match type {:?}",
            value.len(),
            checksum_type
        )));
    }
    match checksum_type {
        ChecksumType::None => Ok(0),
        ChecksumType::Crc32 => {
            let mut cursor = value;
            let finalized = cursor.read_u32::<BigEndian>()?;
            Ok(finalized ^ 0xFFFF_FFFF)
        }
        ChecksumType::FarmHash32 => {
            let mut cursor = value;
            cursor.read_u32::<BigEndian>().map_err(Error::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        let mut digest = Digest::new(ChecksumType::Crc32);
        digest.update(b"123456789");
        // Standard CRC-32/ISO-HDLC check value for the ASCII string "123456789".
        assert_eq!(digest.value(), 0xCBF4_3926u32.to_be_bytes());
    }

    #[test]
    fn digest_resumes_across_fragments() {
        let mut whole = Digest::new(ChecksumType::Crc32);
        whole.update(b"hello world");
        let expected = whole.value();

        let mut first = Digest::new(ChecksumType::Crc32);
        first.update(b"hello ");
        let carried = first.value();

        let mut second = Digest::resume(ChecksumType::Crc32, &carried).unwrap();
        second.update(b"world");
        assert_eq!(second.value(), expected);
    }

    #[test]
    fn verify_detects_single_bit_flip() {
        let mut digest = Digest::new(ChecksumType::Crc32);
        digest.update(b"data");
        let mut claimed = digest.value();
        claimed[0] ^= 0x01;
        assert_eq!(digest.verify(&claimed), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn none_checksum_is_always_empty_and_verifies() {
        let digest = Digest::new(ChecksumType::None);
        assert!(digest.value().is_empty());
        assert!(digest.verify(&[]).is_ok());
    }

    #[test]
    fn farmhash32_resumes_across_fragments() {
        let mut whole = Digest::new(ChecksumType::FarmHash32);
        whole.update(b"the quick brown fox");
        let expected = whole.value();

        let mut first = Digest::new(ChecksumType::FarmHash32);
        first.update(b"the quick ");
        let carried = first.value();
        let mut second = Digest::resume(ChecksumType::FarmHash32, &carried).unwrap();
        second.update(b"brown fox");
        assert_eq!(second.value(), expected);
    }

    #[test]
    fn unknown_checksum_type_is_rejected() {
        assert!(ChecksumType::parse(0x7F).is_err());
    }
}
