//! `InitReq`/`InitRes` payload codec (§3, §6): protocol version plus a string
//! header map including at least `host_port` and `process_name`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::headers::{header_get, read_headers, write_headers};
use crate::error::{Error, Result};

/// Header key for the advertising peer's `ip:port`.
pub const HEADER_HOST_PORT: &str = "host_port";
/// Header key for the advertising peer's process name.
pub const HEADER_PROCESS_NAME: &str = "process_name";

/// Decoded `InitReq`/`InitRes` payload. The same shape serves both frame types;
/// only the frame's `FrameType` distinguishes request from response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPayload {
    pub version: u16,
    pub headers: Vec<(String, String)>,
}

impl InitPayload {
    /// Builds an init payload advertising the given host:port and process name.
    pub fn new(version: u16, host_port: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            version,
            headers: vec![
                (HEADER_HOST_PORT.to_string(), host_port.into()),
                (HEADER_PROCESS_NAME.to_string(), process_name.into()),
            ],
        }
    }

    pub fn host_port(&self) -> Option<&str> {
        header_get(&self.headers, HEADER_HOST_PORT)
    }

    pub fn process_name(&self) -> Option<&str> {
        header_get(&self.headers, HEADER_PROCESS_NAME)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(self.version).unwrap();
        write_headers(&mut buf, &self.headers)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor: &[u8] = payload;
        let version = cursor.read_u16::<BigEndian>()?;
        let headers = read_headers(&mut cursor)?;
        Ok(Self { version, headers })
    }

    /// Validates that required headers are present, per §3's invariant that Init
    /// frames carry at least `host_port` and `process_name`.
    pub fn validate(&self) -> Result<()> {
        if self.host_port().is_none() {
            return Err(Error::Protocol(format!("InitReq/InitRes missing {HEADER_HOST_PORT} header")));
        }
        if self.process_name().is_none() {
            return Err(Error::Protocol(format!("InitReq/InitRes missing {HEADER_PROCESS_NAME} header")));
        }
        Ok(())
    }
}
