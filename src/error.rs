//! Error taxonomy for the transport as specified by the wire protocol's `Error` frame
//! and the call-local/protocol-local failure modes that never reach the wire.
//!
//! Mirrors the two status tiers used throughout the protocol stack: a small
//! `#[repr(u8)]` enum for the codes that are actually serialized into an `Error`
//! frame (`ProtocolError`, `BadRequest`, `Busy`, `Declined`, `Timeout`, `NetworkError`,
//! `UnexpectedError`), plus library-internal variants that abort a single call or a
//! whole connection without ever producing a wire code of their own.

use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};

/// Result type alias used throughout the protocol stack.
pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level error codes, serialized as the `code` field of an `Error` frame.
///
/// These are the only codes a peer on the other end of the connection ever sees;
/// every other `Error` variant is translated to one of these before being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum WireErrorCode {
    /// Malformed frame, unknown frame type, version mismatch, or similar.
    ProtocolError = 0x01,
    /// The request itself was invalid (e.g. no handler registered).
    BadRequest = 0x02,
    /// The receiver's per-call queue overflowed; the call was aborted.
    Busy = 0x03,
    /// The connection is draining and declined a new inbound call.
    Declined = 0x04,
    /// The call's deadline elapsed before it completed.
    Timeout = 0x05,
    /// A network-level failure occurred while processing the call.
    NetworkError = 0x06,
    /// The handler panicked or returned an unclassified failure.
    UnexpectedError = 0xFF,
}

impl WireErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WireErrorCode::ProtocolError => "protocol error",
            WireErrorCode::BadRequest => "bad request",
            WireErrorCode::Busy => "busy",
            WireErrorCode::Declined => "declined",
            WireErrorCode::Timeout => "timeout",
            WireErrorCode::NetworkError => "network error",
            WireErrorCode::UnexpectedError => "unexpected error",
        }
    }
}

impl fmt::Display for WireErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All failure modes produced by the protocol stack.
///
/// Each variant knows how to classify itself (see [`Error::is_fatal`] and
/// [`Error::wire_code`]) so that the connection reader loop can decide whether to
/// abort just the affected call or tear down the whole connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed frame on the wire: truncated header, bad field, unknown frame type.
    Protocol(String),
    /// Peer sent an `InitReq`/`InitRes` with an unsupported protocol version.
    VersionMismatch { expected: u16, got: u16 },
    /// No handler registered for the requested service/operation.
    BadRequest(String),
    /// Per-call inbound queue overflowed; the call (not the connection) was aborted.
    Busy,
    /// The connection is draining (`StartClose`) and rejected a new inbound call.
    Declined,
    /// The call's deadline elapsed before completion.
    Timeout,
    /// An I/O failure on the underlying socket.
    NetworkError(String),
    /// Handler-side failure with no more specific classification.
    UnexpectedError(String),
    /// Recomputed checksum did not match the value declared on the wire.
    ChecksumMismatch,
    /// A later fragment declared a different checksum type than the first.
    MismatchedChecksumTypes,
    /// The terminal fragment ended before all three arguments were read.
    IncompleteMessage,
    /// An argument was read (or ended) out of the required arg1→arg2→arg3 order.
    StateMismatch,
    /// `end_argument` was called while unread bytes remained in the stream.
    DataLeftover,
    /// A `CallReq` arrived for a message id that is already live in the registry.
    DuplicateRequest,
    /// A write was attempted on a call past its terminal fragment.
    WriteAfterComplete,
    /// The outbound writer queue is saturated; caller should retry or fail.
    SendBufferFull,
    /// A frame's payload would exceed `MaxBodySize`.
    EncodeError(String),
    /// The call's context was cancelled (deadline or connection close).
    Cancelled,
    /// Any other `std::io::Error` surfaced by the socket.
    Io(String),
}

impl Error {
    /// True if this error is fatal to the whole connection rather than just one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::VersionMismatch { .. } | Error::NetworkError(_) | Error::Io(_)
        )
    }

    /// The wire code this error should be reported as, if it is ever sent as an
    /// `Error` frame. Call-local errors that never cross the wire (e.g.
    /// `StateMismatch`, which is a programming error local to this process) return
    /// `None`.
    pub fn wire_code(&self) -> Option<WireErrorCode> {
        match self {
            Error::Protocol(_) | Error::VersionMismatch { .. } => Some(WireErrorCode::ProtocolError),
            Error::BadRequest(_) => Some(WireErrorCode::BadRequest),
            Error::Busy | Error::ChecksumMismatch | Error::DuplicateRequest => {
                Some(WireErrorCode::Busy)
            }
            Error::Declined => Some(WireErrorCode::Declined),
            Error::Timeout | Error::Cancelled => Some(WireErrorCode::Timeout),
            Error::NetworkError(_) | Error::Io(_) => Some(WireErrorCode::NetworkError),
            Error::UnexpectedError(_) => Some(WireErrorCode::UnexpectedError),
            Error::MismatchedChecksumTypes
            | Error::IncompleteMessage
            | Error::StateMismatch
            | Error::DataLeftover
            | Error::WriteAfterComplete
            | Error::SendBufferFull
            | Error::EncodeError(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::VersionMismatch { expected, got } => {
                write!(f, "protocol version mismatch: expected {expected:#06x}, got {got:#06x}")
            }
            Error::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Error::Busy => write!(f, "busy"),
            Error::Declined => write!(f, "declined"),
            Error::Timeout => write!(f, "timeout"),
            Error::NetworkError(msg) => write!(f, "network error: {msg}"),
            Error::UnexpectedError(msg) => write!(f, "unexpected error: {msg}"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
            Error::MismatchedChecksumTypes => write!(f, "mismatched checksum types"),
            Error::IncompleteMessage => write!(f, "incomplete message"),
            Error::StateMismatch => write!(f, "state mismatch"),
            Error::DataLeftover => write!(f, "data left over in argument"),
            Error::DuplicateRequest => write!(f, "duplicate request id"),
            Error::WriteAfterComplete => write!(f, "write after call complete"),
            Error::SendBufferFull => write!(f, "send buffer full"),
            Error::EncodeError(msg) => write!(f, "encode error: {msg}"),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_fatal() {
        assert!(Error::Protocol("bad".into()).is_fatal());
        assert!(Error::VersionMismatch { expected: 2, got: 1 }.is_fatal());
        assert!(Error::Io("broken pipe".into()).is_fatal());
    }

    #[test]
    fn call_local_errors_are_not_fatal() {
        assert!(!Error::ChecksumMismatch.is_fatal());
        assert!(!Error::Busy.is_fatal());
        assert!(!Error::Declined.is_fatal());
    }

    #[test]
    fn wire_code_roundtrips_through_num_traits() {
        use num_traits::{FromPrimitive, ToPrimitive};
        let code = WireErrorCode::Declined;
        let raw = code.to_u8().unwrap();
        assert_eq!(WireErrorCode::from_u8(raw), Some(WireErrorCode::Declined));
    }
}
