//! Protocol module implements the wire protocol: frame header encoding,
//! per-message-type payload layout, checksums, argument fragmentation, the
//! call state machines, call multiplexing, and the connection lifecycle.
//!
//! - `frame`: the 16-byte frame header shared by every message type.
//! - `checksum`: the rolling CRC32/FarmHash32 digest over chunk streams.
//! - `message`: per-frame-type payload encode/decode (`Init*`, `CallReq*`,
//!   `CallRes*`, `Error`).
//! - `fragment`: splits/reassembles the three call arguments across one or
//!   more fragments' chunk streams.
//! - `call`: the four call-direction state machines built on `fragment`.
//! - `registry`: message id allocation and the id-to-call routing table.
//! - `connection`: the Init handshake, connection state machine, and the
//!   reader/writer loop pair that drive one socket.

pub mod call;
pub mod checksum;
pub mod connection;
pub mod frame;
pub mod fragment;
pub mod message;
pub mod registry;
