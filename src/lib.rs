//! tchannel-rpc - a bidirectional, multiplexed RPC transport over a single
//! TCP connection.
//!
//! A connection carries calls in both directions at once: either side of a
//! dialed connection may send a `CallReq` and expect a `CallRes`, and many
//! calls can be in flight concurrently, distinguished by a per-connection
//! message id. Call arguments that don't fit in one frame are split into
//! fragments and reassembled on the other end with a rolling checksum.
//!
//! ## Main components
//!
//! - [`peer`]: [`Peer`] binds a listener, dials out, and owns every
//!   connection it accepts or creates.
//! - [`client`]: whole-message [`client::call`] for the common case, plus
//!   [`client::CallStream`] for producing or consuming arguments
//!   incrementally.
//! - [`handler`]: [`Handler`], the trait an application implements to answer
//!   inbound calls.
//! - `protocol`: the wire protocol itself — frame header, checksums, the
//!   Init handshake, fragment (re)assembly, the call state machines, and the
//!   connection lifecycle.
//! - [`config`]: [`PeerConfig`]/`ConnectionConfig`, the tunables for frame
//!   size, chunk size, and queue depths.
//! - [`error`]: the wire-coded `Error` enum shared by every public API.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod peer;
pub mod protocol;

pub use client::{call, call_with, CallOutcome, CallStream};
pub use config::PeerConfig;
pub use error::{Error, Result};
pub use handler::{Handler, HandlerRegistry, HandlerResponse, OperationHandler};
pub use peer::Peer;
pub use protocol::connection::{Connection, ConnectionState};
