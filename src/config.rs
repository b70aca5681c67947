//! Tunables for a [`crate::peer::Peer`] and the connections it owns.
//!
//! There is no configuration-file parser here; callers build a [`PeerConfig`] with
//! the `with_*` setters and pass it to [`crate::peer::Peer::listen`] /
//! [`crate::peer::Peer::dial`].

/// Current wire protocol version, sent in every `InitReq`/`InitRes`.
pub const CURRENT_PROTOCOL_VERSION: u16 = 0x02;

/// Size of the fixed frame header, in bytes (see §6 of the wire protocol).
pub const FRAME_HEADER_SIZE: usize = 16;

/// Reserved message id that is never assigned to a call; marks connection-fatal errors.
pub const RESERVED_MESSAGE_ID: u32 = 0;

/// Upper bound on a frame's payload size. Must stay `>= 64 KiB` per the protocol
/// invariant and fit in the wire `size: u16` field.
pub const DEFAULT_MAX_BODY_SIZE: usize = 65528;

/// Highest message id before the outbound counter wraps back to 1.
pub const DEFAULT_MAX_ID: u32 = u32::MAX;

/// Depth of the bounded outbound frame-write queue.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 256;

/// Depth of each per-call inbound fragment queue.
pub const DEFAULT_CALL_QUEUE_DEPTH: usize = 64;

/// Bytes reserved out of `max_body_size` for a fragment's fixed header fields
/// (flags, ttl/code, tracing, service name, transport headers, checksum type
/// and value) so the chunk-stream budget never pushes an encoded frame over
/// `max_body_size`. Generous enough for typical header maps; callers with
/// unusually large transport headers should lower `max_chunk_bytes`
/// accordingly via a smaller `max_body_size`.
pub const HEADER_OVERHEAD_RESERVE: usize = 512;

/// Runtime configuration for a [`crate::peer::Peer`] and the connections it spawns.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Process name advertised in the `InitReq`/`InitRes` headers.
    pub process_name: String,
    /// Maximum frame payload size in bytes.
    pub max_body_size: usize,
    /// Upper bound on outbound message ids before wraparound.
    pub max_id: u32,
    /// Depth of the bounded outbound frame-write queue.
    pub write_queue_depth: usize,
    /// Depth of each per-call inbound fragment queue.
    pub call_queue_depth: usize,
}

impl PeerConfig {
    /// Creates a config with the process name that will be advertised to peers.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_id: DEFAULT_MAX_ID,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
            call_queue_depth: DEFAULT_CALL_QUEUE_DEPTH,
        }
    }

    /// Overrides the maximum frame payload size.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size.min(u16::MAX as usize);
        self
    }

    /// Overrides the message id wraparound bound.
    pub fn with_max_id(mut self, max_id: u32) -> Self {
        self.max_id = max_id.max(1);
        self
    }

    /// Overrides the outbound write queue depth.
    pub fn with_write_queue_depth(mut self, depth: usize) -> Self {
        self.write_queue_depth = depth.max(1);
        self
    }

    /// Overrides the per-call inbound queue depth.
    pub fn with_call_queue_depth(mut self, depth: usize) -> Self {
        self.call_queue_depth = depth.max(1);
        self
    }

    /// The chunk-stream budget to hand to a [`crate::protocol::fragment::FragmentWriter`]:
    /// `max_body_size` minus headroom for the fixed header fields every
    /// fragment carries.
    pub fn max_chunk_bytes(&self) -> usize {
        self.max_body_size.saturating_sub(HEADER_OVERHEAD_RESERVE).max(64)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new("tchannel-rpc")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PeerConfig::default();
        assert!(cfg.max_body_size >= 65536 - 8);
        assert_eq!(cfg.max_id, u32::MAX);
    }

    #[test]
    fn builder_clamps_to_wire_limits() {
        let cfg = PeerConfig::new("svc").with_max_body_size(1_000_000);
        assert_eq!(cfg.max_body_size, u16::MAX as usize);
    }
}
