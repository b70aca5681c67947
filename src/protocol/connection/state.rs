//! Connection-level state machine (§4.6).

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Acceptor: waiting for the initiator's `InitReq`.
    WaitRecvInitReq = 0,
    /// Initiator: about to send `InitReq`.
    WaitSendInitReq = 1,
    /// Initiator: `InitReq` sent, waiting for `InitRes`.
    WaitRecvInitRes = 2,
    /// Handshake complete; calls may flow in either direction.
    Active = 3,
    /// Local side has asked to close; no new outbound calls are started, but
    /// calls already in flight are allowed to finish.
    StartClose = 4,
    /// The inbound half of the socket has been closed by the peer.
    InboundClosed = 5,
    /// Fully torn down.
    Closed = 6,
}

/// An atomically-updated connection state with checked transitions, so the
/// reader loop, writer loop, and public shutdown API can all observe and
/// advance it without a shared lock around more than a byte.
pub struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ConnectionState {
        decode(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `to` unconditionally (used for fatal-error teardown from any state).
    pub fn force(&self, to: ConnectionState) {
        self.0.store(to as u8, Ordering::SeqCst);
    }

    /// Moves from `from` to `to`, failing with a protocol error if the current
    /// state isn't `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<()> {
        match self.0.compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => Ok(()),
            Err(actual) => Err(Error::Protocol(format!(
                "invalid connection state transition: expected {:?}, was {:?}",
                from,
                decode(actual)
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.get() == ConnectionState::Active
    }
}

fn decode(raw: u8) -> ConnectionState {
    match raw {
        0 => ConnectionState::WaitRecvInitReq,
        1 => ConnectionState::WaitSendInitReq,
        2 => ConnectionState::WaitRecvInitRes,
        3 => ConnectionState::Active,
        4 => ConnectionState::StartClose,
        5 => ConnectionState::InboundClosed,
        _ => ConnectionState::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transition_succeeds() {
        let cell = ConnectionStateCell::new(ConnectionState::WaitRecvInitReq);
        cell.transition(ConnectionState::WaitRecvInitReq, ConnectionState::Active).unwrap();
        assert_eq!(cell.get(), ConnectionState::Active);
    }

    #[test]
    fn invalid_transition_errors() {
        let cell = ConnectionStateCell::new(ConnectionState::Active);
        let err = cell.transition(ConnectionState::WaitRecvInitReq, ConnectionState::Closed).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(cell.get(), ConnectionState::Active);
    }

    #[test]
    fn force_ignores_current_state() {
        let cell = ConnectionStateCell::new(ConnectionState::Active);
        cell.force(ConnectionState::Closed);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }
}
