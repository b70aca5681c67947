//! Per-connection call bookkeeping (§4.7): outbound id allocation and the
//! message-id → fragment-channel maps used by both directions.
//!
//! A single connection multiplexes many concurrent calls over one socket;
//! [`CallRegistry`] is what lets the reader loop route an arriving frame to
//! the right call without knowing anything about that call's argument state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::config::RESERVED_MESSAGE_ID;
use crate::error::{Error, Result};
use crate::protocol::frame::Frame;

/// Allocates outbound message ids starting at 1, wrapping back to 1 before
/// ever reaching `max_id`, and never producing [`RESERVED_MESSAGE_ID`].
pub struct IdAllocator {
    next: AtomicU32,
    max_id: u32,
}

impl IdAllocator {
    pub fn new(max_id: u32) -> Self {
        Self { next: AtomicU32::new(1), max_id: max_id.max(1) }
    }

    /// Returns the next id, advancing the counter.
    pub fn next_id(&self) -> u32 {
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let after = if current >= self.max_id { 1 } else { current + 1 };
            if self.next.compare_exchange(current, after, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                debug_assert_ne!(current, RESERVED_MESSAGE_ID);
                return current;
            }
        }
    }
}

/// Outcome of routing one arriving frame to its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame was handed to the call's channel.
    Delivered,
    /// No call is registered for this id (dropped silently; see
    /// `crate::protocol::connection`'s handling of stray `*Cont`/`Error` frames).
    Unknown,
    /// The call's channel is full; the call should be aborted with `Busy`.
    Busy,
}

/// Maps live message ids to the channel feeding that call's fragment
/// reassembler. Used once per direction per connection: one registry for
/// calls this peer is receiving, another for calls this peer initiated.
pub struct CallRegistry {
    inner: Mutex<HashMap<u32, mpsc::Sender<Frame>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    /// Registers a new call, returning the receiving end of its fragment
    /// channel. Fails with [`Error::DuplicateRequest`] if `id` is already live.
    pub fn register(&self, id: u32, depth: usize) -> Result<mpsc::Receiver<Frame>> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&id) {
            return Err(Error::DuplicateRequest);
        }
        let (tx, rx) = mpsc::channel(depth);
        map.insert(id, tx);
        Ok(rx)
    }

    /// Routes `frame` to the call registered under `frame.id`.
    pub fn dispatch(&self, frame: Frame) -> DispatchOutcome {
        let map = self.inner.lock().unwrap();
        match map.get(&frame.id) {
            None => DispatchOutcome::Unknown,
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => DispatchOutcome::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => DispatchOutcome::Busy,
                Err(mpsc::error::TrySendError::Closed(_)) => DispatchOutcome::Unknown,
            },
        }
    }

    /// Deregisters a call once it has completed, errored, or been aborted.
    pub fn remove(&self, id: u32) {
        self.inner.lock().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Ids of every call still live, for connection-close draining.
    pub fn live_ids(&self) -> Vec<u32> {
        self.inner.lock().unwrap().keys().copied().collect()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::FrameType;

    #[test]
    fn id_allocator_starts_at_one_and_skips_zero() {
        let alloc = IdAllocator::new(u32::MAX);
        assert_eq!(alloc.next_id(), 1);
        assert_eq!(alloc.next_id(), 2);
    }

    #[test]
    fn id_allocator_wraps_before_max() {
        let alloc = IdAllocator::new(3);
        assert_eq!(alloc.next_id(), 1);
        assert_eq!(alloc.next_id(), 2);
        assert_eq!(alloc.next_id(), 3);
        assert_eq!(alloc.next_id(), 1);
    }

    #[tokio::test]
    async fn register_dispatch_and_remove() {
        let registry = CallRegistry::new();
        let mut rx = registry.register(5, 4).unwrap();
        assert_eq!(registry.register(5, 4).unwrap_err(), Error::DuplicateRequest);

        let outcome = registry.dispatch(Frame::new(5, FrameType::CallReq, vec![1, 2, 3]));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3]);

        registry.remove(5);
        assert_eq!(registry.dispatch(Frame::new(5, FrameType::CallReqCont, vec![])), DispatchOutcome::Unknown);
    }

    #[test]
    fn dispatch_to_unknown_id_is_unknown() {
        let registry = CallRegistry::new();
        let outcome = registry.dispatch(Frame::new(99, FrameType::CallReqCont, vec![]));
        assert_eq!(outcome, DispatchOutcome::Unknown);
    }

    #[test]
    fn dispatch_to_full_queue_is_busy() {
        let registry = CallRegistry::new();
        let _rx = registry.register(1, 1).unwrap();
        assert_eq!(registry.dispatch(Frame::new(1, FrameType::CallReq, vec![])), DispatchOutcome::Delivered);
        assert_eq!(registry.dispatch(Frame::new(1, FrameType::CallReqCont, vec![])), DispatchOutcome::Busy);
    }
}
