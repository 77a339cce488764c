//! Lifecycle tracker for the session's held value
//!
//! The session keeps exactly one engine reference alive between pulls: the
//! last output. The engine may hold references to the same value, and a
//! caller may take extra ones through [`RunSession::current_handle`]. Before
//! the held reference is overwritten, the tracker compares the count seen at
//! capture time with the count seen now:
//!
//! - equal: nobody took or dropped a reference meanwhile, so ours is released
//! - different: the release is skipped and the slot is simply overwritten
//!
//! A skipped release can leak one reference; it can never release a value a
//! second time.
//!
//! [`RunSession::current_handle`]: crate::session::RunSession::current_handle

use log::debug;

use crate::engine::{Heap, Jv};

/// Outcome of settling a held value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Released,
    Skipped { captured: usize, observed: usize },
}

/// Ownership token for one engine reference plus the count observed when it
/// was captured. Not `Clone`: each token is settled or released exactly once.
#[derive(Debug)]
#[must_use = "a tracked value must be settled or released"]
pub struct TrackedValue {
    handle: Jv,
    captured_refcount: usize,
}

impl TrackedValue {
    /// Take ownership of `handle`, recording its current count
    pub fn capture(heap: &Heap, handle: Jv) -> Self {
        Self {
            handle,
            captured_refcount: heap.refcount(handle),
        }
    }

    pub fn handle(&self) -> Jv {
        self.handle
    }

    pub fn captured_refcount(&self) -> usize {
        self.captured_refcount
    }

    /// Release the reference if its count is unchanged since capture
    pub fn settle(self, heap: &mut Heap) -> Settlement {
        let observed = heap.refcount(self.handle);
        if observed == self.captured_refcount {
            heap.free(self.handle);
            Settlement::Released
        } else {
            Settlement::Skipped {
                captured: self.captured_refcount,
                observed,
            }
        }
    }

    /// Release the reference unconditionally, if the value is still live
    pub fn release(self, heap: &mut Heap) {
        if heap.is_live(self.handle) {
            heap.free(self.handle);
        }
    }
}

/// The session's single held-value slot
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    current: Option<TrackedValue>,
    skipped: usize,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle currently held, if any
    pub fn current(&self) -> Option<Jv> {
        self.current.as_ref().map(TrackedValue::handle)
    }

    /// Settle and empty the slot. No-op on an empty slot.
    pub fn settle(&mut self, heap: &mut Heap) -> Option<Settlement> {
        let tracked = self.current.take()?;
        let settlement = tracked.settle(heap);
        if let Settlement::Skipped { captured, observed } = settlement {
            self.skipped += 1;
            debug!(
                "skipped release of held value: refcount {} at capture, {} now",
                captured, observed
            );
        }
        Some(settlement)
    }

    /// Hold `handle` (an owned reference), settling whatever was held before
    pub fn capture(&mut self, heap: &mut Heap, handle: Jv) {
        self.settle(heap);
        self.current = Some(TrackedValue::capture(heap, handle));
    }

    /// Release and empty the slot regardless of counts. No-op when empty.
    pub fn release(&mut self, heap: &mut Heap) {
        if let Some(tracked) = self.current.take() {
            tracked.release(heap);
        }
    }

    /// Number of releases skipped because a count had changed
    pub fn skipped_releases(&self) -> usize {
        self.skipped
    }
}
