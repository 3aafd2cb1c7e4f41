//! One-shot invalidation signals.
//!
//! A switch point starts valid and can be invalidated exactly once. Guards hold
//! an `Arc` to the switch point that was current when they were built and poll
//! it on every call; the owner replaces it with a fresh one after firing, so
//! firing is O(1) no matter how many guards subscribed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct SwitchPoint {
    valid: AtomicBool,
}

impl SwitchPoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Fires the signal. Returns `true` if this call did the invalidation.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for SwitchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchPoint")
            .field("valid", &self.is_valid())
            .finish()
    }
}
