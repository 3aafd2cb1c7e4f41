//! Per-thread execution context.
//!
//! The only state the caching core needs from a thread is its frame stack:
//! a block remembers the frame it was created in, and a `break` out of that
//! block is caught by the call site running in the same frame.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FRAME: AtomicU64 = AtomicU64::new(1);

/// Globally unique frame identity, so blocks handed across threads cannot alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

impl FrameId {
    fn fresh() -> Self {
        FrameId(NEXT_FRAME.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct ThreadContext {
    frames: RefCell<Vec<FrameId>>,
}

impl ThreadContext {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(vec![FrameId::fresh()]),
        }
    }

    #[inline]
    pub fn current_frame(&self) -> FrameId {
        let frames = self.frames.borrow();
        // The root frame is pushed in `new` and never popped.
        frames[frames.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Pushes a frame that is popped when the guard drops, including on unwind.
    pub fn push_frame(&self) -> FrameGuard<'_> {
        let id = FrameId::fresh();
        self.frames.borrow_mut().push(id);
        FrameGuard { ctx: self, id }
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FrameGuard<'a> {
    ctx: &'a ThreadContext,
    id: FrameId,
}

impl FrameGuard<'_> {
    pub fn id(&self) -> FrameId {
        self.id
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let popped = self.ctx.frames.borrow_mut().pop();
        debug_assert_eq!(popped, Some(self.id), "frames must be popped in LIFO order");
    }
}
