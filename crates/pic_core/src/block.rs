//! Trailing blocks passed to calls.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::context::{FrameId, ThreadContext};
use crate::unwind::{BreakJump, CallResult, RaiseError, Unwind};
use crate::value::Value;

pub type BlockFn = Arc<dyn Fn(&ThreadContext, &Block, &[Value]) -> CallResult + Send + Sync>;

pub struct Block {
    home: FrameId,
    body: BlockFn,
    escaped: AtomicBool,
    escapes: AtomicU32,
}

impl Block {
    /// Creates a block whose `break` targets the context's current frame.
    pub fn new<F>(ctx: &ThreadContext, body: F) -> Self
    where
        F: Fn(&ThreadContext, &Block, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self {
            home: ctx.current_frame(),
            body: Arc::new(body),
            escaped: AtomicBool::new(false),
            escapes: AtomicU32::new(0),
        }
    }

    /// The frame a `break` out of this block returns to.
    pub fn home(&self) -> FrameId {
        self.home
    }

    pub fn yield_values(&self, ctx: &ThreadContext, args: &[Value]) -> CallResult {
        match (self.body)(ctx, self, args) {
            Err(Unwind::Break(jump)) if jump.target == self.home && self.is_escaped() => Err(
                RaiseError::local_jump("break from proc-closure").into(),
            ),
            other => other,
        }
    }

    /// Builds the unwind a `break value` inside this block raises.
    pub fn break_with(&self, value: Value) -> Unwind {
        Unwind::Break(BreakJump {
            target: self.home,
            value,
        })
    }

    /// Marks the block as no longer a valid break target.
    pub fn escape(&self) {
        self.escaped.store(true, Ordering::Release);
        self.escapes.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_escaped(&self) -> bool {
        self.escaped.load(Ordering::Acquire)
    }

    /// How many times `escape` ran; one per call the block was written at.
    pub fn escape_count(&self) -> u32 {
        self.escapes.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("home", &self.home)
            .field("escaped", &self.is_escaped())
            .finish()
    }
}
