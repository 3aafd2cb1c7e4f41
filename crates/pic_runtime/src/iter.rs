//! Call protocol around every dispatch: block escape, break and retry
//! handling, and the value of attribute-assignment expressions.

use pic_core::{Block, CallResult, RaiseError, ThreadContext, Unwind, Value};

/// Marks a literal block escaped when dropped, whichever way the call exits.
/// Forwarded blocks stay live: their owner may still yield to them.
struct BlockScope<'a> {
    block: Option<&'a Block>,
}

impl Drop for BlockScope<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            block.escape();
        }
    }
}

/// Runs `call` under the protocol shared by cached and uncached dispatch.
/// Only a site written with a literal block owns it: that site escapes the
/// block and catches breaks out of it.
pub(crate) fn call_protocol(
    ctx: &ThreadContext,
    args: &[Value],
    block: Option<&Block>,
    literal_block: bool,
    attr_assign: bool,
    call: impl FnOnce() -> CallResult,
) -> CallResult {
    let owned = block.filter(|_| literal_block);
    let _scope = BlockScope { block: owned };
    let result = match call() {
        Err(Unwind::Break(jump)) => handle_break(ctx, owned, jump.target, jump.value),
        Err(Unwind::Retry) => {
            Err(RaiseError::local_jump("retry outside of rescue not supported").into())
        }
        other => other,
    };
    if attr_assign {
        result.map(|_| args.last().cloned().unwrap_or(Value::Nil))
    } else {
        result
    }
}

/// A break addressed to the calling frame ends this call with its value when
/// the call owns a literal block; any other break keeps unwinding.
fn handle_break(
    ctx: &ThreadContext,
    block: Option<&Block>,
    target: pic_core::FrameId,
    value: Value,
) -> CallResult {
    if block.is_some() && target == ctx.current_frame() {
        Ok(value)
    } else {
        Err(Unwind::Break(pic_core::BreakJump { target, value }))
    }
}
