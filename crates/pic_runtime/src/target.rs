//! Dispatch targets.
//!
//! A call site's installed strategy is a small tree of `Target`s composed by
//! the builder: guards with a fast path and a fallback, the direct and
//! indirect fast paths themselves, and the two engine re-entry points (relink
//! and the fail tier).

use std::fmt;
use std::sync::Arc;

use pic_core::{Block, CallResult, ClassRef, DynamicMethod, ThreadContext, Value};

use crate::guard::Guard;
use crate::method_missing::{self, MissingKind};
use crate::site::CallSite;

/// Everything a target needs to complete one call.
pub struct Invocation<'a> {
    pub ctx: &'a ThreadContext,
    /// `self` of the calling frame, consulted for protected methods.
    pub caller: &'a Value,
    pub receiver: &'a Value,
    /// The receiver's actual class, computed once per call.
    pub class: &'a ClassRef,
    pub args: &'a [Value],
    pub block: Option<&'a Block>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Relink,
    Guarded,
    Direct,
    Indirect,
    ProtectedCheck,
    FailTier,
}

pub trait Target: Send + Sync {
    fn invoke(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult;

    fn kind(&self) -> TargetKind;
}

pub type TargetRef = Arc<dyn Target>;

impl fmt::Debug for dyn Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Always misses: resolves, rebuilds the site's strategy and completes the call.
pub(crate) struct Relink;

impl Target for Relink {
    fn invoke(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        site.engine().link_and_call(site, inv)
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Relink
    }
}

/// One link of the polymorphic chain.
pub(crate) struct Guarded {
    pub(crate) guard: Guard,
    pub(crate) fast: TargetRef,
    pub(crate) fallback: TargetRef,
}

impl Target for Guarded {
    #[inline]
    fn invoke(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        if self.guard.check(site.engine().model(), inv.receiver, inv.class) {
            self.fast.invoke(site, inv)
        } else {
            self.fallback.invoke(site, inv)
        }
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Guarded
    }
}

/// A fast path bound straight to a method's native entry.
pub(crate) struct Direct<F> {
    f: F,
}

impl<F> Direct<F>
where
    F: Fn(&Invocation<'_>) -> CallResult + Send + Sync + 'static,
{
    pub(crate) fn new_ref(f: F) -> TargetRef {
        Arc::new(Direct { f })
    }
}

impl<F> Target for Direct<F>
where
    F: Fn(&Invocation<'_>) -> CallResult + Send + Sync,
{
    #[inline]
    fn invoke(&self, _site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        (self.f)(inv)
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Direct
    }
}

/// The generic entry point; correct for any method and argument count.
pub(crate) struct Indirect {
    pub(crate) method: Arc<DynamicMethod>,
}

impl Target for Indirect {
    fn invoke(&self, _site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        self.method
            .call(inv.ctx, inv.receiver, inv.args, inv.block)
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Indirect
    }
}

/// Rechecks the caller of a protected method on every call; the receiver's
/// guard alone says nothing about who is calling.
pub(crate) struct ProtectedCheck {
    pub(crate) owner: ClassRef,
    pub(crate) inner: TargetRef,
}

impl Target for ProtectedCheck {
    fn invoke(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        let model = site.engine().model();
        if model.kind_of(inv.caller, &self.owner) {
            self.inner.invoke(site, inv)
        } else {
            site.stats().record_method_missing();
            let kind = MissingKind::Protected;
            method_missing::redirect(model, site.name(), site.call_type(), inv, kind)
        }
    }

    fn kind(&self) -> TargetKind {
        TargetKind::ProtectedCheck
    }
}

/// Megamorphic tier: single cached entry, rechecked directly.
pub(crate) struct FailTier;

impl Target for FailTier {
    fn invoke(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        site.engine().fail_call(site, inv)
    }

    fn kind(&self) -> TargetKind {
        TargetKind::FailTier
    }
}
