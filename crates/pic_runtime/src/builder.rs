//! Strategy construction: fast paths, guards and fallback chains.
//!
//! Binding tries the direct generators in order; the first that accepts the
//! method produces a closure calling its native entry without building an
//! argument collection. Anything else binds through the generic entry point.
//! Both paths raise the same errors for the same calls.

use std::sync::Arc;

use pic_core::{
    DynamicMethod, MethodBody, NativeEntry, RaiseError, Value, Visibility,
    method::{read_ivar, write_ivar},
};

use crate::config::DispatchConfig;
use crate::entry::MethodEntry;
use crate::errors::{IndirectReason, LinkError};
use crate::guard::Guard;
use crate::shape::{CallShape, CallType};
use crate::site::SeenShape;
use crate::target::{
    Direct, FailTier, Guarded, Indirect, Invocation, ProtectedCheck, Relink, TargetRef,
};

/// Outcome of binding a resolved method to a site's argument shape.
pub enum Binding {
    Direct(TargetRef),
    Indirect {
        target: TargetRef,
        reason: IndirectReason,
    },
    /// No direct path and indirect binding is disabled.
    Unbound(IndirectReason),
}

impl Binding {
    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            Binding::Direct(target) | Binding::Indirect { target, .. } => Some(target),
            Binding::Unbound(_) => None,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Binding::Direct(_))
    }

    /// Why the direct path was not taken, if it wasn't.
    pub fn indirect_reason(&self) -> Option<&IndirectReason> {
        match self {
            Binding::Direct(_) => None,
            Binding::Indirect { reason, .. } | Binding::Unbound(reason) => Some(reason),
        }
    }
}

/// Produces a direct fast path for methods it recognizes.
pub trait DirectGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_generate(&self, shape: &CallShape, method: &DynamicMethod) -> bool;

    fn generate(&self, method: &Arc<DynamicMethod>) -> TargetRef;
}

struct AttrReaderGenerator;

impl DirectGenerator for AttrReaderGenerator {
    fn name(&self) -> &'static str {
        "attr_reader"
    }

    fn can_generate(&self, shape: &CallShape, method: &DynamicMethod) -> bool {
        matches!(method.body(), MethodBody::AttrReader(_)) && shape.arity.fixed() == Some(0)
    }

    fn generate(&self, method: &Arc<DynamicMethod>) -> TargetRef {
        let ivar = match method.body() {
            MethodBody::AttrReader(ivar) => ivar.clone(),
            _ => Arc::from(""),
        };
        Direct::new_ref(move |inv| Ok(read_ivar(inv.receiver, &ivar)))
    }
}

struct AttrWriterGenerator;

impl DirectGenerator for AttrWriterGenerator {
    fn name(&self) -> &'static str {
        "attr_writer"
    }

    fn can_generate(&self, shape: &CallShape, method: &DynamicMethod) -> bool {
        matches!(method.body(), MethodBody::AttrWriter(_)) && shape.arity.fixed() == Some(1)
    }

    fn generate(&self, method: &Arc<DynamicMethod>) -> TargetRef {
        let ivar = match method.body() {
            MethodBody::AttrWriter(ivar) => ivar.clone(),
            _ => Arc::from(""),
        };
        Direct::new_ref(move |inv| match inv.args {
            [value] => write_ivar(inv.receiver, &ivar, value),
            _ => Err(RaiseError::argument_count(inv.args.len(), 1).into()),
        })
    }
}

/// Frameless native methods whose fixed argument count equals the site's.
struct FixedArityGenerator;

impl DirectGenerator for FixedArityGenerator {
    fn name(&self) -> &'static str {
        "native_fixed"
    }

    fn can_generate(&self, shape: &CallShape, method: &DynamicMethod) -> bool {
        match method.body() {
            MethodBody::Native(entry) => {
                entry.arg_count().is_some() && entry.arg_count() == shape.arity.fixed()
            }
            _ => false,
        }
    }

    fn generate(&self, method: &Arc<DynamicMethod>) -> TargetRef {
        let MethodBody::Native(entry) = method.body() else {
            return Arc::new(Indirect {
                method: method.clone(),
            });
        };
        match entry.clone() {
            NativeEntry::Fixed0(f) => Direct::new_ref(move |inv| match inv.args {
                [] => f(inv.ctx, inv.receiver, inv.block),
                _ => Err(RaiseError::argument_count(inv.args.len(), 0).into()),
            }),
            NativeEntry::Fixed1(f) => Direct::new_ref(move |inv| match inv.args {
                [a] => f(inv.ctx, inv.receiver, a, inv.block),
                _ => Err(RaiseError::argument_count(inv.args.len(), 1).into()),
            }),
            NativeEntry::Fixed2(f) => Direct::new_ref(move |inv| match inv.args {
                [a, b] => f(inv.ctx, inv.receiver, a, b, inv.block),
                _ => Err(RaiseError::argument_count(inv.args.len(), 2).into()),
            }),
            NativeEntry::Fixed3(f) => Direct::new_ref(move |inv| match inv.args {
                [a, b, c] => f(inv.ctx, inv.receiver, a, b, c, inv.block),
                _ => Err(RaiseError::argument_count(inv.args.len(), 3).into()),
            }),
            NativeEntry::Varargs(_) => Arc::new(Indirect {
                method: method.clone(),
            }),
        }
    }
}

/// Frameless varargs natives, with the arity check the generic entry would do.
struct VarargsGenerator;

impl DirectGenerator for VarargsGenerator {
    fn name(&self) -> &'static str {
        "native_varargs"
    }

    fn can_generate(&self, _shape: &CallShape, method: &DynamicMethod) -> bool {
        matches!(method.body(), MethodBody::Native(NativeEntry::Varargs(_)))
    }

    fn generate(&self, method: &Arc<DynamicMethod>) -> TargetRef {
        let MethodBody::Native(NativeEntry::Varargs(f)) = method.body() else {
            return Arc::new(Indirect {
                method: method.clone(),
            });
        };
        let f = f.clone();
        let arity = method.arity();
        Direct::new_ref(move |inv| {
            arity.check(inv.args.len())?;
            f(inv.ctx, inv.receiver, inv.args, inv.block)
        })
    }
}

pub struct StrategyBuilder {
    config: DispatchConfig,
    generators: Vec<Box<dyn DirectGenerator>>,
    relink: TargetRef,
    fail: TargetRef,
}

impl StrategyBuilder {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            generators: vec![
                Box::new(AttrReaderGenerator),
                Box::new(AttrWriterGenerator),
                Box::new(FixedArityGenerator),
                Box::new(VarargsGenerator),
            ],
            relink: Arc::new(Relink),
            fail: Arc::new(FailTier),
        }
    }

    /// The initial target of every site, and the tail of every chain.
    pub fn relink(&self) -> TargetRef {
        self.relink.clone()
    }

    pub fn fail(&self) -> TargetRef {
        self.fail.clone()
    }

    /// Tries every direct generator for the (alias-unwrapped) method.
    pub fn direct(
        &self,
        shape: &CallShape,
        method: &Arc<DynamicMethod>,
    ) -> Result<TargetRef, IndirectReason> {
        if !self.config.enable_direct_dispatch {
            return Err(IndirectReason::DirectDisabled);
        }
        let native = method.native_shape().ok_or(IndirectReason::NoNativeEntry)?;
        if native.needs_frame {
            return Err(IndirectReason::NeedsFrame);
        }
        self.generators
            .iter()
            .find(|g| g.can_generate(shape, method))
            .map(|g| {
                tracing::trace!(method = method.name(), generator = g.name(), "direct binding");
                g.generate(method)
            })
            .ok_or_else(|| IndirectReason::ArityMismatch {
                site: shape.arity,
                method: method.arity().to_string(),
            })
    }

    pub fn indirect(&self, method: &Arc<DynamicMethod>) -> TargetRef {
        Arc::new(Indirect {
            method: method.clone(),
        })
    }

    /// Chooses the fast path for `entry` at a site of `shape`.
    pub fn bind(&self, shape: &CallShape, entry: &MethodEntry) -> Result<Binding, LinkError> {
        if entry.method.is_undefined() {
            return Err(LinkError::UndefinedMarker(entry.method.name().to_string()));
        }
        let real = entry.method.real_method();
        let binding = match self.direct(shape, &real) {
            Ok(target) => Binding::Direct(target),
            Err(reason) => {
                tracing::trace!(method = entry.method.name(), %reason, "indirect binding");
                if self.config.enable_indirect_binding {
                    Binding::Indirect {
                        target: self.indirect(&real),
                        reason,
                    }
                } else {
                    Binding::Unbound(reason)
                }
            }
        };
        if shape.call_type == CallType::Normal && entry.visibility() == Visibility::Protected {
            return Ok(self.protect(binding, entry));
        }
        Ok(binding)
    }

    fn protect(&self, binding: Binding, entry: &MethodEntry) -> Binding {
        let wrap = |inner: TargetRef| -> TargetRef {
            Arc::new(ProtectedCheck {
                owner: entry.defining_class.real_class(),
                inner,
            })
        };
        match binding {
            Binding::Direct(target) => Binding::Direct(wrap(target)),
            Binding::Indirect { target, reason } => Binding::Indirect {
                target: wrap(target),
                reason,
            },
            unbound @ Binding::Unbound(_) => unbound,
        }
    }

    pub fn guard(&self, entry: &MethodEntry, receiver: &Value) -> Guard {
        Guard::for_entry(entry, receiver, self.config.guard_policy)
    }

    /// A chain link guarding `fast` on the receiver shape `entry` was
    /// resolved against.
    pub(crate) fn link(
        &self,
        entry: &Arc<MethodEntry>,
        inv: &Invocation<'_>,
        fast: TargetRef,
    ) -> Result<SeenShape, LinkError> {
        if entry.receiver_class != inv.class.id() {
            return Err(LinkError::ShapeMismatch {
                name: entry.method.name().to_string(),
                expected: entry.receiver_class.to_string(),
                actual: inv.class.name().to_string(),
            });
        }
        Ok(SeenShape {
            class: entry.receiver_class,
            entry: entry.clone(),
            guard: self.guard(entry, inv.receiver),
            fast,
        })
    }

    /// Folds the links, most recent first, into one guarded chain ending in
    /// relink.
    pub(crate) fn chain(&self, links: &[SeenShape]) -> TargetRef {
        links.iter().rev().fold(self.relink(), |fallback, link| -> TargetRef {
            Arc::new(Guarded {
                guard: link.guard.clone(),
                fast: link.fast.clone(),
                fallback,
            })
        })
    }
}
