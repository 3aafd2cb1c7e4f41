//! Resolution snapshots.

use std::sync::Arc;

use pic_core::{
    ClassId, ClassRef, ClassVersioning, DynamicMethod, NativeShape, ObjectModel, Resolved,
    SwitchPoint, Visibility,
};

/// Invalidation state of a receiver class, captured before resolving so that a
/// concurrent mutation always leaves the stamp stale rather than the cache wrong.
#[derive(Clone, Debug)]
pub struct Stamp {
    pub token: u64,
    pub signal: Arc<SwitchPoint>,
    /// Set for immediate receivers, whose class cannot be told apart by identity.
    pub builtin_signal: Option<Arc<SwitchPoint>>,
}

impl Stamp {
    pub fn take(model: &dyn ObjectModel, class: &ClassRef, immediate: bool) -> Self {
        Self {
            token: model.generation(class),
            signal: model.invalidator(class),
            builtin_signal: immediate.then(|| model.builtin_signal()),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.signal.is_valid() && self.builtin_signal.as_ref().is_none_or(|s| s.is_valid())
    }
}

/// One resolution of a name against a receiver class. Never mutated; a miss
/// always produces a new entry.
#[derive(Debug)]
pub struct MethodEntry {
    /// The method as found, before alias unwrapping.
    pub method: Arc<DynamicMethod>,
    pub defining_class: ClassRef,
    pub receiver_class: ClassId,
    pub stamp: Stamp,
}

impl MethodEntry {
    pub fn new(resolved: Resolved, receiver_class: &ClassRef, stamp: Stamp) -> Self {
        Self {
            method: resolved.method,
            defining_class: resolved.defining_class,
            receiver_class: receiver_class.id(),
            stamp,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.method.visibility()
    }

    pub fn native_shape(&self) -> Option<NativeShape> {
        self.method.native_shape()
    }

    pub fn token(&self) -> u64 {
        self.stamp.token
    }

    /// Both entries found the same body in the same class, so a stale stamp
    /// on `self` reflects a change elsewhere in the ancestry.
    pub fn same_resolution(&self, other: &MethodEntry) -> bool {
        Arc::ptr_eq(&self.method, &other.method)
            && self.defining_class.id() == other.defining_class.id()
    }

    /// Still the right answer for a receiver of `class`. Tokens are unique
    /// across classes, so a token match alone pins both class and version.
    #[inline]
    pub fn type_ok(&self, model: &dyn ObjectModel, class: &ClassRef) -> bool {
        class.id() == self.receiver_class
            && model.generation(class) == self.stamp.token
            && self.stamp.is_valid()
    }
}
