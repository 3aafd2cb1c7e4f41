//! Contracts the caching core consumes from the object model.
//!
//! The core never reaches into class internals directly; it resolves methods,
//! classifies receivers and reads invalidation state through these traits so
//! tests can substitute a deterministic implementation.

use std::sync::Arc;

use crate::class::ClassRef;
use crate::method::DynamicMethod;
use crate::switch_point::SwitchPoint;
use crate::value::Value;

/// Result of a full method resolution.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub method: Arc<DynamicMethod>,
    /// The class or module whose table held the method.
    pub defining_class: ClassRef,
}

pub trait MethodTable: Send + Sync {
    /// The receiver's actual class (its singleton class if it has one).
    fn class_of(&self, value: &Value) -> ClassRef;

    /// Searches `start`'s ancestry for `name`. Undefined markers are returned
    /// as found; callers treat them as missing.
    fn resolve(&self, start: &ClassRef, name: &str) -> Option<Resolved>;

    fn kind_of(&self, value: &Value, class: &ClassRef) -> bool;
}

pub trait ClassVersioning: Send + Sync {
    /// Monotonic token that changes whenever the class or any ancestor changes.
    /// Tokens are drawn from one global source, so equal tokens imply the same class.
    fn generation(&self, class: &ClassRef) -> u64;

    /// The class's current switch point; fired and replaced on every change.
    fn invalidator(&self, class: &ClassRef) -> Arc<SwitchPoint>;

    /// Broad signal fired when any builtin immediate class (or an ancestor of
    /// one) changes.
    fn builtin_signal(&self) -> Arc<SwitchPoint>;
}

pub trait ObjectModel: MethodTable + ClassVersioning {}

impl<T: MethodTable + ClassVersioning + ?Sized> ObjectModel for T {}
