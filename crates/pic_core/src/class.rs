//! Classes, modules and singleton classes.
//!
//! Every class owns its method table, a generation token and an invalidation
//! switch point. Both are replaced whenever the class, or anything in its
//! ancestry, changes structurally; see `ClassRegistry::invalidate`.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::RandomState;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::method::DynamicMethod;
use crate::switch_point::SwitchPoint;

/// Identity of a class. Never reused, so it doubles as the receiver shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(NonZeroU32);

impl ClassId {
    /// `None` once the id space is used up.
    pub(crate) fn from_index(index: u32) -> Option<Self> {
        NonZeroU32::MIN.checked_add(index).map(Self)
    }

    /// Ids of the classes a registry boots with.
    pub(crate) fn builtin(index: u8) -> Self {
        Self(NonZeroU32::MIN.saturating_add(u32::from(index)))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Module,
    Singleton,
}

pub type ClassRef = Arc<RClass>;

pub(crate) type MethodMap = IndexMap<Arc<str>, Arc<DynamicMethod>, RandomState>;

pub struct RClass {
    id: ClassId,
    name: Arc<str>,
    kind: ClassKind,
    builtin_immediate: bool,
    superclass: Option<ClassRef>,
    includes: RwLock<Vec<ClassRef>>,
    methods: RwLock<MethodMap>,
    generation: AtomicU64,
    invalidator: RwLock<Arc<SwitchPoint>>,
    /// Subclasses, singleton classes and (for modules) includers.
    dependents: Mutex<Vec<Weak<RClass>>>,
}

impl RClass {
    pub(crate) fn new(
        id: ClassId,
        name: Arc<str>,
        kind: ClassKind,
        superclass: Option<ClassRef>,
        builtin_immediate: bool,
        generation: u64,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            builtin_immediate,
            superclass,
            includes: RwLock::new(Vec::new()),
            methods: RwLock::new(IndexMap::with_hasher(RandomState::new())),
            generation: AtomicU64::new(generation),
            invalidator: RwLock::new(SwitchPoint::new()),
            dependents: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn is_module(&self) -> bool {
        self.kind == ClassKind::Module
    }

    pub fn is_singleton(&self) -> bool {
        self.kind == ClassKind::Singleton
    }

    /// Whether instances are immediates (Integer, Float, Symbol, nil, true, false).
    pub fn is_builtin_immediate(&self) -> bool {
        self.builtin_immediate
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    /// The nearest non-singleton class.
    pub fn real_class(self: &Arc<Self>) -> ClassRef {
        let mut cur = self.clone();
        while cur.is_singleton() {
            match cur.superclass.clone() {
                Some(sup) => cur = sup,
                None => break,
            }
        }
        cur
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn set_generation(&self, token: u64) {
        self.generation.store(token, Ordering::Release);
    }

    #[inline]
    pub fn invalidator(&self) -> Arc<SwitchPoint> {
        self.invalidator.read().clone()
    }

    /// Installs a fresh switch point and returns the one it replaced.
    pub(crate) fn replace_invalidator(&self) -> Arc<SwitchPoint> {
        std::mem::replace(&mut *self.invalidator.write(), SwitchPoint::new())
    }

    pub fn includes(&self) -> Vec<ClassRef> {
        self.includes.read().clone()
    }

    pub(crate) fn push_include(&self, module: ClassRef) {
        self.includes.write().push(module);
    }

    pub fn local_method(&self, name: &str) -> Option<Arc<DynamicMethod>> {
        self.methods.read().get(name).cloned()
    }

    /// Locally defined method names, in definition order.
    pub fn method_names(&self) -> Vec<Arc<str>> {
        self.methods.read().keys().cloned().collect()
    }

    pub(crate) fn methods_mut(&self) -> parking_lot::RwLockWriteGuard<'_, MethodMap> {
        self.methods.write()
    }

    pub(crate) fn add_dependent(&self, dependent: &ClassRef) {
        let mut deps = self.dependents.lock();
        deps.retain(|w| w.strong_count() > 0);
        deps.push(Arc::downgrade(dependent));
    }

    pub(crate) fn dependents(&self) -> Vec<ClassRef> {
        self.dependents.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Method resolution order: the class, its included modules (most recent
    /// first), then the superclass chain.
    pub fn ancestors(self: &Arc<Self>) -> SmallVec<[ClassRef; 8]> {
        let mut out: SmallVec<[ClassRef; 8]> = SmallVec::new();
        let mut cur = Some(self.clone());
        while let Some(class) = cur {
            push_with_includes(&class, &mut out);
            cur = class.superclass.clone();
        }
        out
    }

    pub fn is_ancestor_of(self: &Arc<Self>, other: &ClassRef) -> bool {
        other.ancestors().iter().any(|c| c.id == self.id)
    }
}

fn push_with_includes(class: &ClassRef, out: &mut SmallVec<[ClassRef; 8]>) {
    if out.iter().any(|c| c.id == class.id) {
        return;
    }
    out.push(class.clone());
    for module in class.includes.read().iter().rev() {
        push_with_includes(module, out);
    }
}

impl fmt::Debug for RClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("generation", &self.generation())
            .finish()
    }
}
