//! Call sites and their cache state.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use smallvec::SmallVec;

use pic_core::{Block, CallResult, ClassId, ThreadContext, Value};

use crate::config::DispatchConfig;
use crate::diagnostics::{SiteSnapshot, SiteStats};
use crate::engine::DispatchEngine;
use crate::entry::MethodEntry;
use crate::guard::Guard;
use crate::shape::{Arity, CallShape, CallType};
use crate::target::{TargetKind, TargetRef};

/// Diagnostic identity of a site.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiteId {
    pub serial: u64,
    pub file: Arc<str>,
    pub line: u32,
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.file, self.line, self.serial)
    }
}

/// What generated code knows about a call when it creates the site.
#[derive(Clone, Debug)]
pub struct SiteDescriptor {
    pub name: Arc<str>,
    pub shape: CallShape,
    pub file: Arc<str>,
    pub line: u32,
    /// `recv.attr = value` used as an expression evaluates to `value`.
    pub attr_assign: bool,
    /// The block is written at this site (`each { .. }`) rather than
    /// forwarded (`each(&b)`); only such a site escapes it and catches its
    /// breaks.
    pub literal_block: bool,
}

impl SiteDescriptor {
    pub fn new(name: &str, arity: Arity, call_type: CallType) -> Self {
        Self {
            name: Arc::from(name),
            shape: CallShape::new(arity, call_type),
            file: Arc::from("<unknown>"),
            line: 0,
            attr_assign: false,
            literal_block: false,
        }
    }

    /// A forwarded block argument.
    pub fn with_block(mut self) -> Self {
        self.shape = self.shape.with_block();
        self
    }

    pub fn with_literal_block(mut self) -> Self {
        self.literal_block = true;
        self.with_block()
    }

    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.file = Arc::from(file);
        self.line = line;
        self
    }

    pub fn attr_assign(mut self) -> Self {
        self.attr_assign = true;
        self
    }
}

/// Cache tier. Only moves forward, except through `CallSite::clear`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Unlinked,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

/// A receiver class the chain has a link for.
pub(crate) struct SeenShape {
    pub(crate) class: ClassId,
    pub(crate) entry: Arc<MethodEntry>,
    pub(crate) guard: Guard,
    pub(crate) fast: TargetRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    /// First link of an unlinked site.
    Bind,
    /// Replace the only link of a monomorphic site whose class changed.
    Rebind,
    /// Re-guard a known class whose stamp went stale but which still
    /// resolves to the same method.
    Refresh,
    /// Prepend a link for a new class.
    Extend,
    /// Stop chaining; install the fail tier.
    Fail,
}

pub(crate) struct SiteState {
    pub(crate) tier: Tier,
    pub(crate) seen: SmallVec<[SeenShape; 8]>,
    pub(crate) rebinds: usize,
}

impl SiteState {
    fn new() -> Self {
        Self {
            tier: Tier::Unlinked,
            seen: SmallVec::new(),
            rebinds: 0,
        }
    }

    pub(crate) fn seen(&self, class: ClassId) -> Option<&SeenShape> {
        self.seen.iter().find(|s| s.class == class)
    }

    /// A class that reappears went stale since it was linked. If it still
    /// resolves to the same method the link is refreshed in place; a real
    /// change rebinds a monomorphic site and degrades a polymorphic one. Both
    /// draw on the rebind budget.
    pub(crate) fn plan(&self, entry: &MethodEntry, config: &DispatchConfig) -> Plan {
        match self.tier {
            Tier::Unlinked => Plan::Bind,
            Tier::Megamorphic => Plan::Fail,
            Tier::Monomorphic | Tier::Polymorphic => match self.seen(entry.receiver_class) {
                Some(_) if self.rebinds >= config.max_rebind_count => Plan::Fail,
                Some(seen) if seen.entry.same_resolution(entry) => Plan::Refresh,
                Some(_) if self.tier == Tier::Monomorphic => Plan::Rebind,
                Some(_) => Plan::Fail,
                None if self.seen.len() >= config.max_polymorphic_degree => Plan::Fail,
                None => Plan::Extend,
            },
        }
    }

    pub(crate) fn apply(&mut self, plan: Plan, shape: SeenShape) {
        match plan {
            Plan::Bind => {
                self.tier = Tier::Monomorphic;
                self.seen.clear();
                self.seen.push(shape);
            }
            Plan::Rebind => {
                self.rebinds += 1;
                self.seen.clear();
                self.seen.push(shape);
            }
            Plan::Refresh => {
                self.rebinds += 1;
                if let Some(slot) = self.seen.iter_mut().find(|s| s.class == shape.class) {
                    *slot = shape;
                }
            }
            Plan::Extend => {
                self.tier = Tier::Polymorphic;
                self.seen.insert(0, shape);
            }
            Plan::Fail => self.tier = Tier::Megamorphic,
        }
    }
}

pub struct CallSite {
    id: SiteId,
    name: Arc<str>,
    shape: CallShape,
    attr_assign: bool,
    literal_block: bool,
    engine: Arc<DispatchEngine>,
    target: RwLock<TargetRef>,
    state: Mutex<SiteState>,
    cached_entry: RwLock<Option<Arc<MethodEntry>>>,
    stats: SiteStats,
}

impl CallSite {
    /// Creates a site registered with `engine`.
    pub fn new(engine: &Arc<DispatchEngine>, name: &str, shape: CallShape) -> Arc<Self> {
        let mut desc = SiteDescriptor::new(name, shape.arity, shape.call_type);
        desc.shape = shape;
        engine.call_site(desc)
    }

    pub(crate) fn from_descriptor(
        engine: Arc<DispatchEngine>,
        serial: u64,
        desc: SiteDescriptor,
    ) -> Self {
        let relink = engine.builder().relink();
        Self {
            id: SiteId {
                serial,
                file: desc.file,
                line: desc.line,
            },
            name: desc.name,
            shape: desc.shape,
            attr_assign: desc.attr_assign,
            literal_block: desc.literal_block,
            engine,
            target: RwLock::new(relink),
            state: Mutex::new(SiteState::new()),
            cached_entry: RwLock::new(None),
            stats: SiteStats::default(),
        }
    }

    /// The single entry point generated code calls. `caller` is `self` of the
    /// calling frame.
    pub fn invoke(
        &self,
        ctx: &ThreadContext,
        caller: &Value,
        receiver: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> CallResult {
        debug_assert!(
            self.shape.arity.accepts(args.len()),
            "{}: {} arguments passed to a site of arity {}",
            self.id,
            args.len(),
            self.shape.arity
        );
        self.engine.dispatch(self, ctx, caller, receiver, args, block)
    }

    /// Forgets every shape; the next call relinks from scratch.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = SiteState::new();
        *self.cached_entry.write() = None;
        self.install(self.engine.builder().relink());
        tracing::debug!(site = %self.id, method = %self.name, "call site cleared");
    }

    pub fn id(&self) -> &SiteId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &CallShape {
        &self.shape
    }

    pub fn call_type(&self) -> CallType {
        self.shape.call_type
    }

    pub fn is_attr_assign(&self) -> bool {
        self.attr_assign
    }

    pub fn has_literal_block(&self) -> bool {
        self.literal_block
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    pub fn stats(&self) -> &SiteStats {
        &self.stats
    }

    pub fn tier(&self) -> Tier {
        self.state.lock().tier
    }

    /// Classes linked into the chain, most recent first.
    pub fn seen_shapes(&self) -> Vec<ClassId> {
        self.state.lock().seen.iter().map(|s| s.class).collect()
    }

    pub fn rebind_count(&self) -> usize {
        self.state.lock().rebinds
    }

    pub fn cached_entry(&self) -> Option<Arc<MethodEntry>> {
        self.cached_entry.read().clone()
    }

    #[inline]
    pub fn current_target(&self) -> TargetRef {
        self.target.read().clone()
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target.read().kind()
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        let (tier, shapes_seen) = {
            let state = self.state.lock();
            (state.tier, state.seen.len())
        };
        let s = &self.stats;
        SiteSnapshot {
            id: self.id.clone(),
            name: self.name.to_string(),
            shape: self.shape,
            tier,
            target: self.target_kind(),
            shapes_seen,
            invocations: s.invocations(),
            misses: s.misses(),
            binds: s.binds(),
            rebinds: s.rebinds(),
            extends: s.extends(),
            fail_transitions: s.fail_transitions(),
            fail_hits: s.fail_hits(),
            fail_misses: s.fail_misses(),
            direct_binds: s.direct_binds(),
            indirect_binds: s.indirect_binds(),
            method_missing: s.method_missing(),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock()
    }

    /// Publishes a fully built strategy. Callers hold the state lock.
    pub(crate) fn install(&self, target: TargetRef) {
        *self.target.write() = target;
    }

    pub(crate) fn set_cached_entry(&self, entry: Arc<MethodEntry>) {
        *self.cached_entry.write() = Some(entry);
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardPolicy;
    use pic_core::{ClassRegistry, DynamicMethod, MethodTable, Resolved};

    struct Noop;

    impl crate::target::Target for Noop {
        fn invoke(&self, _: &CallSite, _: &crate::target::Invocation<'_>) -> CallResult {
            Ok(Value::Nil)
        }

        fn kind(&self) -> TargetKind {
            TargetKind::Direct
        }
    }

    fn resolve(registry: &ClassRegistry, name: &str) -> Arc<MethodEntry> {
        let class = registry.define_class(name, None).unwrap();
        let found = registry.resolve(&class, "m").unwrap_or_else(|| {
            let method = registry.define_method(
                &class,
                DynamicMethod::native0("m", |_, _, _| Ok(Value::Nil)),
            );
            Resolved {
                method,
                defining_class: class.clone(),
            }
        });
        let stamp = crate::entry::Stamp::take(registry, &class, false);
        Arc::new(MethodEntry::new(found, &class, stamp))
    }

    fn shape(entry: &Arc<MethodEntry>) -> SeenShape {
        SeenShape {
            class: entry.receiver_class,
            entry: entry.clone(),
            guard: Guard::for_entry(entry, &Value::Nil, GuardPolicy::Generation),
            fast: Arc::new(Noop),
        }
    }

    #[test]
    fn plan_walks_tiers_forward() {
        let registry = ClassRegistry::new();
        let config = DispatchConfig {
            max_polymorphic_degree: 2,
            max_rebind_count: 2,
            ..DispatchConfig::default()
        };
        let mut state = SiteState::new();
        let a = resolve(&registry, "A");
        assert_eq!(state.plan(&a, &config), Plan::Bind);
        state.apply(Plan::Bind, shape(&a));
        assert_eq!(state.tier, Tier::Monomorphic);

        // Same class, same method: refreshed in place.
        let again = resolve(&registry, "A");
        assert_eq!(state.plan(&again, &config), Plan::Refresh);
        state.apply(Plan::Refresh, shape(&again));
        assert_eq!(state.tier, Tier::Monomorphic);

        let b = resolve(&registry, "B");
        assert_eq!(state.plan(&b, &config), Plan::Extend);
        state.apply(Plan::Extend, shape(&b));
        assert_eq!(state.tier, Tier::Polymorphic);
        assert_eq!(state.seen[0].class, b.receiver_class);

        let c = resolve(&registry, "C");
        assert_eq!(state.plan(&c, &config), Plan::Fail);
    }

    #[test]
    fn changed_resolution_rebinds_monomorphic_and_fails_polymorphic() {
        let registry = ClassRegistry::new();
        let config = DispatchConfig {
            max_rebind_count: 1,
            ..DispatchConfig::default()
        };
        let mut state = SiteState::new();
        let a = resolve(&registry, "A");
        state.apply(Plan::Bind, shape(&a));

        let class = registry.define_class("A", None).unwrap();
        registry.define_method(&class, DynamicMethod::native0("m", |_, _, _| Ok(Value::Int(1))));
        let changed = resolve(&registry, "A");
        assert_eq!(state.plan(&changed, &config), Plan::Rebind);
        state.apply(Plan::Rebind, shape(&changed));
        // Budget spent: even an unchanged resolution now degrades.
        assert_eq!(state.plan(&resolve(&registry, "A"), &config), Plan::Fail);

        let mut poly = SiteState::new();
        poly.apply(Plan::Bind, shape(&changed));
        poly.apply(Plan::Extend, shape(&resolve(&registry, "B")));
        registry.define_method(&class, DynamicMethod::native0("m", |_, _, _| Ok(Value::Int(2))));
        assert_eq!(poly.plan(&resolve(&registry, "A"), &config), Plan::Fail);
    }
}
