//! The dispatch engine: per-site tier state machine.
//!
//! Sites start with a relink target. A miss resolves the name against the
//! receiver's class, builds a `MethodEntry` and plans the next tier:
//!
//! - Unlinked: bind one guarded link in front of relink (Monomorphic).
//! - New class: prepend a link to the existing chain (Polymorphic) until the
//!   chain holds `max_polymorphic_degree` classes.
//! - Known class that missed: its stamp went stale. If it still resolves to
//!   the same method its link is refreshed; a changed monomorphic site
//!   rebinds in place; a changed polymorphic site degrades. Refreshes and
//!   rebinds share the `max_rebind_count` budget.
//! - Degraded (Megamorphic): a single cached entry rechecked on every call.
//!
//! The miss that links also completes the call. Targets are published whole
//! under the site's state lock; method bodies always run outside it.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use pic_core::{Block, CallResult, ObjectModel, ThreadContext, Value};

use crate::builder::StrategyBuilder;
use crate::config::DispatchConfig;
use crate::diagnostics::EngineReport;
use crate::entry::{MethodEntry, Stamp};
use crate::errors::LinkError;
use crate::iter;
use crate::method_missing::{self, MissingKind};
use crate::site::{CallSite, Plan, SiteDescriptor, Tier};
use crate::target::{Invocation, TargetRef};

pub struct DispatchEngine {
    model: Arc<dyn ObjectModel>,
    config: DispatchConfig,
    builder: StrategyBuilder,
    sites: Mutex<Vec<Weak<CallSite>>>,
    next_site: AtomicU64,
}

impl DispatchEngine {
    pub fn new(model: Arc<dyn ObjectModel>, config: DispatchConfig) -> Arc<Self> {
        Arc::new(Self {
            model,
            builder: StrategyBuilder::new(config),
            config,
            sites: Mutex::new(Vec::new()),
            next_site: AtomicU64::new(1),
        })
    }

    #[inline]
    pub fn model(&self) -> &dyn ObjectModel {
        &*self.model
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn builder(&self) -> &StrategyBuilder {
        &self.builder
    }

    /// Creates an unlinked site and registers it for reports and `clear_all`.
    pub fn call_site(self: &Arc<Self>, desc: SiteDescriptor) -> Arc<CallSite> {
        let serial = self.next_site.fetch_add(1, Ordering::Relaxed);
        let site = Arc::new(CallSite::from_descriptor(self.clone(), serial, desc));
        let mut sites = self.sites.lock();
        sites.retain(|w| w.strong_count() > 0);
        sites.push(Arc::downgrade(&site));
        site
    }

    pub fn live_sites(&self) -> Vec<Arc<CallSite>> {
        self.sites.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Runs a call through the site's installed target.
    pub fn dispatch(
        &self,
        site: &CallSite,
        ctx: &ThreadContext,
        caller: &Value,
        receiver: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> CallResult {
        site.stats().record_invocation();
        let class = self.model.class_of(receiver);
        let inv = Invocation {
            ctx,
            caller,
            receiver,
            class: &class,
            args,
            block,
        };
        let target = site.current_target();
        let (literal, attr_assign) = (site.has_literal_block(), site.is_attr_assign());
        iter::call_protocol(ctx, args, block, literal, attr_assign, || {
            target.invoke(site, &inv)
        })
    }

    /// Full resolution with no caching: what any cached call must be
    /// indistinguishable from.
    pub fn dispatch_uncached(
        &self,
        desc: &SiteDescriptor,
        ctx: &ThreadContext,
        caller: &Value,
        receiver: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> CallResult {
        let class = self.model.class_of(receiver);
        let inv = Invocation {
            ctx,
            caller,
            receiver,
            class: &class,
            args,
            block,
        };
        let call_type = desc.shape.call_type;
        let model = self.model();
        iter::call_protocol(ctx, args, block, desc.literal_block, desc.attr_assign, || {
            match method_missing::resolve_callable(model, &desc.name, call_type, caller, &class) {
                Ok(found) => found.method.call(ctx, receiver, args, block),
                Err(kind) => method_missing::redirect(model, &desc.name, call_type, &inv, kind),
            }
        })
    }

    /// Slow path behind every chain: resolve, relink the site, complete the call.
    pub(crate) fn link_and_call(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        site.stats().record_miss();
        let entry = match self.lookup(site, inv) {
            Ok(entry) => entry,
            Err(kind) => return self.method_missing(site, inv, kind),
        };
        match self.update_invocation_target(site, inv, &entry) {
            Some(fast) => fast.invoke(site, inv),
            None => self.call_entry(site, inv, &entry),
        }
    }

    /// The fail tier: one cached entry, checked against the receiver's class
    /// directly, with full resolution on mismatch.
    pub(crate) fn fail_call(&self, site: &CallSite, inv: &Invocation<'_>) -> CallResult {
        if let Some(entry) = site.cached_entry() {
            if entry.type_ok(self.model(), inv.class) {
                site.stats().record_fail_hit();
                return self.call_entry(site, inv, &entry);
            }
        }
        site.stats().record_fail_miss();
        let entry = match self.lookup(site, inv) {
            Ok(entry) => entry,
            Err(kind) => return self.method_missing(site, inv, kind),
        };
        site.set_cached_entry(entry.clone());
        self.call_entry(site, inv, &entry)
    }

    fn lookup(
        &self,
        site: &CallSite,
        inv: &Invocation<'_>,
    ) -> Result<Arc<MethodEntry>, MissingKind> {
        let stamp = Stamp::take(self.model(), inv.class, inv.receiver.kind().is_immediate());
        let found = method_missing::resolve_callable(
            self.model(),
            site.name(),
            site.call_type(),
            inv.caller,
            inv.class,
        )?;
        Ok(Arc::new(MethodEntry::new(found, inv.class, stamp)))
    }

    fn method_missing(
        &self,
        site: &CallSite,
        inv: &Invocation<'_>,
        kind: MissingKind,
    ) -> CallResult {
        site.stats().record_method_missing();
        if self.config.log_binding_decisions {
            tracing::debug!(
                site = %site.id(),
                method = site.name(),
                class = inv.class.name(),
                ?kind,
                "method_missing redirect"
            );
        }
        method_missing::redirect(self.model(), site.name(), site.call_type(), inv, kind)
    }

    /// Calls an entry through the generic entry point, rechecking visibility
    /// since the entry may have been cached for another caller.
    fn call_entry(&self, site: &CallSite, inv: &Invocation<'_>, entry: &MethodEntry) -> CallResult {
        if let Some(kind) = method_missing::visibility_denied(
            self.model(),
            site.name(),
            site.call_type(),
            inv.caller,
            &entry.method,
            &entry.defining_class,
        ) {
            return self.method_missing(site, inv, kind);
        }
        entry.method.call(inv.ctx, inv.receiver, inv.args, inv.block)
    }

    /// Plans and installs the site's next strategy. Returns the fast path to
    /// complete this call with, or `None` when the call should go through the
    /// entry directly (fail tier).
    fn update_invocation_target(
        &self,
        site: &CallSite,
        inv: &Invocation<'_>,
        entry: &Arc<MethodEntry>,
    ) -> Option<TargetRef> {
        let class = inv.class.id();
        let mut state = site.lock_state();

        // Another thread linked this class while we were resolving.
        if let Some(seen) = state.seen(class) {
            if state.tier != Tier::Megamorphic && seen.entry.type_ok(self.model(), inv.class) {
                return Some(seen.fast.clone());
            }
        }
        if state.tier == Tier::Megamorphic {
            site.set_cached_entry(entry.clone());
            return None;
        }

        let binding = self
            .builder
            .bind(site.shape(), entry)
            .unwrap_or_else(|err| link_failed(site, err));
        let plan = state.plan(entry, &self.config);
        let fast = match (plan, binding.target()) {
            (Plan::Fail, _) | (_, None) => {
                state.tier = Tier::Megamorphic;
                site.set_cached_entry(entry.clone());
                site.install(self.builder.fail());
                site.stats().record_fail_transition();
                if self.config.log_binding_decisions {
                    tracing::debug!(
                        site = %site.id(),
                        method = site.name(),
                        class = inv.class.name(),
                        unbound = binding.target().is_none(),
                        reason = ?binding.indirect_reason(),
                        "call site degraded to fail tier"
                    );
                }
                return None;
            }
            (_, Some(fast)) => fast.clone(),
        };

        let link = self
            .builder
            .link(entry, inv, fast.clone())
            .unwrap_or_else(|err| link_failed(site, err));
        state.apply(plan, link);
        site.install(self.builder.chain(&state.seen));

        let stats = site.stats();
        match plan {
            Plan::Bind => stats.record_bind(),
            Plan::Rebind | Plan::Refresh => stats.record_rebind(),
            Plan::Extend => stats.record_extend(),
            Plan::Fail => {}
        }
        match binding.indirect_reason() {
            None => stats.record_direct_bind(),
            Some(reason) => stats.record_indirect_bind(reason),
        }
        if self.config.log_binding_decisions {
            tracing::debug!(
                site = %site.id(),
                method = site.name(),
                class = inv.class.name(),
                defined_in = entry.defining_class.name(),
                ?plan,
                tier = ?state.tier,
                direct = binding.is_direct(),
                reason = ?binding.indirect_reason(),
                shapes = state.seen.len(),
                "call site linked"
            );
        }
        Some(fast)
    }

    pub fn report(&self) -> EngineReport {
        EngineReport::new(self.live_sites().iter().map(|s| s.snapshot()).collect())
    }

    /// Explicit full cache clear: every live site relinks on its next call.
    pub fn clear_all(&self) {
        let sites = self.live_sites();
        for site in &sites {
            site.clear();
        }
        tracing::debug!(sites = sites.len(), "all call sites cleared");
    }
}

/// A builder that cannot produce any target means the object model broke its
/// contract; continuing with a partial strategy could call the wrong method.
#[cold]
fn link_failed(site: &CallSite, err: LinkError) -> ! {
    tracing::error!(site = %site.id(), method = site.name(), %err, "cannot link call site");
    panic!("cannot link call site {} (`{}'): {err}", site.id(), site.name());
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("config", &self.config)
            .field("sites", &self.sites.lock().len())
            .finish()
    }
}
