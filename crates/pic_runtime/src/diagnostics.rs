//! Per-site counters and engine-wide reports.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::IndirectReason;
use crate::shape::CallShape;
use crate::site::{SiteId, Tier};
use crate::target::TargetKind;

#[derive(Debug, Default)]
pub struct SiteStats {
    invocations: AtomicU64,
    misses: AtomicU64,
    binds: AtomicU64,
    rebinds: AtomicU64,
    extends: AtomicU64,
    fail_transitions: AtomicU64,
    fail_hits: AtomicU64,
    fail_misses: AtomicU64,
    direct_binds: AtomicU64,
    indirect_binds: AtomicU64,
    /// Indirect binds by `IndirectReason::index`.
    indirect_reasons: [AtomicU64; IndirectReason::COUNT],
    method_missing: AtomicU64,
}

macro_rules! counters {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl SiteStats {
            $(
                #[inline]
                pub(crate) fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }

                pub fn $field(&self) -> u64 {
                    self.$field.load(Ordering::Relaxed)
                }
            )*
        }
    };
}

counters! {
    record_invocation => invocations,
    record_miss => misses,
    record_bind => binds,
    record_rebind => rebinds,
    record_extend => extends,
    record_fail_transition => fail_transitions,
    record_fail_hit => fail_hits,
    record_fail_miss => fail_misses,
    record_direct_bind => direct_binds,
    record_method_missing => method_missing,
}

impl SiteStats {
    pub(crate) fn record_indirect_bind(&self, reason: &IndirectReason) {
        self.indirect_binds.fetch_add(1, Ordering::Relaxed);
        self.indirect_reasons[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn indirect_binds(&self) -> u64 {
        self.indirect_binds.load(Ordering::Relaxed)
    }

    /// Indirect binds made for the same kind of reason as `reason`.
    pub fn indirect_binds_for(&self, reason: &IndirectReason) -> u64 {
        self.indirect_reasons[reason.index()].load(Ordering::Relaxed)
    }
}

/// Point-in-time view of one call site.
#[derive(Clone, Debug)]
pub struct SiteSnapshot {
    pub id: SiteId,
    pub name: String,
    pub shape: CallShape,
    pub tier: Tier,
    pub target: TargetKind,
    pub shapes_seen: usize,
    pub invocations: u64,
    pub misses: u64,
    pub binds: u64,
    pub rebinds: u64,
    pub extends: u64,
    pub fail_transitions: u64,
    pub fail_hits: u64,
    pub fail_misses: u64,
    pub direct_binds: u64,
    pub indirect_binds: u64,
    pub method_missing: u64,
}

#[derive(Clone, Debug, Default)]
pub struct EngineReport {
    /// Every live site, in creation order.
    pub sites: Vec<SiteSnapshot>,
    /// Megamorphic sites, busiest first.
    pub hotspots: Vec<SiteSnapshot>,
}

impl EngineReport {
    pub fn new(sites: Vec<SiteSnapshot>) -> Self {
        let mut hotspots: Vec<SiteSnapshot> = sites
            .iter()
            .filter(|s| s.tier == Tier::Megamorphic)
            .cloned()
            .collect();
        hotspots.sort_by(|a, b| b.invocations.cmp(&a.invocations));
        Self { sites, hotspots }
    }

    pub fn site(&self, name: &str) -> Option<&SiteSnapshot> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn count_in(&self, tier: Tier) -> usize {
        self.sites.iter().filter(|s| s.tier == tier).count()
    }
}

impl fmt::Display for EngineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:<12} {:<12} {:>6} {:>10} {:>6} {:>6} {:>6} {:>6} {:>6}",
            "site", "method", "tier", "shapes", "calls", "miss", "rebind", "fail", "direct", "mm"
        )?;
        for s in &self.sites {
            writeln!(
                f,
                "{:<24} {:<12} {:<12} {:>6} {:>10} {:>6} {:>6} {:>6} {:>6} {:>6}",
                s.id.to_string(),
                s.name,
                format!("{:?}", s.tier),
                s.shapes_seen,
                s.invocations,
                s.misses,
                s.rebinds,
                s.fail_transitions,
                s.direct_binds,
                s.method_missing,
            )?;
        }
        if !self.hotspots.is_empty() {
            writeln!(f, "megamorphic hotspots:")?;
            for s in &self.hotspots {
                writeln!(
                    f,
                    "  {} `{}' {} calls ({} fail-tier misses)",
                    s.id, s.name, s.invocations, s.fail_misses
                )?;
            }
        }
        Ok(())
    }
}
