//! Call-site linking and polymorphic inline caching.
//!
//! This crate binds call sites to method implementations and keeps those
//! bindings valid as classes change:
//! - `CallSite` - One call point with a fixed argument shape and its installed target
//! - `DispatchEngine` - Tier state machine: unlinked, monomorphic, polymorphic, megamorphic
//! - `StrategyBuilder` - Guarded targets, fallback chains and direct/indirect binding
//! - `MethodEntry` - Immutable snapshot of one resolution and its validity stamp
//! - `DispatchConfig` - Tuning knobs, readable from the environment
//! - `EngineReport` - Per-site counters and megamorphic hotspots

pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod entry;
pub mod errors;
pub mod guard;
mod iter;
pub mod method_missing;
pub mod shape;
pub mod site;
pub mod target;

pub use builder::StrategyBuilder;
pub use config::{DispatchConfig, GuardPolicy};
pub use diagnostics::{EngineReport, SiteSnapshot, SiteStats};
pub use engine::DispatchEngine;
pub use entry::{MethodEntry, Stamp};
pub use errors::{ConfigError, IndirectReason, LinkError};
pub use guard::Guard;
pub use method_missing::MissingKind;
pub use shape::{Arity, CallShape, CallType};
pub use site::{CallSite, SiteDescriptor, SiteId, Tier};
pub use target::{Invocation, Target, TargetKind, TargetRef};
