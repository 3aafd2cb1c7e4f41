//! Object model consumed by the call-site caching core.
//!
//! This crate contains the collaborator types the dispatch engine links against:
//! - `Value` - Runtime value representation (immediates and heap objects)
//! - `RClass` - Classes and modules with method tables and generation tokens
//! - `DynamicMethod` - Method implementations with native and generic entry points
//! - `Block`, `ThreadContext` - Trailing blocks and the per-thread frame stack
//! - `Unwind` - The single channel for break, retry and raised errors
//! - `ClassRegistry` - Thread-safe reference implementation of `ObjectModel`

pub mod block;
pub mod class;
pub mod context;
pub mod method;
pub mod object_model;
pub mod registry;
pub mod switch_point;
pub mod unwind;
pub mod value;

pub use block::Block;
pub use class::{ClassId, ClassKind, ClassRef, RClass};
pub use context::{FrameGuard, FrameId, ThreadContext};
pub use method::{ArityRange, DynamicMethod, MethodBody, NativeEntry, NativeShape, Visibility};
pub use object_model::{ClassVersioning, MethodTable, ObjectModel, Resolved};
pub use registry::{ClassRegistry, ObjectModelError};
pub use switch_point::SwitchPoint;
pub use unwind::{BreakJump, CallResult, ErrorClass, RaiseError, Unwind};
pub use value::{ObjectRef, RObject, Value, ValueKind};
