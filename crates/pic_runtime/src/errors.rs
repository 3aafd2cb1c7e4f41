//! Error types internal to linking and configuration.
//!
//! None of these reach application code: language-level failures travel
//! through `pic_core::Unwind` like any other call result.

use thiserror::Error;

use crate::shape::Arity;

/// Why a call site could not bind straight to a method's native entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndirectReason {
    #[error("direct dispatch disabled")]
    DirectDisabled,
    #[error("method has no native entry")]
    NoNativeEntry,
    #[error("method needs a frame")]
    NeedsFrame,
    #[error("site arity {site:?} does not match method arity {method}")]
    ArityMismatch { site: Arity, method: String },
}

impl IndirectReason {
    pub const COUNT: usize = 4;

    /// Stable bucket per variant, ignoring payloads.
    pub fn index(&self) -> usize {
        match self {
            IndirectReason::DirectDisabled => 0,
            IndirectReason::NoNativeEntry => 1,
            IndirectReason::NeedsFrame => 2,
            IndirectReason::ArityMismatch { .. } => 3,
        }
    }
}

/// The builder could not produce any target for a resolved method. Only a
/// broken object model can cause this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("resolved `{0}' to an undefined-method marker")]
    UndefinedMarker(String),
    #[error("entry for `{name}' was resolved against class {expected}, receiver is {actual}")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: expected an integer, got `{value}'")]
    InvalidInteger { key: String, value: String },
    #[error("{key}: expected a boolean, got `{value}'")]
    InvalidBool { key: String, value: String },
    #[error("unknown guard policy `{0}' (expected `generation' or `switchpoint')")]
    InvalidGuardPolicy(String),
    #[error("max polymorphic degree must be at least 1")]
    ZeroPolymorphicDegree,
}
