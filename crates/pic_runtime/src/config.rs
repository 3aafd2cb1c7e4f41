//! Dispatch configuration.

use std::str::FromStr;

use crate::errors::ConfigError;

/// Which invalidation mechanism guards on heap receivers check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GuardPolicy {
    /// Compare the class's generation token with the one captured at bind time.
    #[default]
    Generation,
    /// Poll the class's switch point captured at bind time.
    SwitchPoint,
}

impl FromStr for GuardPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generation" | "token" => Ok(GuardPolicy::Generation),
            "switchpoint" | "switch-point" | "signal" => Ok(GuardPolicy::SwitchPoint),
            _ => Err(ConfigError::InvalidGuardPolicy(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Distinct receiver classes a site chains before degrading to the fail tier.
    pub max_polymorphic_degree: usize,
    /// Times a monomorphic site may be rebound for a mutated class.
    pub max_rebind_count: usize,
    pub enable_direct_dispatch: bool,
    /// When false, sites with no direct binding go straight to the fail tier.
    pub enable_indirect_binding: bool,
    pub guard_policy: GuardPolicy,
    pub log_binding_decisions: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_polymorphic_degree: 8,
            max_rebind_count: 5,
            enable_direct_dispatch: true,
            enable_indirect_binding: true,
            guard_policy: GuardPolicy::Generation,
            log_binding_decisions: false,
        }
    }
}

pub const ENV_MAX_POLY: &str = "PIC_MAX_POLY";
pub const ENV_MAX_REBIND: &str = "PIC_MAX_REBIND";
pub const ENV_DIRECT: &str = "PIC_DIRECT";
pub const ENV_INDIRECT: &str = "PIC_INDIRECT";
pub const ENV_GUARD: &str = "PIC_GUARD";
pub const ENV_LOG_BINDINGS: &str = "PIC_LOG_BINDINGS";

impl DispatchConfig {
    /// Defaults overridden by any `PIC_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_MAX_POLY) {
            config.max_polymorphic_degree = parse_usize(ENV_MAX_POLY, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_REBIND) {
            config.max_rebind_count = parse_usize(ENV_MAX_REBIND, &v)?;
        }
        if let Some(v) = lookup(ENV_DIRECT) {
            config.enable_direct_dispatch = parse_bool(ENV_DIRECT, &v)?;
        }
        if let Some(v) = lookup(ENV_INDIRECT) {
            config.enable_indirect_binding = parse_bool(ENV_INDIRECT, &v)?;
        }
        if let Some(v) = lookup(ENV_GUARD) {
            config.guard_policy = v.parse()?;
        }
        if let Some(v) = lookup(ENV_LOG_BINDINGS) {
            config.log_binding_decisions = parse_bool(ENV_LOG_BINDINGS, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_polymorphic_degree == 0 {
            return Err(ConfigError::ZeroPolymorphicDegree);
        }
        Ok(())
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidInteger {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
