use clap::{Args, Parser, Subcommand, ValueEnum};

use pic_runtime::{ConfigError, DispatchConfig, GuardPolicy};

#[derive(Parser)]
#[command(name = "pic")]
#[command(about = "Drive the call-site cache through canned workloads")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a canned tiering scenario and verify every result
    Scenario {
        #[arg(value_enum, default_value_t = ScenarioName::All)]
        name: ScenarioName,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Hammer shared call sites from several threads
    Stress {
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Distinct receiver classes
        #[arg(long, default_value_t = 4)]
        classes: usize,
        /// Calls per thread
        #[arg(long, default_value_t = 10_000)]
        calls: usize,
        /// Redefine one class while the workers run
        #[arg(long)]
        redefine: bool,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ScenarioName {
    DogCat,
    Megamorphic,
    Redefine,
    All,
}

/// Overrides layered over the `PIC_*` environment.
#[derive(Args, Debug)]
pub(crate) struct DispatchArgs {
    #[arg(long)]
    pub max_poly: Option<usize>,
    #[arg(long)]
    pub max_rebind: Option<usize>,
    #[arg(long)]
    pub no_direct: bool,
    #[arg(long)]
    pub no_indirect: bool,
    /// `generation` or `switchpoint`
    #[arg(long, value_parser = parse_guard)]
    pub guard: Option<GuardPolicy>,
    #[arg(long)]
    pub log_bindings: bool,
    /// Print the per-site report
    #[arg(long)]
    pub report: bool,
}

fn parse_guard(s: &str) -> Result<GuardPolicy, ConfigError> {
    s.parse()
}

impl DispatchArgs {
    pub(crate) fn config(&self) -> Result<DispatchConfig, ConfigError> {
        let mut config = DispatchConfig::from_env()?;
        if let Some(n) = self.max_poly {
            config.max_polymorphic_degree = n;
        }
        if let Some(n) = self.max_rebind {
            config.max_rebind_count = n;
        }
        if self.no_direct {
            config.enable_direct_dispatch = false;
        }
        if self.no_indirect {
            config.enable_indirect_binding = false;
        }
        if let Some(policy) = self.guard {
            config.guard_policy = policy;
        }
        if self.log_bindings {
            config.log_binding_decisions = true;
        }
        config.validate()?;
        Ok(config)
    }
}
