use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

mod args;
mod commands;

use args::{Cli, Commands};
use commands::stress::StressOptions;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

struct NoTimestamp;

impl FormatTime for NoTimestamp {
    fn format_time(&self, _w: &mut Writer<'_>) -> std::fmt::Result {
        Ok(())
    }
}

/// Logging is off unless `PIC_LOG` holds a filter; `PIC_LOG_STYLE=full`
/// keeps timestamps.
fn init_logging() {
    let Ok(filter) = EnvFilter::try_from_env("PIC_LOG") else {
        return;
    };
    let style = std::env::var("PIC_LOG_STYLE").unwrap_or_default();
    if style == "full" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_timer(NoTimestamp)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
    tracing::debug!("tracing initialized");
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scenario { name, dispatch } => dispatch
            .config()
            .map_err(|e| e.to_string())
            .and_then(|config| commands::scenario::run(name, config, dispatch.report)),
        Commands::Stress {
            threads,
            classes,
            calls,
            redefine,
            dispatch,
        } => {
            let opts = StressOptions {
                threads,
                classes,
                calls,
                redefine,
                report: dispatch.report,
            };
            dispatch
                .config()
                .map_err(|e| e.to_string())
                .and_then(|config| commands::stress::run(&opts, config))
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
