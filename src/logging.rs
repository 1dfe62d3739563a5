//! Tracing subscriber setup for the CLI
//!
//! Progress and counts go to stderr through `tracing`; report tables are
//! printed to stdout separately, so piping a report never picks up log lines.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool) -> crate::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(layer)
        .try_init()?;
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    // dependencies stay at warn unless RUST_LOG says otherwise
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,custforge={level}",
            level = level.as_str().to_lowercase()
        ))
    })
}
