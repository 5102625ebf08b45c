//! Tracing setup.
//!
//! Logs go to stderr; stdout carries the wire protocol when serving.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `verbose` forces `debug`. Otherwise `RUST_LOG` wins over `level`.
/// Installing twice is a no-op.
pub fn init(level: &str, verbose: bool) {
    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter(level, verbose))
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn filter(level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
