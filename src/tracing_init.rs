//! Logging setup.
//!
//! User-facing output goes through `println!`; `tracing` carries the
//! diagnostics. By default only warnings reach stderr. With `--debug` the
//! filter drops to `debug` and events are appended to the workspace's
//! `debug.log` instead.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing(debug_log: Option<&Path>) -> std::io::Result<()> {
    let default_filter = if debug_log.is_some() {
        "seal=debug,seal_cli=debug"
    } else {
        "seal=warn,seal_cli=warn"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    match debug_log {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}
