//! cxreset - print Codex rate-limit reset times for a status bar.
//!
//! Spawns `codex app-server`, asks it for the current rate limits and prints
//! one line to stdout. Any failure prints a fixed fallback line instead, so
//! the status bar always has something to show. Logs go to stderr.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cxreset::{format, Config, RateLimitClient};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cxreset=error".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let config = Config::from_env();
    debug!(timeout_ms = config.timeout_millis(), "fetching rate limits");

    let line = match runtime.block_on(RateLimitClient::new(config).fetch()) {
        Ok(limits) => format::render(&format::reset_times(&limits, chrono::Utc::now())),
        Err(e) => {
            warn!("Rate limits unavailable: {}", e);
            format::FALLBACK_OUTPUT.to_string()
        }
    };

    println!("{line}");
    Ok(())
}
