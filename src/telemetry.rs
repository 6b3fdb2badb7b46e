//! Log subscriber setup.
//!
//! Every operational event in the crate goes through `tracing` with a `locus::<module>`
//! target, so `RUST_LOG=locus::places=debug` narrows output to one component.

use crate::config::LogConfig;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Filter from `RUST_LOG` when set and parseable, otherwise from `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_directive.to_string());

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        eprintln!("invalid log filter {:?}; falling back to info", directive);
        EnvFilter::new("info")
    })
}

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init(config: &LogConfig) -> bool {
    let (plain, json) = if config.json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(plain)
        .with(json)
        .try_init()
        .is_ok()
}
