//! Tracing subscriber setup shared by every binary

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` directives are applied on top of the configured level for
/// this crate and for `binary`.
pub fn init_tracing(config: &LoggingConfig, binary: &str) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("credit_risk_pipeline={}", config.level).parse()?)
        .add_directive(format!("{}={}", binary.replace('-', "_"), config.level).parse()?);

    let installed = match config.format.as_str() {
        "pretty" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
