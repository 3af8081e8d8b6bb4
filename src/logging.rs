use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Installs the global subscriber. `RUST_LOG` wins, then `VMPERF_LOG_LEVEL`,
/// then `info` (`debug` when verbose).
pub fn init(verbose: bool) -> Result<()> {
    let env_log_level = std::env::var("VMPERF_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_level = if verbose {
        "debug"
    } else {
        env_log_level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Logs go to stderr; stdout carries the published payload.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
