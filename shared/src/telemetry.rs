use anyhow::{anyhow, Result};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`; `LOG_FORMAT=json` switches to
/// JSON lines for log shippers.
pub fn init_tracing(service_name: &str, default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;

    info!("Tracing initialized for {}", service_name);
    Ok(())
}
