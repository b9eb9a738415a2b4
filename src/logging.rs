use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,airframes=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
