pub mod config;
pub mod error;

pub use config::{Config, IconsConfig, StoreConfig, SyncConfig};
pub use error::{ConfigError, DatabaseError, RusqliteErrorExt, TransportError};

use anyhow::Result;

/// Initialize logging for a sync node.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Sunshine core initialized");
    Ok(())
}
