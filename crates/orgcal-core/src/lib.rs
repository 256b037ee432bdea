pub mod config;
pub mod error;
pub mod keys;
pub mod storage;

pub use config::{
    Config, ConfigIssue, GoogleConfig, OrganizationsConfig, Severity, SyncConfig, ValidationResult,
};
pub use error::StorageError;
pub use storage::{KeyValueStore, KeyValueStoreExt, MemoryStore, SqliteStore};

use anyhow::Result;

/// Initialize logging for the host process
pub fn init() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("orgcal core initialized");
    Ok(())
}
