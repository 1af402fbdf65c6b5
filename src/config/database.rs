use crate::config::helpers::{optional_env, parse_env};
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// Storage Gateway connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_pool_size: usize,
    pub statement_timeout_ms: u64,
}

impl DatabaseConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let database_url = optional_env("DATABASE_URL")?
            .or_else(|| overlay.database_url.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "DATABASE_URL".to_string(),
                hint: "set DATABASE_URL or database_url in the TOML config file".to_string(),
            })?;

        let max_pool_size = parse_env::<usize>("DATABASE_MAX_POOL_SIZE")?
            .or(overlay.database_max_pool_size)
            .unwrap_or(16);

        let statement_timeout_ms = parse_env::<u64>("DATABASE_STATEMENT_TIMEOUT_MS")?
            .or(overlay.database_statement_timeout_ms)
            .unwrap_or(30_000);

        if max_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_MAX_POOL_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url,
            max_pool_size,
            statement_timeout_ms,
        })
    }
}
