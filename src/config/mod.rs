//! Configuration for the sync server.
//!
//! Settings are loaded with priority: explicit env var > TOML config file >
//! built-in default. Every leaf value is validated at resolve time, not at
//! first use.

mod app_keys;
mod database;
pub(crate) mod helpers;
mod observability;
mod security;
mod server;
mod sync;

use serde::Deserialize;

use crate::error::ConfigError;

pub use self::app_keys::AppKeysConfig;
pub use self::database::DatabaseConfig;
pub use self::observability::ObservabilityConfig;
pub use self::security::SecurityConfig;
pub use self::server::ServerConfig;
pub use self::sync::SyncConfig;

/// Aggregate configuration resolved once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub app_keys: AppKeysConfig,
    pub security: SecurityConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
}

/// Values that may come from an optional TOML overlay file. Every field is
/// optional; an env var of the same concern always takes priority over it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileOverlay {
    pub database_url: Option<String>,
    pub database_max_pool_size: Option<usize>,
    pub database_statement_timeout_ms: Option<u64>,

    pub app_keys: Option<Vec<String>>,

    pub user_password_min_len: Option<usize>,
    pub standard_hash_rounds: Option<u32>,
    pub admin_hash_rounds: Option<u32>,
    pub production: Option<bool>,

    pub sync_session_expiry_minutes: Option<i64>,

    pub bind_host: Option<String>,
    pub bind_port: Option<u16>,
    pub max_body_bytes: Option<usize>,
    pub shutdown_timeout_secs: Option<u64>,

    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    ///
    /// If `toml_path` is `Some`, the file must exist and parse; errors are
    /// fatal. If `None`, no overlay is applied (there is no implicit
    /// default path for this service — callers pass one explicitly via
    /// `--config` or not at all).
    pub fn from_env_with_toml(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let overlay = match toml_path {
            Some(path) => Self::load_toml(path)?,
            None => FileOverlay::default(),
        };

        Self::build(&overlay)
    }

    fn load_toml(path: &std::path::Path) -> Result<FileOverlay, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| ConfigError::ParseError(format!(
            "invalid TOML in {}: {e}",
            path.display()
        )))
    }

    fn build(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(overlay)?,
            app_keys: AppKeysConfig::resolve(overlay)?,
            security: SecurityConfig::resolve(overlay)?,
            sync: SyncConfig::resolve(overlay)?,
            server: ServerConfig::resolve(overlay)?,
            observability: ObservabilityConfig::resolve(overlay)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that mutate process env vars must not interleave.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "DATABASE_MAX_POOL_SIZE",
            "APP_KEYS",
            "USER_PASSWORD_MIN_LEN",
            "SYNC_SESSION_EXPIRY_MINUTES",
            "BIND_HOST",
            "BIND_PORT",
            "PRODUCTION",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("APP_KEYS", "a,b") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
        clear_env();
    }

    #[test]
    fn rejects_single_app_key() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("DATABASE_URL", "postgres://localhost/test") };
        unsafe { std::env::set_var("APP_KEYS", "only-one") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "APP_KEYS"));
        clear_env();
    }

    #[test]
    fn rejects_expiry_window_below_minimum() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("DATABASE_URL", "postgres://localhost/test") };
        unsafe { std::env::set_var("APP_KEYS", "a,b") };
        unsafe { std::env::set_var("SYNC_SESSION_EXPIRY_MINUTES", "5") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "SYNC_SESSION_EXPIRY_MINUTES"));
        clear_env();
    }

    #[test]
    fn resolves_with_defaults_when_only_required_vars_set() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("DATABASE_URL", "postgres://localhost/test") };
        unsafe { std::env::set_var("APP_KEYS", "alpha, beta") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.security.user_password_min_len, 14);
        assert_eq!(config.sync.session_expiry_minutes, 80);
        assert!(config.app_keys.is_allowed("alpha"));
        assert!(config.app_keys.is_allowed("beta"));
        assert!(!config.app_keys.is_allowed("gamma"));
        clear_env();
    }
}
