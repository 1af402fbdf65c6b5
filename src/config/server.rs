use crate::config::helpers::{optional_env, parse_env};
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub max_body_bytes: usize,
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let bind_host = optional_env("BIND_HOST")?
            .or_else(|| overlay.bind_host.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let bind_port = parse_env::<u16>("BIND_PORT")?
            .or(overlay.bind_port)
            .unwrap_or(8080);

        let max_body_bytes = parse_env::<usize>("MAX_BODY_BYTES")?
            .or(overlay.max_body_bytes)
            .unwrap_or(1024 * 1024);

        let shutdown_timeout_secs = parse_env::<u64>("SHUTDOWN_TIMEOUT_SECS")?
            .or(overlay.shutdown_timeout_secs)
            .unwrap_or(30);

        Ok(Self {
            bind_host,
            bind_port,
            max_body_bytes,
            shutdown_timeout_secs,
        })
    }
}
