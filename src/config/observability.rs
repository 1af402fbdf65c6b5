use crate::config::helpers::optional_env;
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// Logging destination and verbosity.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl ObservabilityConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let log_level = optional_env("LOG_LEVEL")?
            .or_else(|| overlay.log_level.clone())
            .unwrap_or_else(|| "info".to_string());

        let json_logs = optional_env("LOG_FORMAT")?
            .or_else(|| overlay.log_format.clone())
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            log_level,
            json_logs,
        })
    }
}
