use crate::config::helpers::optional_env;
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// Allow-list of application keys (spec §4.4/§6a). Rotating or removing a
/// key revokes a whole client cohort without touching user accounts.
#[derive(Debug, Clone)]
pub struct AppKeysConfig {
    keys: Vec<String>,
}

impl AppKeysConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let keys = match optional_env("APP_KEYS")? {
            Some(raw) => split_keys(&raw),
            None => overlay.app_keys.clone().unwrap_or_default(),
        };

        if keys.len() < 2 {
            return Err(ConfigError::InvalidValue {
                key: "APP_KEYS".to_string(),
                message: format!(
                    "at least 2 application keys are required, got {}",
                    keys.len()
                ),
            });
        }

        Ok(Self { keys })
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
