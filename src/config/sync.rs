use crate::config::helpers::parse_env;
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// Sync Counter Engine session-expiry policy (spec §4.3.1/§5).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub session_expiry_minutes: i64,
}

/// The reservation's trailing-cleanup step relies on a window wide enough
/// to cover any plausible single upload; below this, a slow uploader could
/// be reaped out from under itself mid-transaction.
const MIN_SESSION_EXPIRY_MINUTES: i64 = 20;
const DEFAULT_SESSION_EXPIRY_MINUTES: i64 = 80;

impl SyncConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let session_expiry_minutes = parse_env::<i64>("SYNC_SESSION_EXPIRY_MINUTES")?
            .or(overlay.sync_session_expiry_minutes)
            .unwrap_or(DEFAULT_SESSION_EXPIRY_MINUTES);

        if session_expiry_minutes < MIN_SESSION_EXPIRY_MINUTES {
            return Err(ConfigError::InvalidValue {
                key: "SYNC_SESSION_EXPIRY_MINUTES".to_string(),
                message: format!(
                    "must be at least {MIN_SESSION_EXPIRY_MINUTES} minutes, got {session_expiry_minutes}"
                ),
            });
        }

        Ok(Self {
            session_expiry_minutes,
        })
    }
}
