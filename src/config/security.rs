use crate::config::helpers::parse_env;
use crate::config::FileOverlay;
use crate::error::ConfigError;

/// Credential Store cost/length policy (spec §4.2/§6a).
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub user_password_min_len: usize,
    pub standard_hash_rounds: u32,
    pub admin_hash_rounds: u32,
    /// Gates whether credential values may ever reach a log sink.
    pub production: bool,
}

const STANDARD_ROUNDS_DEFAULT: u32 = 80_000;
const ADMIN_ROUNDS_DEFAULT: u32 = 160_000;

impl SecurityConfig {
    pub(crate) fn resolve(overlay: &FileOverlay) -> Result<Self, ConfigError> {
        let user_password_min_len = parse_env::<usize>("USER_PASSWORD_MIN_LEN")?
            .or(overlay.user_password_min_len)
            .unwrap_or(14);

        let standard_hash_rounds = parse_env::<u32>("STANDARD_HASH_ROUNDS")?
            .or(overlay.standard_hash_rounds)
            .unwrap_or(STANDARD_ROUNDS_DEFAULT);

        let admin_hash_rounds = parse_env::<u32>("ADMIN_HASH_ROUNDS")?
            .or(overlay.admin_hash_rounds)
            .unwrap_or(ADMIN_ROUNDS_DEFAULT);

        let production = parse_env::<bool>("PRODUCTION")?
            .or(overlay.production)
            .unwrap_or(true);

        if user_password_min_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "USER_PASSWORD_MIN_LEN".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            user_password_min_len,
            standard_hash_rounds,
            admin_hash_rounds,
            production,
        })
    }
}
