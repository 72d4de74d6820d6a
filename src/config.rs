use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    /// How long a parsed settings snapshot is reused.
    pub settings_refresh: Duration,
    /// TTL of the per-user check-in lock.
    pub checkin_lock_ttl: Duration,

    pub log_dir: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value `{raw}`")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads configuration from the environment; call after `dotenv()`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            settings_refresh: Duration::from_secs(or_default("SETTINGS_REFRESH_SECS", 30)?),
            checkin_lock_ttl: Duration::from_secs(or_default("CHECKIN_LOCK_TTL_SECS", 10)?),

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }
}
