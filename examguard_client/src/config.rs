use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_MAX_WARNINGS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub attempt_id: String,
    pub max_warnings: u32,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            attempt_id: "demo-attempt".to_string(),
            max_warnings: DEFAULT_MAX_WARNINGS,
            http_timeout: Duration::from_secs(10),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_warnings: u32 = try_load("EXAMGUARD_MAX_WARNINGS", defaults.max_warnings)?;
        if max_warnings == 0 {
            return Err(ConfigError::Invalid {
                key: "EXAMGUARD_MAX_WARNINGS",
                reason: "must be at least 1".to_string(),
            });
        }

        let timeout_secs: u64 = try_load("EXAMGUARD_HTTP_TIMEOUT_SECS", defaults.http_timeout.as_secs())?;

        Ok(Self {
            api_url: try_load("EXAMGUARD_API_URL", defaults.api_url)?,
            attempt_id: try_load("EXAMGUARD_ATTEMPT_ID", defaults.attempt_id)?,
            max_warnings,
            http_timeout: Duration::from_secs(timeout_secs),
            user_agent: try_load("EXAMGUARD_USER_AGENT", defaults.user_agent)?,
        })
    }
}

fn default_user_agent() -> String {
    format!("examguard/{}", env!("CARGO_PKG_VERSION"))
}

fn try_load<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => {
            debug!("{key} loaded from environment");
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
