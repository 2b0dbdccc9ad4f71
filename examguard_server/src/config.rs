use std::{env, fmt::Display, str::FromStr};

use tracing::info;

use crate::error::ConfigError;

pub struct ServerConfig {
    pub port: u16,
    pub max_warnings: u32,
    pub mongo_uri: Option<String>,
    pub db_name: String,
}

impl ServerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let max_warnings: u32 = try_load("EXAMGUARD_MAX_WARNINGS", 3)?;
        if max_warnings == 0 {
            return Err(ConfigError::Invalid {
                key: "EXAMGUARD_MAX_WARNINGS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: try_load("EXAMGUARD_PORT", 3000)?,
            max_warnings,
            mongo_uri: env::var("MONGO_URI").ok().filter(|uri| !uri.trim().is_empty()),
            db_name: try_load("EXAMGUARD_DB_NAME", "proctor_db".to_string())?,
        })
    }
}

fn try_load<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
