use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::engine::RetryPolicy;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}: invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("JWT_SECRET must be at least 32 bytes")]
    WeakSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub users_csv: Option<PathBuf>,
    pub items_csv: Option<PathBuf>,
    pub store_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Config {
    /// Read the configuration from the environment, after loading `.env` if
    /// there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parsed = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { var, value }),
            }
        };

        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let port = parsed("PORT", 8001)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            var: "PORT",
            value: port.to_string(),
        })?;

        let retry_attempts = parsed("RETRY_ATTEMPTS", 5)?;
        let retry_attempts = match u32::try_from(retry_attempts) {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "RETRY_ATTEMPTS",
                    value: retry_attempts.to_string(),
                });
            }
        };

        Ok(Config {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            jwt_secret,
            users_csv: lookup("USERS_CSV").map(PathBuf::from),
            items_csv: lookup("ITEMS_CSV").map(PathBuf::from),
            store_timeout: Duration::from_millis(parsed("STORE_TIMEOUT_MS", 2000)?),
            retry_attempts,
            retry_backoff: Duration::from_millis(parsed("RETRY_BACKOFF_MS", 50)?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: self.retry_backoff,
            call_timeout: self.store_timeout,
        }
    }
}
