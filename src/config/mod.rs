pub mod app;
pub mod smtp;

pub use app::{AppConfig, PasswordHashConfig, QueueConfig};
pub use smtp::{SmtpConfig, SmtpEncryption};

use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required_var(key: &'static str) -> Result<String, ConfigError> {
    optional_var(key).ok_or(ConfigError::Missing(key))
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn duration_var(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match optional_var(key) {
        Some(value) => humantime::parse_duration(value.trim())
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
