use super::{duration_var, optional_var, parse_var, required_var, ConfigError, SmtpConfig};
use std::time::Duration;

/// Argon2id cost parameters used for password hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long the consumer sleeps when the queue is empty.
    pub poll_interval: Duration,
    /// How long a delivered but unacknowledged message stays invisible.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            visibility_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Public URL of the frontend. Welcome emails link to
    /// `{base_url}/activate?token=...`; that page submits the token to
    /// `PUT /auth/activate`, which this service does not serve as a page.
    pub base_url: String,
    pub activation_token_ttl: Duration,
    pub password_hashing: PasswordHashConfig,
    pub mail_send_timeout: Duration,
    pub queue: QueueConfig,
    pub token_sweep_interval: Duration,
    /// `None` when SMTP is not configured; mail is then only logged.
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PasswordHashConfig::default();
        let password_hashing = PasswordHashConfig {
            memory_kib: parse_var("ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_var("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_var("ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        let queue_defaults = QueueConfig::default();
        let queue = QueueConfig {
            poll_interval: duration_var("QUEUE_POLL_INTERVAL", queue_defaults.poll_interval)?,
            visibility_timeout: duration_var(
                "QUEUE_VISIBILITY_TIMEOUT",
                queue_defaults.visibility_timeout,
            )?,
        };

        let smtp = match optional_var("SMTP_HOST") {
            Some(_) => Some(SmtpConfig::from_env()?),
            None => None,
        };

        Ok(Self {
            database_url: required_var("DATABASE_URL")?,
            host: optional_var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            environment: optional_var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            base_url: optional_var("BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            activation_token_ttl: duration_var(
                "ACTIVATION_TOKEN_TTL",
                Duration::from_secs(2 * 60 * 60),
            )?,
            password_hashing,
            mail_send_timeout: duration_var("MAIL_SEND_TIMEOUT", Duration::from_secs(30))?,
            queue,
            token_sweep_interval: duration_var(
                "TOKEN_SWEEP_INTERVAL",
                Duration::from_secs(60 * 60),
            )?,
            smtp,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
