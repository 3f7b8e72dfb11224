use super::{optional_var, parse_var, required_var, ConfigError};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEncryption {
    Tls,
    StartTls,
    None,
}

impl FromStr for SmtpEncryption {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tls" => Ok(SmtpEncryption::Tls),
            "starttls" => Ok(SmtpEncryption::StartTls),
            "none" => Ok(SmtpEncryption::None),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub encryption: SmtpEncryption,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let encryption = optional_var("SMTP_ENCRYPTION").unwrap_or_else(|| "starttls".to_string());

        Ok(Self {
            host: required_var("SMTP_HOST")?,
            port: parse_var("SMTP_PORT", 587)?,
            username: required_var("SMTP_USERNAME")?,
            password: required_var("SMTP_PASSWORD")?,
            from_email: required_var("SMTP_FROM_EMAIL")?,
            from_name: optional_var("SMTP_FROM_NAME").unwrap_or_else(|| "Arcus".to_string()),
            encryption: encryption.parse().map_err(|_| ConfigError::Invalid {
                key: "SMTP_ENCRYPTION",
                value: encryption.clone(),
            })?,
        })
    }
}
