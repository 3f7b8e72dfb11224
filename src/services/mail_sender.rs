use crate::config::{SmtpConfig, SmtpEncryption};
use crate::models::{UserWelcomeData, USER_WELCOME_TEMPLATE};
use askama::Template;
use async_trait::async_trait;
use lettre::{
    message::MultiPart, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Unknown email template: {0}")]
    UnknownTemplate(String),
    #[error("Invalid data for template {template}: {reason}")]
    TemplateData { template: String, reason: String },
    #[error("Failed to render template: {0}")]
    Render(#[from] askama::Error),
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template_name: &str,
        data: &serde_json::Value,
    ) -> Result<(), EmailError>;
}

#[derive(Template)]
#[template(path = "email/user_welcome.html")]
struct UserWelcomeHtml<'a> {
    name: &'a str,
    token: &'a str,
    activation_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/user_welcome.txt")]
struct UserWelcomeText<'a> {
    name: &'a str,
    token: &'a str,
    activation_url: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Resolves template names carried by notification commands to rendered emails.
///
/// Owned by each sender instance; templates are compiled in, so there is no
/// process-wide cache to share. Activation links point at the frontend's
/// `/activate` page under `base_url`, not at this service.
#[derive(Debug, Clone)]
pub struct MailTemplates {
    base_url: String,
}

impl MailTemplates {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn render(
        &self,
        template_name: &str,
        data: &serde_json::Value,
    ) -> Result<RenderedEmail, EmailError> {
        match template_name {
            USER_WELCOME_TEMPLATE => {
                let data: UserWelcomeData =
                    serde_json::from_value(data.clone()).map_err(|e| EmailError::TemplateData {
                        template: template_name.to_string(),
                        reason: e.to_string(),
                    })?;
                let activation_url = format!("{}/activate?token={}", self.base_url, data.token);

                Ok(RenderedEmail {
                    subject: "Welcome to Arcus! Activate your account".to_string(),
                    text_body: UserWelcomeText {
                        name: &data.name,
                        token: &data.token,
                        activation_url: &activation_url,
                    }
                    .render()?,
                    html_body: UserWelcomeHtml {
                        name: &data.name,
                        token: &data.token,
                        activation_url: &activation_url,
                    }
                    .render()?,
                })
            }
            other => Err(EmailError::UnknownTemplate(other.to_string())),
        }
    }
}

/// Renders emails and writes them to the log instead of sending them.
pub struct LogMailSender {
    templates: MailTemplates,
}

impl LogMailSender {
    pub fn new(templates: MailTemplates) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(
        &self,
        to: &str,
        template_name: &str,
        data: &serde_json::Value,
    ) -> Result<(), EmailError> {
        let email = self.templates.render(template_name, data)?;
        tracing::info!(
            to,
            template = template_name,
            subject = %email.subject,
            "[LOG MAIL] Email not sent, SMTP is not configured"
        );
        tracing::debug!(body = %email.text_body, "[LOG MAIL] Plain text body");
        Ok(())
    }
}

pub struct SmtpMailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    templates: MailTemplates,
}

impl SmtpMailSender {
    pub fn new(config: &SmtpConfig, templates: MailTemplates) -> Result<Self, EmailError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = match config.encryption {
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP relay error: {}", e)))?
                .port(config.port)
                .credentials(credentials)
                .build(),
            SmtpEncryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| EmailError::ConfigError(format!("SMTP starttls error: {}", e)))?
                    .port(config.port)
                    .credentials(credentials)
                    .build()
            }
            SmtpEncryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                    .port(config.port)
                    .credentials(credentials)
                    .build()
            }
        };

        Ok(Self {
            mailer,
            from: format!("{} <{}>", config.from_name, config.from_email),
            templates,
        })
    }

    fn build_message(&self, to: &str, email: RenderedEmail) -> Result<Message, EmailError> {
        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| EmailError::MessageBuild(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| EmailError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text_body,
                email.html_body,
            ))
            .map_err(|e| EmailError::MessageBuild(e.to_string()))
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(
        &self,
        to: &str,
        template_name: &str,
        data: &serde_json::Value,
    ) -> Result<(), EmailError> {
        let email = self.templates.render(template_name, data)?;
        let message = self.build_message(to, email)?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        tracing::info!(to, template = template_name, "Email sent");
        Ok(())
    }
}

/// Picks the SMTP sender when SMTP is configured, falling back to logging.
pub fn create_mail_sender(smtp: Option<&SmtpConfig>, base_url: &str) -> Arc<dyn MailSender> {
    let templates = MailTemplates::new(base_url);

    match smtp {
        Some(config) => match SmtpMailSender::new(config, templates.clone()) {
            Ok(sender) => {
                tracing::info!(host = %config.host, "Using SMTP mail sender");
                Arc::new(sender)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize SMTP mail sender: {}. Falling back to log sender",
                    e
                );
                Arc::new(LogMailSender::new(templates))
            }
        },
        None => {
            tracing::info!("SMTP not configured. Using log mail sender (emails will be logged)");
            Arc::new(LogMailSender::new(templates))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: "user".to_string(),
            password: "secret".to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Arcus".to_string(),
            encryption: SmtpEncryption::None,
        }
    }

    #[test]
    fn test_render_user_welcome() {
        let templates = MailTemplates::new("https://arcus.example/");
        let email = templates
            .render(
                USER_WELCOME_TEMPLATE,
                &json!({ "name": "Ada", "token": "0123abcd" }),
            )
            .unwrap();

        assert!(email.subject.contains("Activate"));
        assert!(email.text_body.contains("Hi Ada"));
        assert!(email
            .text_body
            .contains("https://arcus.example/activate?token=0123abcd"));
        assert!(email.html_body.contains("0123abcd"));
    }

    #[test]
    fn test_html_body_escapes_names() {
        let templates = MailTemplates::new("http://localhost:8080");
        let email = templates
            .render(
                USER_WELCOME_TEMPLATE,
                &json!({ "name": "<script>", "token": "ff" }),
            )
            .unwrap();

        assert!(!email.html_body.contains("<script>"));
        assert!(email.text_body.contains("<script>"));
    }

    #[test]
    fn test_unknown_template_is_rejected() {
        let templates = MailTemplates::new("http://localhost:8080");
        assert!(matches!(
            templates.render("password_reset", &json!({})),
            Err(EmailError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_template_data_must_fit() {
        let templates = MailTemplates::new("http://localhost:8080");
        assert!(matches!(
            templates.render(USER_WELCOME_TEMPLATE, &json!({ "name": "Ada" })),
            Err(EmailError::TemplateData { .. })
        ));
    }

    #[tokio::test]
    async fn test_log_sender_surfaces_template_errors() {
        let sender = LogMailSender::new(MailTemplates::new("http://localhost:8080"));

        assert!(sender
            .send(
                "ada@example.com",
                USER_WELCOME_TEMPLATE,
                &json!({ "name": "Ada", "token": "ff" })
            )
            .await
            .is_ok());
        assert!(sender
            .send("ada@example.com", "nope", &json!({}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_smtp_sender_rejects_bad_recipient() {
        let sender =
            SmtpMailSender::new(&smtp_config(), MailTemplates::new("http://localhost")).unwrap();

        let result = sender
            .send(
                "not-an-address",
                USER_WELCOME_TEMPLATE,
                &json!({ "name": "Ada", "token": "ff" }),
            )
            .await;
        assert!(matches!(result, Err(EmailError::MessageBuild(_))));
    }
}
