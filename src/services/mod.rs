pub mod activation_service;
pub mod mail_consumer;
pub mod mail_sender;
pub mod notification_publisher;
pub mod token_sweeper;

pub use activation_service::{ActivationError, ActivationService};
pub use mail_consumer::{DeliveryError, MailConsumer};
pub use mail_sender::{
    create_mail_sender, EmailError, LogMailSender, MailSender, MailTemplates, RenderedEmail,
    SmtpMailSender,
};
pub use notification_publisher::{
    NotificationPublisher, PublishError, QueueNotificationPublisher, WELCOME_EMAIL_QUEUE,
};
pub use token_sweeper::spawn_token_sweeper;
