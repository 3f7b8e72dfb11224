use crate::models::NotificationCommand;
use crate::queue::{MessageQueue, Publishing, QueueError, QueueOptions};
use async_trait::async_trait;
use std::sync::Arc;

/// Well-known durable queue carrying welcome email commands.
pub const WELCOME_EMAIL_QUEUE: &str = "welcome_emails";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, command: &NotificationCommand) -> Result<(), PublishError>;
}

/// Publishes notification commands as persistent JSON messages.
pub struct QueueNotificationPublisher {
    queue: Arc<dyn MessageQueue>,
}

impl QueueNotificationPublisher {
    /// Declares the welcome email queue and returns a publisher bound to it.
    pub async fn new(queue: Arc<dyn MessageQueue>) -> Result<Self, QueueError> {
        queue
            .declare(WELCOME_EMAIL_QUEUE, QueueOptions::durable())
            .await?;
        Ok(Self { queue })
    }
}

#[async_trait]
impl NotificationPublisher for QueueNotificationPublisher {
    async fn publish(&self, command: &NotificationCommand) -> Result<(), PublishError> {
        let publishing = Publishing::json(command)?.persistent();
        self.queue.publish(WELCOME_EMAIL_QUEUE, publishing).await?;
        tracing::debug!(
            to = %command.to,
            template = %command.template_name,
            "Published notification command"
        );
        Ok(())
    }
}
