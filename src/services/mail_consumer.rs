//! Background worker draining the welcome email queue.
//!
//! Deliveries are handled one at a time in delivery order. Each delivery is
//! acknowledged once handling finishes, whether the email went out or not:
//! failed sends are logged, never retried. The only deliveries left
//! unacknowledged are those interrupted by shutdown, so the queue hands them
//! out again on the next start.

use crate::config::QueueConfig;
use crate::models::NotificationCommand;
use crate::queue::{Delivery, MessageQueue, QueueError, QueueOptions, CONTENT_TYPE_JSON};
use crate::services::mail_sender::{EmailError, MailSender};
use crate::services::notification_publisher::WELCOME_EMAIL_QUEUE;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Unsupported content type: {0}")]
    ContentType(String),
    #[error("Cannot decode notification command: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Failed to send email: {0}")]
    Send(#[from] EmailError),
    #[error("Sending email timed out after {0:?}")]
    Timeout(Duration),
    #[error("Shutdown requested while sending email")]
    Cancelled,
}

pub struct MailConsumer {
    queue: Arc<dyn MessageQueue>,
    sender: Arc<dyn MailSender>,
    send_timeout: Duration,
    poll_interval: Duration,
}

impl MailConsumer {
    /// Declares the welcome email queue and returns a consumer for it.
    pub async fn new(
        queue: Arc<dyn MessageQueue>,
        sender: Arc<dyn MailSender>,
        send_timeout: Duration,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        queue
            .declare(WELCOME_EMAIL_QUEUE, QueueOptions::durable())
            .await?;

        Ok(Self {
            queue,
            sender,
            send_timeout,
            poll_interval: config.poll_interval,
        })
    }

    /// Runs the consumer loop on its own task until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(queue = WELCOME_EMAIL_QUEUE, "Mail consumer started");

        while !shutdown.is_cancelled() {
            match self.queue.next_delivery(WELCOME_EMAIL_QUEUE).await {
                Ok(Some(delivery)) => {
                    if let Err(DeliveryError::Cancelled) = self.process(delivery, &shutdown).await {
                        break;
                    }
                }
                Ok(None) => self.idle(&shutdown).await,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch delivery from mail queue");
                    self.idle(&shutdown).await;
                }
            }
        }

        tracing::info!(queue = WELCOME_EMAIL_QUEUE, "Mail consumer stopped");
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    /// Handles one delivery and acknowledges it unless shutdown interrupted it.
    pub async fn process(
        &self,
        delivery: Delivery,
        shutdown: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let delivery_id = delivery.delivery_id;
        if delivery.redelivered {
            tracing::warn!(delivery_id, "Handling redelivered mail command");
        }

        let result = self.handle_delivery(&delivery, shutdown).await;

        if matches!(result, Err(DeliveryError::Cancelled)) {
            tracing::warn!(delivery_id, "Mail delivery interrupted, leaving it unacknowledged");
            return result;
        }
        if let Err(e) = &result {
            tracing::error!(delivery_id, error = %e, "Failed to handle mail delivery");
        }

        if let Err(e) = self.queue.ack(WELCOME_EMAIL_QUEUE, delivery_id).await {
            tracing::error!(delivery_id, error = %e, "Failed to ack mail delivery");
        }

        result
    }

    async fn handle_delivery(
        &self,
        delivery: &Delivery,
        shutdown: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        if delivery.content_type != CONTENT_TYPE_JSON {
            return Err(DeliveryError::ContentType(delivery.content_type.clone()));
        }

        let command: NotificationCommand = serde_json::from_slice(&delivery.body)?;
        let send = self
            .sender
            .send(&command.to, &command.template_name, &command.template_data);

        tokio::select! {
            _ = shutdown.cancelled() => Err(DeliveryError::Cancelled),
            outcome = tokio::time::timeout(self.send_timeout, send) => match outcome {
                Ok(sent) => sent.map_err(DeliveryError::from),
                Err(_) => Err(DeliveryError::Timeout(self.send_timeout)),
            },
        }
    }
}
