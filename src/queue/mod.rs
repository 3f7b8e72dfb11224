//! Message queue plumbing between the registration path and the mail worker.
//!
//! The [`MessageQueue`] trait mirrors the small subset of AMQP semantics the
//! service relies on: idempotent queue declaration, persistent publishing,
//! pulling deliveries and explicit acknowledgement. A delivery that is never
//! acknowledged is handed out again, which gives at-least-once delivery.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use async_trait::async_trait;
use serde::Serialize;

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Queue not declared: {0}")]
    NotDeclared(String),
    #[error("Queue {0} already declared with different options")]
    PreconditionFailed(String),
    #[error("Unknown delivery {delivery_id} on queue {queue}")]
    UnknownDelivery { queue: String, delivery_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Durable queues survive a restart of the process hosting them.
    pub durable: bool,
}

impl QueueOptions {
    pub fn durable() -> Self {
        Self { durable: true }
    }
}

/// A message on its way into a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Publishing {
    pub content_type: String,
    /// Only persistent messages on durable queues survive a restart.
    pub persistent: bool,
    pub body: Vec<u8>,
}

impl Publishing {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            content_type: CONTENT_TYPE_JSON.to_string(),
            persistent: false,
            body: serde_json::to_vec(value)?,
        })
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// A message handed to a consumer. It stays owned by the queue until acked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_id: i64,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Set when an earlier delivery of this message was never acknowledged.
    pub redelivered: bool,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Creates the queue if needed. Safe to call from every producer and consumer.
    async fn declare(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError>;
    async fn publish(&self, queue: &str, publishing: Publishing) -> Result<(), QueueError>;
    /// Returns the oldest message not currently held by a consumer, if any.
    async fn next_delivery(&self, queue: &str) -> Result<Option<Delivery>, QueueError>;
    async fn ack(&self, queue: &str, delivery_id: i64) -> Result<(), QueueError>;
}
