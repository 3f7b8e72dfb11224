use super::{Delivery, MessageQueue, Publishing, QueueError, QueueOptions};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use std::time::Duration;

/// Durable queue stored in the service's SQLite database.
///
/// Messages are leased to a consumer for `visibility_timeout`; acknowledging
/// deletes them, and an expired lease makes them deliverable again.
///
/// Every message is written to the database, but only persistent messages on
/// durable queues outlive the process: [`SqliteQueue::open`] discards the rest
/// when the service starts again.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility_timeout: Duration,
}

#[derive(FromRow)]
struct DeliveryRow {
    id: i64,
    content_type: String,
    body: Vec<u8>,
    delivery_count: i64,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
        }
    }

    /// Opens the queue store after a restart.
    ///
    /// Drops non-durable queues and non-persistent messages left by the
    /// previous process, and releases leases it still held so those
    /// deliveries go out again right away.
    pub async fn open(pool: SqlitePool, visibility_timeout: Duration) -> Result<Self, QueueError> {
        let mut tx = pool.begin().await?;

        let dropped_messages = sqlx::query(
            r#"
            DELETE FROM queue_messages
            WHERE persistent = FALSE
               OR queue IN (SELECT name FROM queues WHERE durable = FALSE)
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let dropped_queues = sqlx::query("DELETE FROM queues WHERE durable = FALSE")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let released = sqlx::query(
            "UPDATE queue_messages SET locked_until = NULL WHERE locked_until IS NOT NULL",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if dropped_queues + dropped_messages + released > 0 {
            tracing::info!(
                dropped_queues,
                dropped_messages,
                released,
                "Recovered queue store from previous run"
            );
        }

        Ok(Self::new(pool, visibility_timeout))
    }
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    async fn declare(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError> {
        let existing: Option<bool> = sqlx::query_scalar("SELECT durable FROM queues WHERE name = ?")
            .bind(queue)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(durable) if durable != options.durable => {
                Err(QueueError::PreconditionFailed(queue.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT OR IGNORE INTO queues (name, durable) VALUES (?, ?)")
                    .bind(queue)
                    .bind(options.durable)
                    .execute(&self.pool)
                    .await?;
                tracing::debug!(queue, durable = options.durable, "Declared queue");
                Ok(())
            }
        }
    }

    async fn publish(&self, queue: &str, publishing: Publishing) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            INSERT INTO queue_messages (queue, content_type, persistent, body, enqueued_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(queue)
        .bind(&publishing.content_type)
        .bind(publishing.persistent)
        .bind(&publishing.body)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(QueueError::NotDeclared(queue.to_string()))
            }
            Err(e) => Err(QueueError::Database(e)),
        }
    }

    async fn next_delivery(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let lease = i64::try_from(self.visibility_timeout.as_millis()).unwrap_or(i64::MAX);
        let locked_until = now.saturating_add(lease);

        let row = sqlx::query_as::<_, DeliveryRow>(
            r#"
            UPDATE queue_messages
            SET locked_until = ?, delivery_count = delivery_count + 1
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = ? AND (locked_until IS NULL OR locked_until <= ?)
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, content_type, body, delivery_count
            "#,
        )
        .bind(locked_until)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Delivery {
            delivery_id: r.id,
            content_type: r.content_type,
            body: r.body,
            redelivered: r.delivery_count > 1,
        }))
    }

    async fn ack(&self, queue: &str, delivery_id: i64) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = ? AND queue = ?")
            .bind(delivery_id)
            .bind(queue)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownDelivery {
                queue: queue.to_string(),
                delivery_id,
            });
        }

        Ok(())
    }
}
