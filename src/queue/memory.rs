use super::{Delivery, MessageQueue, Publishing, QueueError, QueueOptions};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    publishing: Publishing,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    options: QueueOptions,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<i64, StoredMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, QueueState>,
    next_id: i64,
}

/// Process-local queue. Nothing survives a restart, whatever the options say.
///
/// Unacknowledged deliveries stay parked until acked or explicitly
/// [`requeue_unacked`](MemoryQueue::requeue_unacked)ed.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting to be delivered.
    pub async fn ready_count(&self, queue: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.get(queue).map(|q| q.ready.len()).unwrap_or(0)
    }

    /// Messages delivered but not yet acknowledged.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.get(queue).map(|q| q.unacked.len()).unwrap_or(0)
    }

    /// Puts every unacknowledged delivery back at the front of the queue,
    /// the way a broker does when a consumer's channel closes.
    pub async fn requeue_unacked(&self, queue: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner.queues.get_mut(queue) {
            let mut parked: Vec<StoredMessage> = state.unacked.drain().map(|(_, m)| m).collect();
            parked.sort_by_key(|m| std::cmp::Reverse(m.id));
            for message in parked {
                state.ready.push_front(message);
            }
        }
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn declare(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        match inner.queues.get(queue) {
            Some(state) if state.options != options => {
                Err(QueueError::PreconditionFailed(queue.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                inner.queues.insert(
                    queue.to_string(),
                    QueueState {
                        options,
                        ..Default::default()
                    },
                );
                Ok(())
            }
        }
    }

    async fn publish(&self, queue: &str, publishing: Publishing) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;

        let state = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))?;
        state.ready.push_back(StoredMessage {
            id,
            publishing,
            deliveries: 0,
        });
        Ok(())
    }

    async fn next_delivery(&self, queue: &str) -> Result<Option<Delivery>, QueueError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))?;

        let Some(mut message) = state.ready.pop_front() else {
            return Ok(None);
        };
        message.deliveries += 1;

        let delivery = Delivery {
            delivery_id: message.id,
            content_type: message.publishing.content_type.clone(),
            body: message.publishing.body.clone(),
            redelivered: message.deliveries > 1,
        };
        state.unacked.insert(message.id, message);
        Ok(Some(delivery))
    }

    async fn ack(&self, queue: &str, delivery_id: i64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::NotDeclared(queue.to_string()))?;

        state
            .unacked
            .remove(&delivery_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery {
                queue: queue.to_string(),
                delivery_id,
            })
    }
}
