//! Work queue collaborator used by the service front door and the workers.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use enrichment_shared::{BatchRequest, EnrichmentRequest, Result};
use enrichment_storage::Storage;

use crate::keys::new_job_id;

/// A unit of deferred work. Serialized with a `type` tag:
/// `{"type":"single", ...request}` or `{"type":"batch", ...batch}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueMessage {
    Single(EnrichmentRequest),
    Batch(BatchRequest),
}

/// A message claimed by a worker. Claiming acknowledges it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub message: QueueMessage,
}

#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue a message; returns its id.
    async fn publish(&self, message: &QueueMessage) -> Result<String>;

    /// Claim the oldest message, if any.
    async fn pull(&self) -> Result<Option<Delivery>>;
}

#[async_trait]
impl Queue for Storage {
    async fn publish(&self, message: &QueueMessage) -> Result<String> {
        let payload = serde_json::to_string(message)?;
        self.queue_publish(&payload).await
    }

    async fn pull(&self) -> Result<Option<Delivery>> {
        let Some(queued) = self.queue_pull().await? else {
            return Ok(None);
        };
        let message = serde_json::from_str(&queued.payload_json)?;
        Ok(Some(Delivery {
            id: queued.id,
            message,
        }))
    }
}

/// Process-local FIFO queue.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Delivery>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, message: &QueueMessage) -> Result<String> {
        let id = new_job_id();
        self.messages.lock().await.push_back(Delivery {
            id: id.clone(),
            message: message.clone(),
        });
        Ok(id)
    }

    async fn pull(&self) -> Result<Option<Delivery>> {
        Ok(self.messages.lock().await.pop_front())
    }
}
