//! Persistence collaborator: idempotent result storage keyed by `message_id`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use enrichment_shared::{EnrichmentResult, Result};
use enrichment_storage::Storage;

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert or replace the row for `result.message_id`.
    async fn upsert(&self, result: &EnrichmentResult) -> Result<()>;

    /// Upsert several rows; returns how many were written.
    async fn upsert_many(&self, results: &[EnrichmentResult]) -> Result<usize>;

    async fn get_by_message_id(&self, message_id: &str) -> Result<Option<EnrichmentResult>>;
}

#[async_trait]
impl Persistence for Storage {
    async fn upsert(&self, result: &EnrichmentResult) -> Result<()> {
        self.upsert_enrichment(result).await
    }

    async fn upsert_many(&self, results: &[EnrichmentResult]) -> Result<usize> {
        self.upsert_enrichments(results).await
    }

    async fn get_by_message_id(&self, message_id: &str) -> Result<Option<EnrichmentResult>> {
        self.get_enrichment(message_id).await
    }
}

/// Process-local persistence for tests and dry runs.
#[derive(Default)]
pub struct MemoryPersistence {
    rows: Mutex<HashMap<String, EnrichmentResult>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn upsert(&self, result: &EnrichmentResult) -> Result<()> {
        self.rows
            .lock()
            .await
            .insert(result.message_id.clone(), result.clone());
        Ok(())
    }

    async fn upsert_many(&self, results: &[EnrichmentResult]) -> Result<usize> {
        let mut rows = self.rows.lock().await;
        for result in results {
            rows.insert(result.message_id.clone(), result.clone());
        }
        Ok(results.len())
    }

    async fn get_by_message_id(&self, message_id: &str) -> Result<Option<EnrichmentResult>> {
        Ok(self.rows.lock().await.get(message_id).cloned())
    }
}
