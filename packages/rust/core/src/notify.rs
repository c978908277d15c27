//! Batch completion webhooks.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use enrichment_shared::{BatchJob, EnrichmentError, Result, WebhookConfig};

/// Delivers a finished batch to an external URL.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// One delivery attempt; callers do not retry.
    async fn notify(&self, url: &str, job: &BatchJob) -> Result<()>;
}

/// POSTs the full `BatchJob` JSON. No retry, no signature.
pub struct HttpWebhook {
    http: reqwest::Client,
}

impl HttpWebhook {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Webhook(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Notifier for HttpWebhook {
    async fn notify(&self, url: &str, job: &BatchJob) -> Result<()> {
        let resp = self
            .http
            .post(url)
            .json(job)
            .send()
            .await
            .map_err(|e| EnrichmentError::Webhook(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, url, batch_id = %job.batch_id, "webhook returned non-success");
            return Err(EnrichmentError::Webhook(format!("{url}: HTTP {status}")));
        }
        Ok(())
    }
}
