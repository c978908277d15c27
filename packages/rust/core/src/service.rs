//! Service front door: decides between synchronous processing and the work
//! queue, and answers status, lookup, and PII queries.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use enrichment_analyzers::{AnalyzerSet, PiiAnalyzer};
use enrichment_shared::{
    AppConfig, BatchJob, BatchRequest, BatchSettings, EnrichmentOutcome, EnrichmentRequest,
    EnrichmentResult, PiiDetection, PipelineSettings, Priority, Result,
};
use enrichment_storage::Storage;

use crate::batch::BatchOrchestrator;
use crate::cache::Cache;
use crate::keys::new_batch_id;
use crate::notify::{HttpWebhook, Notifier};
use crate::persistence::Persistence;
use crate::pipeline::EnrichmentPipeline;
use crate::queue::{Queue, QueueMessage};
use crate::tasks::BackgroundTasks;

/// Reason reported for messages too short to be worth enriching.
pub const SKIPPED_TOO_SHORT: &str = "Content too short";

pub struct EnrichmentService {
    pipeline: Arc<EnrichmentPipeline>,
    batches: Arc<BatchOrchestrator>,
    /// Deferred work goes here; `None` processes everything inline.
    queue: Option<Arc<dyn Queue>>,
    /// Shared with the orchestrator and drained on shutdown.
    background: Arc<BackgroundTasks>,
    /// Standalone analyzer behind `detect_pii`.
    pii: PiiAnalyzer,
}

impl EnrichmentService {
    /// Wire a service from its collaborators. Without a queue every
    /// submission is processed synchronously.
    pub fn new(
        config: &AppConfig,
        analyzers: AnalyzerSet,
        cache: Arc<dyn Cache>,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        queue: Option<Arc<dyn Queue>>,
    ) -> Self {
        let background = Arc::new(BackgroundTasks::new());
        let pipeline = Arc::new(EnrichmentPipeline::new(
            analyzers,
            cache,
            persistence,
            PipelineSettings::from(config),
        ));
        let batches = Arc::new(BatchOrchestrator::new(
            pipeline.clone(),
            notifier,
            background.clone(),
            BatchSettings::from(config),
        ));
        Self {
            pipeline,
            batches,
            queue,
            background,
            pii: PiiAnalyzer::new(),
        }
    }

    /// A service whose cache, persistence, and queue all live in one libSQL
    /// store, with HTTP webhooks.
    pub fn with_storage(
        config: &AppConfig,
        storage: Arc<Storage>,
        analyzers: AnalyzerSet,
    ) -> Result<Self> {
        let notifier = Arc::new(HttpWebhook::from_config(&config.webhook)?);
        Ok(Self::new(
            config,
            analyzers,
            storage.clone(),
            storage.clone(),
            notifier,
            Some(storage),
        ))
    }

    pub fn pipeline(&self) -> &Arc<EnrichmentPipeline> {
        &self.pipeline
    }

    pub fn batches(&self) -> &Arc<BatchOrchestrator> {
        &self.batches
    }

    pub fn queue(&self) -> Option<&Arc<dyn Queue>> {
        self.queue.as_ref()
    }

    /// Accept one message. Short content is skipped; high priority (or no
    /// queue) runs inline; anything else is queued, falling back to inline
    /// processing when the queue is unavailable.
    #[instrument(skip_all, fields(message_id = %request.message_id))]
    pub async fn submit_message(&self, request: EnrichmentRequest) -> Result<EnrichmentOutcome> {
        let settings = self.pipeline.settings();
        request.validate(settings.max_content_chars)?;

        if request.content.trim().chars().count() < settings.min_content_chars {
            info!(reason = SKIPPED_TOO_SHORT, "message skipped");
            return Ok(EnrichmentOutcome::skipped(
                request.message_id,
                SKIPPED_TOO_SHORT,
            ));
        }

        let queue = match &self.queue {
            Some(queue) if request.priority != Priority::High => queue,
            _ => return Ok(self.pipeline.enrich_message(request).await),
        };

        match queue.publish(&QueueMessage::Single(request.clone())).await {
            Ok(job_id) => {
                info!(%job_id, "message queued");
                Ok(EnrichmentOutcome::processing(job_id, request.message_id))
            }
            Err(e) => {
                warn!(error = %e, "queue unavailable, processing inline");
                Ok(self.pipeline.enrich_message(request).await)
            }
        }
    }

    /// Accept a batch. Queued batches get a `processing` snapshot right away
    /// so they can be polled before a worker picks them up.
    #[instrument(skip_all, fields(organization_id = %request.organization_id))]
    pub async fn submit_batch(&self, mut request: BatchRequest) -> Result<BatchJob> {
        let settings = self.batches.settings();
        request.validate(settings.max_messages, settings.max_content_chars)?;

        let queue = match &self.queue {
            Some(queue) if request.priority != Priority::High => queue,
            _ => return self.batches.enrich_batch(request).await,
        };

        let batch_id = request.batch_id.get_or_insert_with(new_batch_id).clone();
        let snapshot = BatchJob::processing(
            &batch_id,
            &request.organization_id,
            request.messages.len(),
        );
        // Stored before publishing so a fast worker's terminal snapshot wins.
        self.batches.store_snapshot(&snapshot).await;

        match queue.publish(&QueueMessage::Batch(request.clone())).await {
            Ok(job_id) => {
                info!(%batch_id, %job_id, total = snapshot.total_messages, "batch queued");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(%batch_id, error = %e, "queue unavailable, processing inline");
                self.batches.enrich_batch(request).await
            }
        }
    }

    pub async fn batch_status(&self, batch_id: &str, include_results: bool) -> Option<BatchJob> {
        self.batches.get_batch_status(batch_id, include_results).await
    }

    /// The persisted enrichment of a message, if any.
    pub async fn lookup_enrichment(&self, message_id: &str) -> Result<Option<EnrichmentResult>> {
        self.pipeline
            .persistence()
            .get_by_message_id(message_id)
            .await
    }

    /// Run PII detection alone on ad-hoc text.
    pub fn detect_pii(&self, text: &str) -> PiiDetection {
        self.pii.detect(text)
    }

    /// Hand an assistant reply to any enrichment waiting on it.
    pub async fn publish_response(
        &self,
        conversation_id: &str,
        message_id: &str,
        response: &str,
    ) -> bool {
        let ttl = self.pipeline.settings().result_ttl;
        self.pipeline
            .responses()
            .publish(conversation_id, message_id, response, ttl)
            .await
    }

    /// Wait for webhook deliveries and other tracked background work.
    pub async fn shutdown(&self) {
        self.background.join_all().await;
    }
}
