//! Queue worker pool: `workers` concurrent loops pull queued messages and run
//! them through the pipeline or the batch orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use enrichment_shared::AppConfig;

use crate::batch::BatchOrchestrator;
use crate::pipeline::EnrichmentPipeline;
use crate::queue::{Delivery, Queue, QueueMessage};

/// How the pool polls the queue.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub workers: usize,
    /// Pause after finding the queue empty.
    pub idle_sleep: Duration,
    /// Pause after a failed pull.
    pub error_backoff: Duration,
    /// Exit each loop once the queue is empty instead of polling forever.
    pub drain: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WorkerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.service.max_workers.max(1),
            idle_sleep: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            drain: false,
        }
    }
}

/// Totals across every loop of one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Single messages processed.
    pub messages: usize,
    /// Batches processed, including rejected ones.
    pub batches: usize,
    /// Failed messages plus rejected batches.
    pub failures: usize,
}

#[derive(Default)]
struct Counters {
    messages: AtomicUsize,
    batches: AtomicUsize,
    failures: AtomicUsize,
}

pub struct WorkerPool {
    /// Source of claimed messages.
    queue: Arc<dyn Queue>,
    /// Handles single-message jobs.
    pipeline: Arc<EnrichmentPipeline>,
    /// Handles batch jobs.
    batches: Arc<BatchOrchestrator>,
    settings: WorkerSettings,
    /// Totals reported when `run` returns.
    counters: Counters,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn Queue>,
        pipeline: Arc<EnrichmentPipeline>,
        batches: Arc<BatchOrchestrator>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            pipeline,
            batches,
            settings,
            counters: Counters::default(),
        }
    }

    /// Run every loop until shutdown is signalled (or, in drain mode, until
    /// the queue is empty). A message already claimed is always finished.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> WorkerReport {
        info!(
            workers = self.settings.workers,
            drain = self.settings.drain,
            "worker pool started"
        );

        let mut loops = JoinSet::new();
        for worker in 0..self.settings.workers {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            loops.spawn(async move { pool.run_loop(worker, shutdown).await });
        }
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker loop panicked");
            }
        }

        let report = self.report();
        info!(
            messages = report.messages,
            batches = report.batches,
            failures = report.failures,
            "worker pool stopped"
        );
        report
    }

    pub fn report(&self) -> WorkerReport {
        WorkerReport {
            messages: self.counters.messages.load(Ordering::SeqCst),
            batches: self.counters.batches.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
        }
    }

    #[instrument(skip(self, shutdown))]
    async fn run_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            let pause = match self.queue.pull().await {
                Ok(Some(delivery)) => {
                    self.process(worker, delivery).await;
                    continue;
                }
                Ok(None) if self.settings.drain => break,
                Ok(None) => self.settings.idle_sleep,
                Err(e) => {
                    warn!(error = %e, "queue pull failed, backing off");
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Handle one claimed message.
    pub async fn process(&self, worker: usize, delivery: Delivery) {
        match delivery.message {
            QueueMessage::Single(request) => {
                let outcome = self.pipeline.enrich_message(request).await;
                self.counters.messages.fetch_add(1, Ordering::SeqCst);
                if !outcome.is_completed() {
                    self.counters.failures.fetch_add(1, Ordering::SeqCst);
                }
                info!(
                    job_id = %delivery.id,
                    message_id = %outcome.message_id,
                    worker,
                    status = ?outcome.status,
                    cache_hit = outcome.cache_hit,
                    "queued message processed"
                );
            }
            QueueMessage::Batch(request) => {
                self.counters.batches.fetch_add(1, Ordering::SeqCst);
                match self.batches.enrich_batch(request).await {
                    Ok(job) => info!(
                        job_id = %delivery.id,
                        batch_id = %job.batch_id,
                        worker,
                        status = ?job.status,
                        processed = job.processed_messages,
                        "queued batch processed"
                    ),
                    Err(e) => {
                        self.counters.failures.fetch_add(1, Ordering::SeqCst);
                        error!(job_id = %delivery.id, worker, error = %e, "queued batch rejected");
                    }
                }
            }
        }
    }
}
