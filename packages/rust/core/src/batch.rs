//! Batch orchestration: validate → deduplicate → group by conversation →
//! share context → fan out (parallel or sequential) → aggregate → store the
//! status snapshot → fire the completion webhook.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{Span, debug, error, info, instrument, warn};

use enrichment_shared::{
    BatchErrorEntry, BatchJob, BatchRequest, BatchSettings, BatchStatus, EnrichmentOutcome,
    EnrichmentRequest, HistoryEntry, Result, truncate_chars,
};

use crate::cache::{Cache, get_as, set_as};
use crate::keys::{batch_key, content_hash, new_batch_id};
use crate::notify::Notifier;
use crate::pipeline::EnrichmentPipeline;
use crate::tasks::BackgroundTasks;

// ---------------------------------------------------------------------------
// Pure preparation steps
// ---------------------------------------------------------------------------

/// Keep the first message for each distinct content.
pub fn deduplicate(messages: Vec<EnrichmentRequest>) -> Vec<EnrichmentRequest> {
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|m| seen.insert(content_hash(&m.content)))
        .collect()
}

/// Group messages by `conversation_id`; a message without one is its own
/// group. Groups keep first-appearance order and are sorted by `message_id`
/// within.
pub fn group_by_conversation(messages: Vec<EnrichmentRequest>) -> Vec<Vec<EnrichmentRequest>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<EnrichmentRequest>> = Vec::new();

    for message in messages {
        let key = message
            .conversation_id
            .clone()
            .unwrap_or_else(|| message.message_id.clone());
        match index.get(&key) {
            Some(&i) => groups[i].push(message),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![message]);
            }
        }
    }

    for group in &mut groups {
        group.sort_by(|a, b| a.message_id.cmp(&b.message_id));
    }
    groups
}

/// Context shared by every member of a conversation group, each entry's
/// content truncated to `max_chars`.
pub fn build_shared_context(group: &[EnrichmentRequest], max_chars: usize) -> Vec<HistoryEntry> {
    group
        .iter()
        .map(|m| HistoryEntry {
            role: m.role,
            content: truncate_chars(&m.content, max_chars).to_string(),
            message_id: m.message_id.clone(),
        })
        .collect()
}

/// Apply deduplication, grouping, and context sharing; returns the messages
/// in dispatch order.
pub fn prepare(request: &BatchRequest, context_chars: usize) -> Vec<EnrichmentRequest> {
    let messages = if request.deduplicate {
        deduplicate(request.messages.clone())
    } else {
        request.messages.clone()
    };

    if !request.share_context {
        return messages;
    }

    group_by_conversation(messages)
        .into_iter()
        .flat_map(|group| {
            let history = build_shared_context(&group, context_chars);
            group.into_iter().map(move |mut m| {
                m.conversation_history = Some(history.clone());
                m
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    successful: usize,
    failed: usize,
    cache_hits: usize,
    cache_misses: usize,
    results: Vec<EnrichmentOutcome>,
    errors: Vec<BatchErrorEntry>,
}

impl Tally {
    fn record(&mut self, outcome: EnrichmentOutcome) {
        self.processed += 1;
        if outcome.is_completed() {
            self.successful += 1;
            if outcome.cache_hit {
                self.cache_hits += 1;
            } else {
                self.cache_misses += 1;
            }
            self.results.push(outcome);
        } else {
            self.failed += 1;
            self.errors.push(BatchErrorEntry::Message {
                message_id: outcome.message_id,
                error: outcome.error.unwrap_or_else(|| "enrichment failed".into()),
            });
        }
    }

    /// Fold the tally into `job`. `abort` marks the whole batch failed.
    fn finish(self, job: &mut BatchJob, abort: Option<String>, include_partial: bool) {
        job.processed_messages = self.processed;
        job.successful_messages = self.successful;
        job.failed_messages = self.failed;
        job.cache_hits = self.cache_hits;
        job.cache_misses = self.cache_misses;

        match abort {
            Some(batch_error) => {
                job.status = BatchStatus::Failed;
                job.errors = Some(vec![BatchErrorEntry::Batch { batch_error }]);
                job.results = None;
            }
            None => {
                let clean = self.errors.is_empty();
                job.status = if clean {
                    BatchStatus::Completed
                } else {
                    BatchStatus::Partial
                };
                job.results = (clean || include_partial).then_some(self.results);
                job.errors = (!clean).then_some(self.errors);
            }
        }
    }
}

fn abort_reason(outcome: &EnrichmentOutcome) -> String {
    format!(
        "fail_fast: message {} failed: {}",
        outcome.message_id,
        outcome.error.as_deref().unwrap_or("enrichment failed")
    )
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct BatchOrchestrator {
    /// Runs each message; its cache also holds the batch snapshots.
    pipeline: Arc<EnrichmentPipeline>,
    /// Delivers the finished job to the batch webhook.
    notifier: Arc<dyn Notifier>,
    /// Owns webhook deliveries and tasks left running after an abort.
    background: Arc<BackgroundTasks>,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    pub fn new(
        pipeline: Arc<EnrichmentPipeline>,
        notifier: Arc<dyn Notifier>,
        background: Arc<BackgroundTasks>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            pipeline,
            notifier,
            background,
            settings,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    fn cache(&self) -> &dyn Cache {
        self.pipeline.cache().as_ref()
    }

    /// Run a batch to a terminal state.
    ///
    /// Only validation failures are returned as `Err`; everything after that
    /// is reported through the returned `BatchJob`.
    #[instrument(skip_all, fields(batch_id))]
    pub async fn enrich_batch(&self, request: BatchRequest) -> Result<BatchJob> {
        request.validate(self.settings.max_messages, self.settings.max_content_chars)?;

        let batch_id = request.batch_id.clone().unwrap_or_else(new_batch_id);
        Span::current().record("batch_id", batch_id.as_str());
        let started = Instant::now();

        let mut job = BatchJob::processing(
            &batch_id,
            &request.organization_id,
            request.messages.len(),
        );
        let messages = prepare(&request, self.settings.context_chars);
        info!(
            total = job.total_messages,
            unique = messages.len(),
            parallel = request.parallel_processing,
            fail_fast = request.fail_fast,
            "batch started"
        );

        let mut tally = Tally::default();
        let abort = if request.parallel_processing {
            self.run_parallel(messages, request.fail_fast, &mut tally).await
        } else {
            self.run_sequential(messages, request.fail_fast, &mut tally).await
        };

        tally.finish(&mut job, abort, request.include_partial_results);
        job.completed_at = Some(Utc::now());
        job.processing_time_ms = Some(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            status = ?job.status,
            processed = job.processed_messages,
            successful = job.successful_messages,
            failed = job.failed_messages,
            cache_hits = job.cache_hits,
            "batch finished"
        );

        self.store_snapshot(&job).await;
        if let Some(url) = &request.webhook_url {
            self.spawn_webhook(url.clone(), job.clone()).await;
        }
        Ok(job)
    }

    /// Process group by group, message by message. With `fail_fast` the first
    /// failure stops the loop and is not counted. A panic aborts the batch.
    async fn run_sequential(
        &self,
        messages: Vec<EnrichmentRequest>,
        fail_fast: bool,
        tally: &mut Tally,
    ) -> Option<String> {
        for message in messages {
            let outcome = match AssertUnwindSafe(self.pipeline.enrich_message(message))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("enrichment task panicked");
                    return Some("enrichment task panicked".into());
                }
            };
            if fail_fast && !outcome.is_completed() {
                return Some(abort_reason(&outcome));
            }
            tally.record(outcome);
        }
        None
    }

    /// Dispatch every message at once and aggregate in completion order.
    ///
    /// An abort (fail-fast or a panicked task) stops aggregation immediately.
    /// Tasks still running are handed to the background set: they finish,
    /// their outcomes are dropped.
    async fn run_parallel(
        &self,
        messages: Vec<EnrichmentRequest>,
        fail_fast: bool,
        tally: &mut Tally,
    ) -> Option<String> {
        let mut set = JoinSet::new();
        for message in messages {
            let pipeline = self.pipeline.clone();
            set.spawn(async move { pipeline.enrich_message(message).await });
        }

        let mut abort = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) if fail_fast && !outcome.is_completed() => {
                    abort = Some(abort_reason(&outcome));
                    break;
                }
                Ok(outcome) => tally.record(outcome),
                Err(e) => {
                    error!(error = %e, "enrichment task failed");
                    abort = Some(format!("enrichment task failed: {e}"));
                    break;
                }
            }
        }

        if !set.is_empty() {
            debug!(remaining = set.len(), "draining in-flight enrichments");
            self.background
                .spawn(async move { while set.join_next().await.is_some() {} })
                .await;
        }
        abort
    }

    /// Store the snapshot for status polling. A cache failure is logged only.
    pub async fn store_snapshot(&self, job: &BatchJob) -> bool {
        let stored = set_as(
            self.cache(),
            &batch_key(&job.batch_id),
            job,
            self.settings.status_ttl,
        )
        .await;
        if !stored {
            warn!(batch_id = %job.batch_id, "batch snapshot not stored");
        }
        stored
    }

    async fn spawn_webhook(&self, url: String, job: BatchJob) {
        let notifier = self.notifier.clone();
        self.background
            .spawn(async move {
                match notifier.notify(&url, &job).await {
                    Ok(()) => info!(batch_id = %job.batch_id, %url, "webhook delivered"),
                    Err(e) => error!(batch_id = %job.batch_id, %url, error = %e, "webhook failed"),
                }
            })
            .await;
    }

    /// Latest snapshot of a batch, or `None` if unknown or expired.
    pub async fn get_batch_status(&self, batch_id: &str, include_results: bool) -> Option<BatchJob> {
        let job: BatchJob = get_as(self.cache(), &batch_key(batch_id)).await?;
        Some(if include_results {
            job
        } else {
            job.without_results()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::MemoryCache;
    use crate::persistence::MemoryPersistence;
    use crate::testing::{Fakes, RecordingNotifier, ScriptedAnalyzer, message};
    use enrichment_shared::{AnalyzerKind, PipelineSettings};

    struct Harness {
        fakes: Fakes,
        notifier: Arc<RecordingNotifier>,
        background: Arc<BackgroundTasks>,
        orchestrator: BatchOrchestrator,
    }

    fn harness_with(fakes: Fakes, notifier: RecordingNotifier) -> Harness {
        let pipeline = Arc::new(EnrichmentPipeline::new(
            fakes.set(),
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryPersistence::new()),
            PipelineSettings::default(),
        ));
        let notifier = Arc::new(notifier);
        let background = Arc::new(BackgroundTasks::new());
        let orchestrator = BatchOrchestrator::new(
            pipeline,
            notifier.clone(),
            background.clone(),
            BatchSettings::default(),
        );
        Harness {
            fakes,
            notifier,
            background,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(Fakes::new(), RecordingNotifier::default())
    }

    fn failing_pii_on(marker: &str) -> Fakes {
        Fakes::with(
            ScriptedAnalyzer::new(AnalyzerKind::Classification),
            ScriptedAnalyzer::new(AnalyzerKind::Quality),
            ScriptedAnalyzer::new(AnalyzerKind::Pii).failing_on(marker),
        )
    }

    fn in_conversation(id: &str, conversation: &str, content: &str) -> EnrichmentRequest {
        let mut m = message(id, content);
        m.conversation_id = Some(conversation.into());
        m
    }

    fn assert_counters(job: &BatchJob) {
        assert_eq!(
            job.processed_messages,
            job.successful_messages + job.failed_messages
        );
        assert_eq!(job.cache_hits + job.cache_misses, job.successful_messages);
        assert!(job.processed_messages <= job.total_messages);
    }

    // -- preparation -------------------------------------------------------

    #[test]
    fn deduplicate_keeps_first_occurrence() {
        let out = deduplicate(vec![
            message("a", "same"),
            message("b", "different"),
            message("c", "same"),
        ]);
        let ids: Vec<_> = out.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn groups_keep_appearance_order_and_sort_within() {
        let groups = group_by_conversation(vec![
            in_conversation("m3", "c1", "third"),
            message("solo", "no conversation"),
            in_conversation("m1", "c1", "first"),
            in_conversation("x1", "c2", "other"),
        ]);
        let ids: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|m| m.message_id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["m1", "m3"], vec!["solo"], vec!["x1"]]);
    }

    #[test]
    fn shared_context_truncates_each_entry() {
        let group = vec![message("m1", &"a".repeat(800)), message("m2", "short")];
        let history = build_shared_context(&group, 500);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content.chars().count(), 500);
        assert_eq!(history[1].content, "short");
        assert_eq!(history[1].message_id, "m2");
    }

    // -- execution ---------------------------------------------------------

    #[tokio::test]
    async fn duplicate_content_is_analyzed_once() {
        let h = harness();
        let batch = BatchRequest::new(
            "org_1",
            vec![message("m1", "hello world"), message("m2", "hello world")],
        );

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        assert_eq!(job.total_messages, 2);
        assert_eq!(job.processed_messages, 1);
        assert_eq!(job.successful_messages, 1);
        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(h.fakes.classification.call_count(), 1);
        assert_counters(&job);
    }

    #[tokio::test]
    async fn one_failure_makes_the_batch_partial() {
        for parallel in [true, false] {
            let h = harness_with(failing_pii_on("BROKEN"), RecordingNotifier::default());
            let mut batch = BatchRequest::new(
                "org_1",
                vec![
                    message("m1", "first message"),
                    message("m2", "BROKEN message"),
                    message("m3", "third message"),
                ],
            );
            batch.parallel_processing = parallel;

            let job = h.orchestrator.enrich_batch(batch).await.unwrap();
            assert_eq!(job.status, BatchStatus::Partial);
            assert_eq!(job.successful_messages, 2);
            assert_eq!(job.failed_messages, 1);
            assert_eq!(job.results.as_ref().unwrap().len(), 2);

            let errors = job.errors.clone().unwrap();
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                &errors[0],
                BatchErrorEntry::Message { message_id, .. } if message_id == "m2"
            ));
            assert_counters(&job);
        }
    }

    #[tokio::test]
    async fn partial_results_can_be_withheld() {
        let h = harness_with(failing_pii_on("BROKEN"), RecordingNotifier::default());
        let mut batch = BatchRequest::new(
            "org_1",
            vec![message("m1", "fine"), message("m2", "BROKEN")],
        );
        batch.include_partial_results = false;

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        assert_eq!(job.status, BatchStatus::Partial);
        assert!(job.results.is_none());
        assert!(job.errors.is_some());
    }

    #[tokio::test]
    async fn sequential_fail_fast_stops_at_first_failure() {
        let h = harness_with(failing_pii_on("BROKEN"), RecordingNotifier::default());
        let mut batch = BatchRequest::new(
            "org_1",
            vec![
                message("m1", "first message"),
                message("m2", "BROKEN message"),
                message("m3", "never reached"),
            ],
        );
        batch.parallel_processing = false;
        batch.fail_fast = true;

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        assert_eq!(job.status, BatchStatus::Failed);
        assert_eq!(job.processed_messages, 1);
        assert!(job.results.is_none());
        let errors = job.errors.clone().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BatchErrorEntry::Batch { batch_error } if batch_error.contains("m2")));
        assert!(h.fakes.classification.call_for("never").is_none());
        assert_counters(&job);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_fail_fast_aborts_without_cancelling_siblings() {
        let fakes = Fakes::with(
            ScriptedAnalyzer::new(AnalyzerKind::Classification)
                .slow_on("slow", Duration::from_secs(10)),
            ScriptedAnalyzer::new(AnalyzerKind::Quality),
            ScriptedAnalyzer::new(AnalyzerKind::Pii).failing_on("BROKEN"),
        );
        let h = harness_with(fakes, RecordingNotifier::default());
        let mut batch = BatchRequest::new(
            "org_1",
            vec![
                message("m1", "slow one"),
                message("m2", "BROKEN now"),
                message("m3", "slow two"),
            ],
        );
        batch.fail_fast = true;

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        assert_eq!(job.status, BatchStatus::Failed);
        assert_eq!(job.processed_messages, 0);
        assert!(matches!(
            job.errors.as_deref(),
            Some([BatchErrorEntry::Batch { .. }])
        ));

        // The slow siblings still run to completion in the background.
        h.background.join_all().await;
        assert_eq!(h.fakes.pii.call_count(), 3);
    }

    #[tokio::test]
    async fn panicked_task_fails_the_batch() {
        for parallel in [true, false] {
            let fakes = Fakes::with(
                ScriptedAnalyzer::new(AnalyzerKind::Classification).panicking_on("explode"),
                ScriptedAnalyzer::new(AnalyzerKind::Quality),
                ScriptedAnalyzer::new(AnalyzerKind::Pii),
            );
            let h = harness_with(fakes, RecordingNotifier::default());
            let mut batch = BatchRequest::new("org_1", vec![message("m1", "explode please")]);
            batch.parallel_processing = parallel;

            let job = h.orchestrator.enrich_batch(batch).await.unwrap();
            assert_eq!(job.status, BatchStatus::Failed);
            assert!(matches!(
                job.errors.as_deref(),
                Some([BatchErrorEntry::Batch { batch_error }]) if batch_error.contains("panicked")
            ));
        }
    }

    #[tokio::test]
    async fn conversation_context_is_shared_in_message_order() {
        let h = harness();
        let long = format!("m1 {}", "x".repeat(700));
        let mut batch = BatchRequest::new(
            "org_1",
            vec![
                in_conversation("m3", "c1", "m3 what about tests?"),
                in_conversation("m1", "c1", &long),
                in_conversation("m2", "c1", "m2 and the docs?"),
            ],
        );
        batch.parallel_processing = false;

        h.orchestrator.enrich_batch(batch).await.unwrap();

        let call = h.fakes.classification.call_for("m3").unwrap();
        let history = call.context.history.unwrap();
        let ids: Vec<_> = history.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert_eq!(history[0].content.chars().count(), 500);
        assert_eq!(history[1].content, "m2 and the docs?");

        // Sequential dispatch follows the sorted order.
        let order: Vec<_> = h
            .fakes
            .classification
            .calls()
            .iter()
            .map(|c| c.content[..2].to_string())
            .collect();
        assert_eq!(order, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn context_is_not_shared_when_disabled() {
        let h = harness();
        let mut batch = BatchRequest::new(
            "org_1",
            vec![
                in_conversation("m1", "c1", "first"),
                in_conversation("m2", "c1", "second"),
            ],
        );
        batch.share_context = false;

        h.orchestrator.enrich_batch(batch).await.unwrap();
        assert!(
            h.fakes
                .classification
                .calls()
                .iter()
                .all(|c| c.context.history.is_none())
        );
    }

    #[tokio::test]
    async fn repeated_batch_is_served_from_cache() {
        let h = harness();
        let messages = vec![message("m1", "alpha"), message("m2", "beta")];

        let first = h
            .orchestrator
            .enrich_batch(BatchRequest::new("org_1", messages.clone()))
            .await
            .unwrap();
        assert_eq!(first.cache_misses, 2);

        let second = h
            .orchestrator
            .enrich_batch(BatchRequest::new("org_1", messages))
            .await
            .unwrap();
        assert_eq!(second.cache_hits, 2);
        assert_eq!(second.cache_misses, 0);
        assert_ne!(first.batch_id, second.batch_id);
        assert_counters(&second);
    }

    // -- status and webhooks -----------------------------------------------

    #[tokio::test]
    async fn status_snapshot_can_omit_results() {
        let h = harness();
        let mut batch = BatchRequest::new("org_1", vec![message("m1", "status please")]);
        batch.batch_id = Some("batch_fixed01".into());

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        assert_eq!(job.batch_id, "batch_fixed01");

        let full = h
            .orchestrator
            .get_batch_status("batch_fixed01", true)
            .await
            .unwrap();
        assert_eq!(full.status, BatchStatus::Completed);
        assert_eq!(full.results.map(|r| r.len()), Some(1));

        let brief = h
            .orchestrator
            .get_batch_status("batch_fixed01", false)
            .await
            .unwrap();
        assert!(brief.results.is_none());
        assert_eq!(brief.successful_messages, 1);

        assert!(h.orchestrator.get_batch_status("batch_unknown", true).await.is_none());
    }

    #[tokio::test]
    async fn generated_batch_ids_have_the_expected_shape() {
        let h = harness();
        let job = h
            .orchestrator
            .enrich_batch(BatchRequest::new("org_1", vec![message("m1", "id please")]))
            .await
            .unwrap();
        assert!(job.batch_id.starts_with("batch_"));
        assert_eq!(job.batch_id.len(), "batch_".len() + 8);
        assert!(job.completed_at.is_some());
        assert!(job.processing_time_ms.is_some());
    }

    #[tokio::test]
    async fn webhook_fires_once_with_the_terminal_job() {
        let h = harness();
        let mut batch = BatchRequest::new("org_1", vec![message("m1", "notify me")]);
        batch.webhook_url = Some("https://hooks.example.com/batch".into());

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        h.background.join_all().await;

        let deliveries = h.notifier.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "https://hooks.example.com/batch");
        assert_eq!(deliveries[0].1, job);
        assert!(deliveries[0].1.status.is_terminal());
    }

    #[tokio::test]
    async fn failed_batches_are_stored_and_notified() {
        let h = harness_with(failing_pii_on("BROKEN"), RecordingNotifier::default());
        let mut batch = BatchRequest::new("org_1", vec![message("m1", "BROKEN")]);
        batch.fail_fast = true;
        batch.webhook_url = Some("https://hooks.example.com/batch".into());

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        h.background.join_all().await;

        assert_eq!(job.status, BatchStatus::Failed);
        let stored = h
            .orchestrator
            .get_batch_status(&job.batch_id, false)
            .await
            .unwrap();
        assert_eq!(stored.status, BatchStatus::Failed);
        assert_eq!(h.notifier.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn webhook_failure_does_not_affect_the_batch() {
        let h = harness_with(Fakes::new(), RecordingNotifier::failing());
        let mut batch = BatchRequest::new("org_1", vec![message("m1", "hook is down")]);
        batch.webhook_url = Some("https://hooks.example.com/batch".into());

        let job = h.orchestrator.enrich_batch(batch).await.unwrap();
        h.background.join_all().await;

        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(h.notifier.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn invalid_batch_is_rejected_before_processing() {
        let h = harness();
        let batch = BatchRequest::new(
            "org_1",
            vec![message("dup", "one"), message("dup", "two")],
        );
        let err = h.orchestrator.enrich_batch(batch).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.fakes.classification.call_count(), 0);
        assert_eq!(h.background.pending().await, 0);
    }
}
