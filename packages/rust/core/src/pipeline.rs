//! Single-message enrichment pipeline:
//! cache check → (optional) assistant-response wait → analyzer fan-out →
//! assemble → cache write-back → persist.
//!
//! `enrich_message` never returns `Err`. Every failure is folded into a
//! `failed` outcome so batch callers can account for it per message.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use enrichment_analyzers::{AnalysisContext, AnalysisPayload, Analyzer, AnalyzerError, AnalyzerSet};
use enrichment_shared::{
    Classification, EnrichmentOutcome, EnrichmentRequest, EnrichmentResult, PiiDetection,
    PipelineSettings, QualityAnalysis, Role,
};

use crate::cache::{Cache, get_as, set_as};
use crate::keys::{cache_key, new_job_id, overall_confidence};
use crate::persistence::Persistence;
use crate::responses::AssistantResponses;

/// Facets gathered from one fan-out.
#[derive(Debug, Default)]
struct Facets {
    classification: Option<Classification>,
    quality: Option<QualityAnalysis>,
    pii: Option<PiiDetection>,
}

pub struct EnrichmentPipeline {
    analyzers: AnalyzerSet,
    cache: Arc<dyn Cache>,
    persistence: Arc<dyn Persistence>,
    responses: Arc<AssistantResponses>,
    settings: PipelineSettings,
}

impl EnrichmentPipeline {
    pub fn new(
        analyzers: AnalyzerSet,
        cache: Arc<dyn Cache>,
        persistence: Arc<dyn Persistence>,
        settings: PipelineSettings,
    ) -> Self {
        let responses = Arc::new(AssistantResponses::new(
            cache.clone(),
            settings.response_wait,
        ));
        Self {
            analyzers,
            cache,
            persistence,
            responses,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn responses(&self) -> &Arc<AssistantResponses> {
        &self.responses
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Enrich one message.
    ///
    /// A cache hit returns the stored result as-is with `cache_hit = true`.
    /// On a miss every selected analyzer runs concurrently; if any of them
    /// fails the whole enrichment fails and nothing is cached or persisted.
    #[instrument(skip_all, fields(message_id = %request.message_id))]
    pub async fn enrich_message(&self, mut request: EnrichmentRequest) -> EnrichmentOutcome {
        let started = Instant::now();
        let job_id = new_job_id();
        let key = cache_key(&request.content, request.assistant_response.as_deref());

        if let Some(mut cached) = get_as::<EnrichmentResult>(self.cache.as_ref(), &key).await {
            debug!(%key, "cache hit");
            cached.cache_hit = true;
            let mut outcome = EnrichmentOutcome::completed(job_id, cached, elapsed_ms(started), true);
            outcome.message_id = request.message_id;
            return outcome;
        }

        if self.should_wait(&request) {
            if let Some(response) = self
                .responses
                .wait(request.conversation_id.as_deref(), &request.message_id)
                .await
            {
                request.assistant_response = Some(response);
            }
        }

        let facets = match self.run_analyzers(&request).await {
            Ok(facets) => facets,
            Err(e) => {
                warn!(analyzer = %e.kind, error = %e.message, "enrichment failed");
                return EnrichmentOutcome::failed(job_id, request.message_id, e.to_string());
            }
        };

        let result = self.assemble(&request, facets, started);

        if !set_as(self.cache.as_ref(), &key, &result, self.settings.result_ttl).await {
            warn!(%key, "result not cached");
        }

        if let Err(e) = self.persistence.upsert(&result).await {
            error!(error = %e, "failed to persist enrichment");
            return EnrichmentOutcome::failed(job_id, request.message_id, e.to_string());
        }

        let elapsed = elapsed_ms(started);
        info!(
            elapsed_ms = elapsed,
            confidence = result.overall_confidence,
            used_assistant_response = result.used_assistant_response,
            "message enriched"
        );
        EnrichmentOutcome::completed(job_id, result, elapsed, false)
    }

    /// Only user messages in a conversation, still missing their reply,
    /// wait for one.
    fn should_wait(&self, request: &EnrichmentRequest) -> bool {
        request.wait_for_response
            && request.role == Role::User
            && request.conversation_id.is_some()
            && request.assistant_response.is_none()
    }

    async fn run_analyzers(&self, request: &EnrichmentRequest) -> Result<Facets, AnalyzerError> {
        let context = AnalysisContext {
            assistant_response: request.assistant_response.clone(),
            history: request.conversation_history.clone(),
        };

        let mut selected: Vec<&Arc<dyn Analyzer>> = vec![&self.analyzers.classification];
        if request.include_quality_analysis {
            selected.push(&self.analyzers.quality);
        }
        if request.include_pii_detection {
            selected.push(&self.analyzers.pii);
        }

        let outputs = join_all(
            selected
                .iter()
                .map(|analyzer| analyzer.analyze(&request.content, &context)),
        )
        .await;

        // First failure in dispatch order wins.
        outputs.into_iter().try_fold(Facets::default(), |mut facets, output| {
            match output? {
                AnalysisPayload::Classification(c) => facets.classification = Some(c),
                AnalysisPayload::Quality(q) => facets.quality = Some(q),
                AnalysisPayload::Pii(p) => facets.pii = Some(p),
            }
            Ok(facets)
        })
    }

    fn assemble(
        &self,
        request: &EnrichmentRequest,
        facets: Facets,
        started: Instant,
    ) -> EnrichmentResult {
        let classification = facets.classification.unwrap_or_default();
        let overall_confidence = overall_confidence(&classification);

        EnrichmentResult {
            message_id: request.message_id.clone(),
            user_id: request.user_id.clone(),
            organization_id: request.organization_id.clone(),
            enriched_at: Utc::now(),
            processing_time_ms: elapsed_ms(started),
            work_classification: classification.work,
            topic_classification: classification.topic,
            intent_classification: classification.intent,
            quality_analysis: facets.quality,
            pii_detection: facets.pii,
            overall_confidence,
            used_assistant_response: request
                .assistant_response
                .as_deref()
                .is_some_and(|r| !r.is_empty()),
            model_used: self.settings.model_used.clone(),
            cache_hit: false,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::MemoryCache;
    use crate::persistence::MemoryPersistence;
    use crate::testing::{
        FailingPersistence, Fakes, ScriptedAnalyzer, UnavailableCache, message,
    };
    use enrichment_shared::{AnalyzerKind, OutcomeStatus};

    struct Harness {
        fakes: Fakes,
        cache: Arc<MemoryCache>,
        persistence: Arc<MemoryPersistence>,
        pipeline: EnrichmentPipeline,
    }

    fn harness_with(fakes: Fakes) -> Harness {
        let cache = Arc::new(MemoryCache::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let pipeline = EnrichmentPipeline::new(
            fakes.set(),
            cache.clone(),
            persistence.clone(),
            PipelineSettings::default(),
        );
        Harness {
            fakes,
            cache,
            persistence,
            pipeline,
        }
    }

    fn harness() -> Harness {
        harness_with(Fakes::new())
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let h = harness();

        let first = h
            .pipeline
            .enrich_message(message("m1", "How do I deploy this service?"))
            .await;
        assert_eq!(first.status, OutcomeStatus::Completed);
        assert!(!first.cache_hit);

        let second = h
            .pipeline
            .enrich_message(message("m1", "How do I deploy this service?"))
            .await;
        assert!(second.cache_hit);
        let (first, second) = (first.result.unwrap(), second.result.unwrap());
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.enriched_at, first.enriched_at);
        assert_eq!(second.work_classification, first.work_classification);
        assert_eq!(second.pii_detection, first.pii_detection);
        assert_eq!(h.fakes.classification.call_count(), 1);
        assert_eq!(h.persistence.len().await, 1);
    }

    #[tokio::test]
    async fn cache_hit_reports_the_requesting_message_id() {
        let h = harness();
        h.pipeline
            .enrich_message(message("m1", "same words twice"))
            .await;
        let hit = h
            .pipeline
            .enrich_message(message("m2", "same words twice"))
            .await;
        assert!(hit.cache_hit);
        assert_eq!(hit.message_id, "m2");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_result_is_recomputed() {
        let h = harness();
        h.pipeline
            .enrich_message(message("m1", "cached for an hour"))
            .await;

        tokio::time::advance(Duration::from_secs(3601)).await;

        let again = h
            .pipeline
            .enrich_message(message("m1", "cached for an hour"))
            .await;
        assert!(!again.cache_hit);
        assert_eq!(h.fakes.classification.call_count(), 2);
    }

    #[tokio::test]
    async fn analyzer_failure_discards_the_whole_enrichment() {
        let h = harness_with(Fakes::with(
            ScriptedAnalyzer::new(AnalyzerKind::Classification),
            ScriptedAnalyzer::new(AnalyzerKind::Quality),
            ScriptedAnalyzer::new(AnalyzerKind::Pii).failing_on("ssn"),
        ));

        let outcome = h
            .pipeline
            .enrich_message(message("m1", "my ssn is on file"))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.result.is_none());
        assert!(outcome.error.unwrap().contains("pii analyzer failed"));

        assert_eq!(h.cache.len().await, 0);
        assert_eq!(h.persistence.len().await, 0);
    }

    #[tokio::test]
    async fn disabled_facets_are_not_requested() {
        let h = harness();
        let mut request = message("m1", "just classify this");
        request.include_quality_analysis = false;
        request.include_pii_detection = false;

        let outcome = h.pipeline.enrich_message(request).await;
        let result = outcome.result.unwrap();
        assert!(result.quality_analysis.is_none());
        assert!(result.pii_detection.is_none());
        assert!(result.work_classification.is_some());
        assert_eq!(h.fakes.quality.call_count(), 0);
        assert_eq!(h.fakes.pii.call_count(), 0);
    }

    #[tokio::test]
    async fn result_carries_assembled_metadata() {
        let h = harness();
        let outcome = h
            .pipeline
            .enrich_message(message("m1", "Refactor the billing module"))
            .await;
        let result = outcome.result.unwrap();

        assert_eq!(result.message_id, "m1");
        assert_eq!(result.organization_id, "org_1");
        assert!((result.overall_confidence - 1.75 / 3.0).abs() < 1e-9);
        assert!(result.quality_analysis.is_some());
        assert!(result.pii_detection.is_some());
        assert!(!result.used_assistant_response);
        assert_eq!(result.model_used, PipelineSettings::default().model_used);
        assert!(!result.cache_hit);
    }

    #[tokio::test]
    async fn persistence_failure_fails_the_outcome() {
        let fakes = Fakes::new();
        let pipeline = EnrichmentPipeline::new(
            fakes.set(),
            Arc::new(MemoryCache::new()),
            Arc::new(FailingPersistence),
            PipelineSettings::default(),
        );
        let outcome = pipeline.enrich_message(message("m1", "write me down")).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.error.unwrap().contains("database is locked"));
    }

    #[tokio::test]
    async fn unavailable_cache_degrades_to_misses() {
        let fakes = Fakes::new();
        let persistence = Arc::new(MemoryPersistence::new());
        let pipeline = EnrichmentPipeline::new(
            fakes.set(),
            Arc::new(UnavailableCache),
            persistence.clone(),
            PipelineSettings::default(),
        );
        for _ in 0..2 {
            let outcome = pipeline.enrich_message(message("m1", "no cache today")).await;
            assert!(outcome.is_completed());
            assert!(!outcome.cache_hit);
        }
        assert_eq!(fakes.classification.call_count(), 2);
        assert_eq!(persistence.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_published_assistant_response() {
        let h = Arc::new(harness());
        let mut request = message("m1", "What's the capital of France?");
        request.wait_for_response = true;
        request.conversation_id = Some("c1".into());

        let task = {
            let h = h.clone();
            tokio::spawn(async move { h.pipeline.enrich_message(request).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.pipeline
            .responses()
            .publish("c1", "m1", "Paris.", Duration::from_secs(60))
            .await;

        let outcome = task.await.unwrap();
        assert!(outcome.result.unwrap().used_assistant_response);
        let call = h.fakes.classification.call_for("What's").unwrap();
        assert_eq!(call.context.assistant_response.as_deref(), Some("Paris."));

        // Written back under the key computed before the wait.
        let key = cache_key("What's the capital of France?", None);
        assert!(h.cache.get(&key).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_waiting_at_the_deadline() {
        let h = harness();
        let mut request = message("m1", "anyone there?");
        request.wait_for_response = true;
        request.conversation_id = Some("c1".into());

        let started = tokio::time::Instant::now();
        let outcome = h.pipeline.enrich_message(request).await;
        assert!(started.elapsed() >= PipelineSettings::default().response_wait);
        assert!(outcome.is_completed());
        assert!(!outcome.result.unwrap().used_assistant_response);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_enrichment_picks_up_a_reply_written_to_the_cache() {
        let h = harness();
        let pipeline = Arc::new(h.pipeline);
        let mut request = message("m1", "can you check the logs?");
        request.wait_for_response = true;
        request.conversation_id = Some("c1".into());

        let started = tokio::time::Instant::now();
        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.enrich_message(request).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let key = crate::keys::assistant_key("c1", "m1");
        assert!(h.cache.set(&key, "Found the error.".into(), Duration::from_secs(60)).await);

        let outcome = running.await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(outcome.result.unwrap().used_assistant_response);
    }

    #[tokio::test(start_paused = true)]
    async fn assistant_messages_never_wait() {
        let h = harness();
        let mut request = message("m1", "Here is the answer.");
        request.wait_for_response = true;
        request.role = Role::Assistant;
        request.conversation_id = Some("c1".into());

        let started = tokio::time::Instant::now();
        h.pipeline.enrich_message(request).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn supplied_response_is_used_and_changes_the_key() {
        let h = harness();
        let mut with_reply = message("m1", "Is it ready?");
        with_reply.assistant_response = Some("Yes, shipped.".into());

        let first = h.pipeline.enrich_message(with_reply).await;
        assert!(first.result.unwrap().used_assistant_response);

        let without_reply = h
            .pipeline
            .enrich_message(message("m1", "Is it ready?"))
            .await;
        assert!(!without_reply.cache_hit);
        assert_eq!(h.fakes.classification.call_count(), 2);
    }
}
