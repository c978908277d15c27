//! In-memory fakes shared by the orchestration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use enrichment_analyzers::{AnalysisContext, AnalysisPayload, Analyzer, AnalyzerError, AnalyzerSet};
use enrichment_shared::{
    AnalyzerKind, BatchJob, Classification, Confidence, EnrichmentError, EnrichmentRequest,
    EnrichmentResult, IntentClassification, PiiDetection, QualityAnalysis, Result,
    TopicClassification, WorkClassification,
};

use crate::cache::Cache;
use crate::notify::Notifier;
use crate::persistence::Persistence;

// ---------------------------------------------------------------------------
// Analyzers
// ---------------------------------------------------------------------------

/// One recorded `analyze` call.
#[derive(Debug, Clone)]
pub struct AnalyzerCall {
    pub content: String,
    pub context: AnalysisContext,
}

/// Analyzer with canned output. Content containing a configured marker makes
/// it fail, panic, or sleep first.
pub struct ScriptedAnalyzer {
    kind: AnalyzerKind,
    calls: Mutex<Vec<AnalyzerCall>>,
    count: AtomicUsize,
    fail_on: Option<String>,
    panic_on: Option<String>,
    slow_on: Option<(String, Duration)>,
}

impl ScriptedAnalyzer {
    pub fn new(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            fail_on: None,
            panic_on: None,
            slow_on: None,
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_on = Some(marker.to_string());
        self
    }

    pub fn slow_on(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_on = Some((marker.to_string(), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<AnalyzerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The recorded call whose content starts with `prefix`.
    pub fn call_for(&self, prefix: &str) -> Option<AnalyzerCall> {
        self.calls()
            .into_iter()
            .find(|c| c.content.starts_with(prefix))
    }

    fn payload(&self) -> AnalysisPayload {
        match self.kind {
            AnalyzerKind::Classification => AnalysisPayload::Classification(sample_classification()),
            AnalyzerKind::Quality => AnalysisPayload::Quality(QualityAnalysis::default()),
            AnalyzerKind::Pii => AnalysisPayload::Pii(PiiDetection::default()),
        }
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    async fn analyze(
        &self,
        content: &str,
        context: &AnalysisContext,
    ) -> std::result::Result<AnalysisPayload, AnalyzerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(AnalyzerCall {
            content: content.to_string(),
            context: context.clone(),
        });

        if let Some((marker, delay)) = &self.slow_on {
            if content.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some(marker) = &self.panic_on {
            if content.contains(marker.as_str()) {
                panic!("scripted panic");
            }
        }
        if let Some(marker) = &self.fail_on {
            if content.contains(marker.as_str()) {
                return Err(AnalyzerError::new(self.kind, "scripted failure"));
            }
        }
        Ok(self.payload())
    }
}

/// Handles on the three analyzers behind an [`AnalyzerSet`].
pub struct Fakes {
    pub classification: Arc<ScriptedAnalyzer>,
    pub quality: Arc<ScriptedAnalyzer>,
    pub pii: Arc<ScriptedAnalyzer>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::with(
            ScriptedAnalyzer::new(AnalyzerKind::Classification),
            ScriptedAnalyzer::new(AnalyzerKind::Quality),
            ScriptedAnalyzer::new(AnalyzerKind::Pii),
        )
    }

    pub fn with(
        classification: ScriptedAnalyzer,
        quality: ScriptedAnalyzer,
        pii: ScriptedAnalyzer,
    ) -> Self {
        Self {
            classification: Arc::new(classification),
            quality: Arc::new(quality),
            pii: Arc::new(pii),
        }
    }

    pub fn set(&self) -> AnalyzerSet {
        AnalyzerSet::new(
            self.classification.clone(),
            self.quality.clone(),
            self.pii.clone(),
        )
    }
}

/// High / medium / low confidences: overall confidence 0.5833.
pub fn sample_classification() -> Classification {
    Classification {
        work: Some(WorkClassification {
            is_work: true,
            work_type: Some("coding".into()),
            confidence: Some(Confidence::High),
            reasoning: "mentions a deploy".into(),
            signals: vec!["deploy".into()],
        }),
        topic: Some(TopicClassification {
            primary: "TECHNICAL".into(),
            sub_topics: vec![],
            confidence: Some(Confidence::Medium),
            keywords: vec![],
        }),
        intent: Some(IntentClassification {
            primary: "ASKING".into(),
            detailed: "how-to".into(),
            confidence: Some(Confidence::Low),
            used_assistant_response: false,
        }),
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// A user message that does not wait for an assistant response.
pub fn message(message_id: &str, content: &str) -> EnrichmentRequest {
    let mut request = EnrichmentRequest::new(message_id, "user_1", "org_1", content);
    request.wait_for_response = false;
    request
}

pub fn sample_result(message_id: &str) -> EnrichmentResult {
    let classification = sample_classification();
    EnrichmentResult {
        message_id: message_id.into(),
        user_id: "user_1".into(),
        organization_id: "org_1".into(),
        enriched_at: Utc::now(),
        processing_time_ms: 1.0,
        work_classification: classification.work,
        topic_classification: classification.topic,
        intent_classification: classification.intent,
        quality_analysis: None,
        pii_detection: None,
        overall_confidence: 0.5,
        used_assistant_response: false,
        model_used: "test-model".into(),
        cache_hit: false,
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Records every delivery; optionally fails each one.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, BatchJob)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<(String, BatchJob)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, url: &str, job: &BatchJob) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((url.to_string(), job.clone()));
        if self.fail {
            return Err(EnrichmentError::Webhook("connection refused".into()));
        }
        Ok(())
    }
}

/// A cache whose backend is always down.
pub struct UnavailableCache;

#[async_trait]
impl Cache for UnavailableCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> bool {
        false
    }
}

/// Persistence whose writes always fail.
pub struct FailingPersistence;

#[async_trait]
impl Persistence for FailingPersistence {
    async fn upsert(&self, _result: &EnrichmentResult) -> Result<()> {
        Err(EnrichmentError::Storage("database is locked".into()))
    }

    async fn upsert_many(&self, _results: &[EnrichmentResult]) -> Result<usize> {
        Err(EnrichmentError::Storage("database is locked".into()))
    }

    async fn get_by_message_id(&self, _message_id: &str) -> Result<Option<EnrichmentResult>> {
        Ok(None)
    }
}
