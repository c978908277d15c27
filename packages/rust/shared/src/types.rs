//! Core domain types: requests, results, outcome envelopes, and batch jobs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::analysis::{
    IntentClassification, PiiDetection, QualityAnalysis, TopicClassification, WorkClassification,
};
use crate::error::{EnrichmentError, Result};

// ---------------------------------------------------------------------------
// Small enums
// ---------------------------------------------------------------------------

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Scheduling priority. `High` is always processed synchronously.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One entry of conversation context handed to the analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub message_id: String,
}

/// A request to enrich a single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    /// Caller-assigned id; the persistence key.
    pub message_id: String,
    pub user_id: String,
    pub organization_id: String,
    /// Text to analyze.
    pub content: String,
    /// Who wrote the message. Only user messages wait for a reply.
    #[serde(default)]
    pub role: Role,

    /// Groups messages for shared context and names the reply slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    /// Companion assistant reply. Resolved in place by the pipeline when it
    /// waits for a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_response: Option<String>,
    /// Injected by the batch orchestrator when conversation context is shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<HistoryEntry>>,

    /// High priority bypasses the queue.
    #[serde(default)]
    pub priority: Priority,
    /// Wait a bounded time for the assistant reply before analyzing.
    #[serde(default = "default_true")]
    pub wait_for_response: bool,
    /// Run the PII analyzer.
    #[serde(default = "default_true")]
    pub include_pii_detection: bool,
    /// Run the quality analyzer.
    #[serde(default = "default_true")]
    pub include_quality_analysis: bool,
}

impl EnrichmentRequest {
    /// Build a request with default options.
    pub fn new(
        message_id: impl Into<String>,
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            content: content.into(),
            role: Role::User,
            conversation_id: None,
            parent_message_id: None,
            assistant_response: None,
            conversation_history: None,
            priority: Priority::Normal,
            wait_for_response: true,
            include_pii_detection: true,
            include_quality_analysis: true,
        }
    }

    /// Reject blank or oversize content.
    pub fn validate(&self, max_content_chars: usize) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(EnrichmentError::validation(format!(
                "message {}: content cannot be empty",
                self.message_id
            )));
        }
        if self.content.chars().count() > max_content_chars {
            return Err(EnrichmentError::validation(format!(
                "message {}: content exceeds maximum length of {max_content_chars} characters",
                self.message_id
            )));
        }
        Ok(())
    }
}

/// A request to enrich many messages as one tracked batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub organization_id: String,
    pub messages: Vec<EnrichmentRequest>,

    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub parallel_processing: bool,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_true")]
    pub share_context: bool,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_true")]
    pub include_partial_results: bool,
}

impl BatchRequest {
    /// Build a batch with default options.
    pub fn new(organization_id: impl Into<String>, messages: Vec<EnrichmentRequest>) -> Self {
        Self {
            batch_id: None,
            organization_id: organization_id.into(),
            messages,
            priority: Priority::Normal,
            parallel_processing: true,
            fail_fast: false,
            share_context: true,
            deduplicate: true,
            webhook_url: None,
            include_partial_results: true,
        }
    }

    /// Reject malformed batches before any processing begins.
    pub fn validate(&self, max_messages: usize, max_content_chars: usize) -> Result<()> {
        if self.messages.is_empty() {
            return Err(EnrichmentError::validation("batch contains no messages"));
        }
        if self.messages.len() > max_messages {
            return Err(EnrichmentError::validation(format!(
                "Maximum {max_messages} messages per batch"
            )));
        }

        let mut seen = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if !seen.insert(message.message_id.as_str()) {
                return Err(EnrichmentError::validation(format!(
                    "Duplicate message IDs found in batch: {}",
                    message.message_id
                )));
            }
            message.validate(max_content_chars)?;
        }

        if let Some(webhook) = &self.webhook_url {
            let valid = Url::parse(webhook)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(EnrichmentError::validation(
                    "Webhook URL must be a valid HTTP/HTTPS URL",
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The assembled enrichment of one message. Immutable once built; this is
/// the unit stored in the cache and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub message_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub enriched_at: DateTime<Utc>,
    pub processing_time_ms: f64,

    pub work_classification: Option<WorkClassification>,
    pub topic_classification: Option<TopicClassification>,
    pub intent_classification: Option<IntentClassification>,

    pub quality_analysis: Option<QualityAnalysis>,
    pub pii_detection: Option<PiiDetection>,

    pub overall_confidence: f64,
    pub used_assistant_response: bool,
    pub model_used: String,
    #[serde(default)]
    pub cache_hit: bool,
}

/// Lifecycle of a single-message job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// Response envelope for a single-message enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub job_id: String,
    pub status: OutcomeStatus,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EnrichmentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why a message was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EnrichmentOutcome {
    pub fn completed(
        job_id: impl Into<String>,
        result: EnrichmentResult,
        processing_time_ms: f64,
        cache_hit: bool,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: OutcomeStatus::Completed,
            message_id: result.message_id.clone(),
            result: Some(result),
            processing_time_ms: Some(processing_time_ms),
            cache_hit,
            error: None,
            reason: None,
        }
    }

    pub fn failed(
        job_id: impl Into<String>,
        message_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: OutcomeStatus::Failed,
            message_id: message_id.into(),
            result: None,
            processing_time_ms: None,
            cache_hit: false,
            error: Some(error.into()),
            reason: None,
        }
    }

    pub fn skipped(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job_id: "skipped".into(),
            status: OutcomeStatus::Skipped,
            message_id: message_id.into(),
            result: None,
            processing_time_ms: None,
            cache_hit: false,
            error: None,
            reason: Some(reason.into()),
        }
    }

    pub fn processing(job_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: OutcomeStatus::Processing,
            message_id: message_id.into(),
            result: None,
            processing_time_ms: None,
            cache_hit: false,
            error: None,
            reason: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Batch jobs
// ---------------------------------------------------------------------------

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// One entry of a batch's `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchErrorEntry {
    /// A single message failed.
    Message { message_id: String, error: String },
    /// The batch itself was aborted.
    Batch { batch_error: String },
}

/// Status snapshot of a batch; the system of record for status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub batch_id: String,
    pub status: BatchStatus,
    pub organization_id: String,

    /// Requests submitted, before deduplication.
    pub total_messages: usize,
    /// Outcomes aggregated so far.
    pub processed_messages: usize,
    pub successful_messages: usize,
    pub failed_messages: usize,

    /// Completed outcomes; present when there were no errors or partial
    /// results were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<EnrichmentOutcome>>,
    /// Per-message failures, or a single batch-level entry on abort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<BatchErrorEntry>>,

    pub started_at: DateTime<Utc>,
    /// Set once the batch reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the whole batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,

    /// Successful outcomes served from the result cache.
    #[serde(default)]
    pub cache_hits: usize,
    /// Successful outcomes that ran the analyzers.
    #[serde(default)]
    pub cache_misses: usize,
}

impl BatchJob {
    /// A fresh snapshot for a batch that has just been accepted.
    pub fn processing(
        batch_id: impl Into<String>,
        organization_id: impl Into<String>,
        total_messages: usize,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            status: BatchStatus::Processing,
            organization_id: organization_id.into(),
            total_messages,
            processed_messages: 0,
            successful_messages: 0,
            failed_messages: 0,
            results: None,
            errors: None,
            started_at: Utc::now(),
            completed_at: None,
            processing_time_ms: None,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Drop the per-message results, keeping counters and errors.
    pub fn without_results(mut self) -> Self {
        self.results = None;
        self
    }
}
