//! Cache-key derivation, identifiers, and confidence scoring.
//!
//! Everything here is a pure function of its inputs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use enrichment_shared::{Classification, Confidence};

/// Namespace for enrichment results.
pub const ENRICHMENT_PREFIX: &str = "enrichment:";
/// Namespace for batch status snapshots.
pub const BATCH_PREFIX: &str = "batch:";
/// Namespace for assistant responses handed off by the chat frontend.
pub const ASSISTANT_PREFIX: &str = "assistant:";

/// Confidence used when no classification facet is present.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content-addressed key for an enrichment: identical `(content,
/// assistant_response)` pairs map to the same key whatever their message ids.
/// A missing response hashes the same as an empty one.
pub fn cache_key(content: &str, assistant_response: Option<&str>) -> String {
    let data = format!("{content}:{}", assistant_response.unwrap_or(""));
    format!("{ENRICHMENT_PREFIX}{}", sha256_hex(&data))
}

/// Hash of the content alone, used for batch deduplication.
pub fn content_hash(content: &str) -> String {
    sha256_hex(content)
}

pub fn batch_key(batch_id: &str) -> String {
    format!("{BATCH_PREFIX}{batch_id}")
}

pub fn assistant_key(conversation_id: &str, message_id: &str) -> String {
    format!("{ASSISTANT_PREFIX}{conversation_id}:{message_id}")
}

/// `batch_` followed by 8 hex characters.
pub fn new_batch_id() -> String {
    let hex = Uuid::now_v7().simple().to_string();
    format!("batch_{}", &hex[hex.len() - 8..])
}

pub fn new_job_id() -> String {
    Uuid::now_v7().to_string()
}

/// Weight of one confidence label. Missing and unrecognised labels count
/// as medium.
pub fn confidence_weight(confidence: Option<Confidence>) -> f64 {
    match confidence {
        Some(Confidence::High) => 1.0,
        Some(Confidence::Medium) => 0.5,
        Some(Confidence::Low) => 0.25,
        Some(Confidence::Unknown) | None => DEFAULT_CONFIDENCE,
    }
}

/// Mean confidence weight across the classification facets that are present.
pub fn overall_confidence(classification: &Classification) -> f64 {
    let weights: Vec<f64> = classification
        .confidences()
        .into_iter()
        .map(confidence_weight)
        .collect();

    if weights.is_empty() {
        return DEFAULT_CONFIDENCE;
    }
    weights.iter().sum::<f64>() / weights.len() as f64
}
