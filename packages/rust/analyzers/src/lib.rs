//! Analyzer contract and the standard analyzers.
//!
//! This crate provides:
//! - [`Analyzer`]: the uniform `analyze(content, context)` contract
//! - [`AnalyzerSet`]: the classification, quality, and PII analyzers used by a pipeline
//! - [`llm`]: an OpenAI-compatible chat completions client
//! - [`classification`], [`quality`], [`pii`]: the standard implementations
//!
//! Every call yields `Result<AnalysisPayload, AnalyzerError>`; callers decide
//! how failures compose.

pub mod classification;
pub mod llm;
pub mod pii;
pub mod quality;

use std::sync::Arc;

use async_trait::async_trait;

use enrichment_shared::{
    AnalyzerKind, Classification, EnrichmentError, HistoryEntry, PiiDetection, QualityAnalysis,
};

pub use classification::ClassificationAnalyzer;
pub use llm::{ChatClient, CompletionRequest};
pub use pii::PiiAnalyzer;
pub use quality::QualityAnalyzer;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Side information available to an analyzer besides the message content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisContext {
    pub assistant_response: Option<String>,
    /// Ordered conversation context, oldest first.
    pub history: Option<Vec<HistoryEntry>>,
}

/// The facet an analyzer produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    Classification(Classification),
    Quality(QualityAnalysis),
    Pii(PiiDetection),
}

impl AnalysisPayload {
    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Self::Classification(_) => AnalyzerKind::Classification,
            Self::Quality(_) => AnalyzerKind::Quality,
            Self::Pii(_) => AnalyzerKind::Pii,
        }
    }
}

/// An analyzer failed, either upstream (inference) or while parsing its output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} analyzer failed: {message}")]
pub struct AnalyzerError {
    pub kind: AnalyzerKind,
    pub message: String,
}

impl AnalyzerError {
    pub fn new(kind: AnalyzerKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<AnalyzerError> for EnrichmentError {
    fn from(err: AnalyzerError) -> Self {
        EnrichmentError::analyzer(err.kind.as_str(), err.message)
    }
}

/// One independent facet of an enrichment.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Which facet this analyzer produces.
    fn kind(&self) -> AnalyzerKind;

    /// Analyze `content` with the given context.
    async fn analyze(
        &self,
        content: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisPayload, AnalyzerError>;
}

// ---------------------------------------------------------------------------
// AnalyzerSet
// ---------------------------------------------------------------------------

/// The analyzers a pipeline fans out to.
#[derive(Clone)]
pub struct AnalyzerSet {
    pub classification: Arc<dyn Analyzer>,
    pub quality: Arc<dyn Analyzer>,
    pub pii: Arc<dyn Analyzer>,
}

impl AnalyzerSet {
    pub fn new(
        classification: Arc<dyn Analyzer>,
        quality: Arc<dyn Analyzer>,
        pii: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            classification,
            quality,
            pii,
        }
    }

    /// The standard LLM-backed classification and quality analyzers plus the
    /// regex PII detector.
    pub fn standard(client: Arc<ChatClient>) -> Self {
        Self {
            classification: Arc::new(ClassificationAnalyzer::new(client.clone())),
            quality: Arc::new(QualityAnalyzer::new(client)),
            pii: Arc::new(PiiAnalyzer::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_error_converts_to_enrichment_error() {
        let err = AnalyzerError::new(AnalyzerKind::Pii, "model unavailable");
        assert_eq!(err.to_string(), "pii analyzer failed: model unavailable");

        let converted: EnrichmentError = err.into();
        match converted {
            EnrichmentError::Analyzer { analyzer, message } => {
                assert_eq!(analyzer, "pii");
                assert_eq!(message, "model unavailable");
            }
            other => panic!("expected Analyzer, got {other:?}"),
        }
    }

    #[test]
    fn payload_reports_its_kind() {
        let payload = AnalysisPayload::Pii(PiiDetection::default());
        assert_eq!(payload.kind(), AnalyzerKind::Pii);
        let payload = AnalysisPayload::Quality(QualityAnalysis::default());
        assert_eq!(payload.kind(), AnalyzerKind::Quality);
    }
}
