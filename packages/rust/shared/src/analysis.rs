//! Analysis facets produced by the analyzers.
//!
//! Field defaults match what the classification and quality prompts are
//! asked to return, so partially-filled model output still deserializes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AnalyzerKind
// ---------------------------------------------------------------------------

/// The independent facets of an enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Classification,
    Quality,
    Pii,
}

impl AnalyzerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Quality => "quality",
            Self::Pii => "pii",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Confidence label attached to each classification facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

/// Is this message about work, and what kind?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkClassification {
    #[serde(default)]
    pub is_work: bool,
    #[serde(default)]
    pub work_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub signals: Vec<String>,
}

/// Primary topic of the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicClassification {
    #[serde(default = "default_topic")]
    pub primary: String,
    #[serde(default)]
    pub sub_topics: Vec<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// What the user is trying to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    #[serde(default = "default_intent")]
    pub primary: String,
    #[serde(default = "default_detailed_intent")]
    pub detailed: String,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub used_assistant_response: bool,
}

fn default_topic() -> String {
    "OTHER".into()
}
fn default_intent() -> String {
    "EXPRESSING".into()
}
fn default_detailed_intent() -> String {
    "unknown".into()
}

/// Output of the classification analyzer. Any facet may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub work: Option<WorkClassification>,
    #[serde(default)]
    pub topic: Option<TopicClassification>,
    #[serde(default)]
    pub intent: Option<IntentClassification>,
}

impl Classification {
    /// Confidence labels of the facets that are present, in work/topic/intent order.
    /// The inner `Option` is `None` when a facet carries no label.
    pub fn confidences(&self) -> Vec<Option<Confidence>> {
        let mut out = Vec::with_capacity(3);
        if let Some(work) = &self.work {
            out.push(work.confidence);
        }
        if let Some(topic) = &self.topic {
            out.push(topic.confidence);
        }
        if let Some(intent) = &self.intent {
            out.push(intent.confidence);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Prompt quality analysis: model scores merged with local heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub overall_score: f64,
    pub quality_level: String,
    pub clarity_score: f64,
    pub specificity_score: f64,
    pub completeness_score: f64,
    pub needs_clarification: bool,
    pub ambiguity_level: String,
    #[serde(default)]
    pub missing_elements: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub has_clear_role: bool,
    #[serde(default)]
    pub has_context: bool,
    #[serde(default)]
    pub has_clear_goal: bool,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub sentence_count: usize,
}

impl Default for QualityAnalysis {
    fn default() -> Self {
        Self {
            overall_score: 5.0,
            quality_level: "average".into(),
            clarity_score: 5.0,
            specificity_score: 5.0,
            completeness_score: 5.0,
            needs_clarification: false,
            ambiguity_level: "medium".into(),
            missing_elements: Vec::new(),
            improvement_suggestions: Vec::new(),
            has_clear_role: false,
            has_context: false,
            has_clear_goal: false,
            word_count: 0,
            sentence_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// PII
// ---------------------------------------------------------------------------

/// Kinds of personally identifiable information the detector looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    PersonName,
}

/// Overall PII exposure of a message. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// A single detected entity. `value` is already masked; offsets are byte
/// offsets into the original content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiEntity {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// Output of the PII analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiiDetection {
    pub has_pii: bool,
    pub pii_types: Vec<PiiType>,
    pub risk_level: RiskLevel,
    pub entities: Vec<PiiEntity>,
    pub redacted_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_accepts_unknown_labels() {
        let c: Confidence = serde_json::from_str(r#""very high""#).unwrap();
        assert_eq!(c, Confidence::Unknown);
        let c: Confidence = serde_json::from_str(r#""medium""#).unwrap();
        assert_eq!(c, Confidence::Medium);
    }

    #[test]
    fn classification_fills_field_defaults() {
        let json = r#"{"work":{"is_work":true,"confidence":"high"},"topic":{}}"#;
        let c: Classification = serde_json::from_str(json).unwrap();
        assert!(c.work.as_ref().unwrap().is_work);
        assert_eq!(c.topic.as_ref().unwrap().primary, "OTHER");
        assert!(c.intent.is_none());
        assert_eq!(c.confidences(), vec![Some(Confidence::High), None]);
    }

    #[test]
    fn pii_entity_serializes_type_field() {
        let entity = PiiEntity {
            pii_type: PiiType::CreditCard,
            value: "****-****-****-1111".into(),
            start: 0,
            end: 19,
        };
        let json = serde_json::to_string(&entity).unwrap();
        assert!(json.contains(r#""type":"credit_card""#));
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Low > RiskLevel::None);
    }
}
