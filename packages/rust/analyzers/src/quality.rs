//! Prompt quality scoring: model scores merged with local heuristics.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use enrichment_shared::{AnalyzerKind, QualityAnalysis, truncate_chars};

use crate::llm::{ChatClient, CompletionRequest, extract_json};
use crate::{AnalysisContext, AnalysisPayload, Analyzer, AnalyzerError};

const SYSTEM_PROMPT: &str = "You are a prompt quality analyzer. Return only valid JSON.";

const PROMPT_TEMPLATE: &str = r#"Rate the quality of the user prompt below on a 0-10 scale.

USER PROMPT:
{user_message}

ASSISTANT RESPONSE:
{assistant_response}

CLARIFICATION SIGNALS:
{clarification_signals}

Return a single JSON object:
{
  "overall_score": number,
  "quality_level": "excellent|good|average|poor",
  "clarity_score": number,
  "specificity_score": number,
  "completeness_score": number,
  "needs_clarification": bool,
  "ambiguity_level": "low|medium|high",
  "missing_elements": [string],
  "improvement_suggestions": [string]
}
Return only the JSON object."#;

const MAX_PROMPT_CHARS: usize = 2000;

const ROLE_PHRASES: &[&str] = &[
    "you are",
    "act as",
    "pretend",
    "imagine you",
    "tu es",
    "agis comme",
    "en tant que",
];

const CONTEXT_PHRASES: &[&str] = &[
    "context:",
    "background:",
    "given that",
    "contexte:",
    "sachant que",
];

const GOAL_PHRASES: &[&str] = &[
    "i want",
    "i need",
    "please help",
    "can you",
    "je veux",
    "j'ai besoin",
    "peux-tu",
];

/// Phrases an assistant uses when it had to ask for more detail.
const CLARIFICATION_PHRASES: &[&str] = &[
    "could you clarify",
    "could you provide more",
    "what specifically",
    "can you elaborate",
    "do you mean",
    "which particular",
    "pouvez-vous préciser",
    "pourriez-vous clarifier",
];

static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

/// Map a 0-10 score onto the quality bands.
pub fn quality_level_for(score: f64) -> &'static str {
    if score >= 8.0 {
        "excellent"
    } else if score >= 6.0 {
        "good"
    } else if score >= 4.0 {
        "average"
    } else {
        "poor"
    }
}

/// Fields computed locally; these always win over the model's opinion.
#[derive(Debug, Clone, PartialEq)]
struct Heuristics {
    has_clear_role: bool,
    has_context: bool,
    has_clear_goal: bool,
    word_count: usize,
    sentence_count: usize,
}

fn heuristics(content: &str) -> Heuristics {
    let lower = content.to_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    Heuristics {
        has_clear_role: contains_any(ROLE_PHRASES),
        has_context: contains_any(CONTEXT_PHRASES),
        has_clear_goal: contains_any(GOAL_PHRASES),
        word_count: content.split_whitespace().count(),
        sentence_count: SENTENCE_BREAK
            .split(content)
            .filter(|s| !s.trim().is_empty())
            .count(),
    }
}

/// One-line summary of clarification requests in the assistant response.
fn clarification_signals(assistant_response: Option<&str>) -> String {
    let Some(response) = assistant_response.filter(|r| !r.is_empty()) else {
        return "No assistant response available".to_string();
    };

    let lower = response.to_lowercase();
    let found: Vec<&str> = CLARIFICATION_PHRASES
        .iter()
        .copied()
        .filter(|p| lower.contains(p))
        .collect();

    if found.is_empty() {
        "No clarification requested".to_string()
    } else {
        format!("Assistant asked for clarification: {}", found.join(", "))
    }
}

#[derive(Deserialize)]
struct RawQuality {
    overall_score: Option<f64>,
    quality_level: Option<String>,
    clarity_score: Option<f64>,
    specificity_score: Option<f64>,
    completeness_score: Option<f64>,
    needs_clarification: Option<bool>,
    ambiguity_level: Option<String>,
    #[serde(default)]
    missing_elements: Vec<String>,
    #[serde(default)]
    improvement_suggestions: Vec<String>,
}

fn parse_quality(reply: &str, local: Heuristics) -> Result<QualityAnalysis, AnalyzerError> {
    let raw: RawQuality = serde_json::from_str(extract_json(reply)).map_err(|e| {
        AnalyzerError::new(AnalyzerKind::Quality, format!("unparseable model output: {e}"))
    })?;

    let defaults = QualityAnalysis::default();
    let overall_score = raw.overall_score.unwrap_or(defaults.overall_score);

    Ok(QualityAnalysis {
        overall_score,
        quality_level: raw
            .quality_level
            .unwrap_or_else(|| quality_level_for(overall_score).to_string()),
        clarity_score: raw.clarity_score.unwrap_or(defaults.clarity_score),
        specificity_score: raw.specificity_score.unwrap_or(defaults.specificity_score),
        completeness_score: raw.completeness_score.unwrap_or(defaults.completeness_score),
        needs_clarification: raw.needs_clarification.unwrap_or(false),
        ambiguity_level: raw.ambiguity_level.unwrap_or(defaults.ambiguity_level),
        missing_elements: raw.missing_elements,
        improvement_suggestions: raw.improvement_suggestions,
        has_clear_role: local.has_clear_role,
        has_context: local.has_context,
        has_clear_goal: local.has_clear_goal,
        word_count: local.word_count,
        sentence_count: local.sentence_count,
    })
}

/// LLM-backed quality analyzer.
pub struct QualityAnalyzer {
    client: Arc<ChatClient>,
}

impl QualityAnalyzer {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for QualityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Quality
    }

    #[instrument(skip_all, fields(chars = content.len()))]
    async fn analyze(
        &self,
        content: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisPayload, AnalyzerError> {
        let local = heuristics(content);
        let assistant = context.assistant_response.as_deref();

        let prompt = PROMPT_TEMPLATE
            .replace(
                "{clarification_signals}",
                &clarification_signals(assistant),
            )
            .replace(
                "{assistant_response}",
                assistant
                    .filter(|r| !r.is_empty())
                    .map(|r| truncate_chars(r, MAX_PROMPT_CHARS))
                    .unwrap_or("Not available"),
            )
            .replace("{user_message}", truncate_chars(content, MAX_PROMPT_CHARS));

        let reply = self
            .client
            .complete(CompletionRequest {
                system_prompt: SYSTEM_PROMPT,
                user_message: &prompt,
                temperature: 0.1,
                max_tokens: 400,
            })
            .await
            .map_err(|e| AnalyzerError::new(AnalyzerKind::Quality, e.to_string()))?;

        let analysis = parse_quality(&reply, local)?;
        debug!(
            score = analysis.overall_score,
            level = %analysis.quality_level,
            "quality scored"
        );
        Ok(AnalysisPayload::Quality(analysis))
    }
}
