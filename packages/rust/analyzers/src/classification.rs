//! Work / topic / intent classification via the chat client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use enrichment_shared::{
    AnalyzerKind, Classification, Confidence, HistoryEntry, IntentClassification,
    TopicClassification, WorkClassification, truncate_chars,
};

use crate::llm::{ChatClient, CompletionRequest, extract_json};
use crate::{AnalysisContext, AnalysisPayload, Analyzer, AnalyzerError};

const SYSTEM_PROMPT: &str = "You are a message classifier. Analyze the message and return classification results as valid JSON.";

const PROMPT_TEMPLATE: &str = r#"Classify the user message below along three axes.

USER MESSAGE:
{user_message}

ASSISTANT RESPONSE:
{assistant_response}

RECENT CONVERSATION:
{conversation_history}

Return a single JSON object with exactly these keys:
{
  "work": {"is_work": bool, "work_type": "email|report|analysis|coding|meeting|documentation|other" or null, "confidence": "high|medium|low", "reasoning": string, "signals": [string]},
  "topic": {"primary": "WRITING|ANALYSIS|TECHNICAL|COMMUNICATION|LEARNING|CREATIVE|PERSONAL|OTHER", "sub_topics": [string], "confidence": "high|medium|low", "keywords": [string]},
  "intent": {"primary": "ASKING|DOING|EXPRESSING", "detailed": string, "confidence": "high|medium|low", "used_assistant_response": bool}
}
Return only the JSON object."#;

/// Characters of message and assistant response sent upstream.
const MAX_PROMPT_CHARS: usize = 2000;
/// History entries included in the prompt, most recent last.
const HISTORY_ENTRIES: usize = 3;
const HISTORY_ENTRY_CHARS: usize = 200;

/// Model reply before defaults are applied. Facets missing from the reply are
/// filled in with their defaults rather than left absent.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    work: Option<WorkClassification>,
    #[serde(default)]
    topic: Option<TopicClassification>,
    #[serde(default)]
    intent: Option<IntentClassification>,
}

/// LLM-backed classifier.
pub struct ClassificationAnalyzer {
    client: Arc<ChatClient>,
}

impl ClassificationAnalyzer {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for ClassificationAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Classification
    }

    #[instrument(skip_all, fields(chars = content.len()))]
    async fn analyze(
        &self,
        content: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisPayload, AnalyzerError> {
        let prompt = build_prompt(content, context);
        let reply = self
            .client
            .complete(CompletionRequest {
                system_prompt: SYSTEM_PROMPT,
                user_message: &prompt,
                temperature: 0.1,
                max_tokens: 500,
            })
            .await
            .map_err(|e| AnalyzerError::new(AnalyzerKind::Classification, e.to_string()))?;

        let classification = parse_classification(&reply)?;
        debug!(
            is_work = classification.work.as_ref().is_some_and(|w| w.is_work),
            "classification parsed"
        );
        Ok(AnalysisPayload::Classification(classification))
    }
}

fn build_prompt(content: &str, context: &AnalysisContext) -> String {
    let assistant = context
        .assistant_response
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| truncate_chars(r, MAX_PROMPT_CHARS))
        .unwrap_or("Not available");

    PROMPT_TEMPLATE
        .replace("{user_message}", truncate_chars(content, MAX_PROMPT_CHARS))
        .replace("{assistant_response}", assistant)
        .replace(
            "{conversation_history}",
            &format_history(context.history.as_deref()),
        )
}

/// `ROLE: content` lines for the last few history entries.
fn format_history(history: Option<&[HistoryEntry]>) -> String {
    let history = match history {
        Some(h) if !h.is_empty() => h,
        _ => return "No previous messages".to_string(),
    };

    let skip = history.len().saturating_sub(HISTORY_ENTRIES);
    history[skip..]
        .iter()
        .map(|entry| {
            format!(
                "{}: {}",
                entry.role.as_str().to_uppercase(),
                truncate_chars(&entry.content, HISTORY_ENTRY_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_classification(reply: &str) -> Result<Classification, AnalyzerError> {
    let raw: RawClassification = serde_json::from_str(extract_json(reply)).map_err(|e| {
        AnalyzerError::new(
            AnalyzerKind::Classification,
            format!("unparseable model output: {e}"),
        )
    })?;

    let mut work = raw.work.unwrap_or_else(|| WorkClassification {
        is_work: false,
        work_type: None,
        confidence: None,
        reasoning: String::new(),
        signals: Vec::new(),
    });
    work.confidence.get_or_insert(Confidence::Low);

    let mut topic = raw.topic.unwrap_or_else(|| TopicClassification {
        primary: "OTHER".into(),
        sub_topics: Vec::new(),
        confidence: None,
        keywords: Vec::new(),
    });
    topic.confidence.get_or_insert(Confidence::Low);

    let mut intent = raw.intent.unwrap_or_else(|| IntentClassification {
        primary: "EXPRESSING".into(),
        detailed: "unknown".into(),
        confidence: None,
        used_assistant_response: false,
    });
    intent.confidence.get_or_insert(Confidence::Low);

    Ok(Classification {
        work: Some(work),
        topic: Some(topic),
        intent: Some(intent),
    })
}
