//! Regex-based PII detection, masking, and redaction.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use enrichment_shared::{AnalyzerKind, PiiDetection, PiiEntity, PiiType, RiskLevel};

use crate::{AnalysisContext, AnalysisPayload, Analyzer, AnalyzerError};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?[1-9]\d{0,3}[-.\s]?)?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}\b").unwrap()
});
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap());
static IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b").unwrap());

/// Capitalised word pairs that look like names but aren't.
const NAME_FALSE_POSITIVES: &[&str] = &[
    "Hello World",
    "Thank You",
    "Best Regards",
    "United States",
    "New York",
    "Los Angeles",
    "Microsoft Office",
    "Google Chrome",
    "Apple iPhone",
];

/// Phone candidates need at least this many digits; the pattern alone also
/// matches years and short numbers.
const MIN_PHONE_DIGITS: usize = 7;

const REDACTION: &str = "[REDACTED]";

/// Stateless PII detector. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct PiiAnalyzer;

impl PiiAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scan `content` for PII.
    pub fn detect(&self, content: &str) -> PiiDetection {
        let mut entities: Vec<PiiEntity> = Vec::new();

        // Structured identifiers first so phone candidates overlapping them
        // can be dropped.
        push_matches(content, PiiType::Email, &EMAIL_RE, &mut entities);
        push_matches(content, PiiType::Ssn, &SSN_RE, &mut entities);
        push_matches(content, PiiType::CreditCard, &CARD_RE, &mut entities);
        push_matches(content, PiiType::IpAddress, &IP_RE, &mut entities);

        let phones: Vec<PiiEntity> = PHONE_RE
            .find_iter(content)
            .filter(|m| m.as_str().chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS)
            .filter(|m| !entities.iter().any(|e| overlaps(e, m.start(), m.end())))
            .map(|m| PiiEntity {
                pii_type: PiiType::Phone,
                value: mask_value(m.as_str(), PiiType::Phone),
                start: m.start(),
                end: m.end(),
            })
            .collect();
        entities.extend(phones);

        for m in NAME_RE.find_iter(content) {
            if NAME_FALSE_POSITIVES.contains(&m.as_str()) {
                continue;
            }
            entities.push(PiiEntity {
                pii_type: PiiType::PersonName,
                value: mask_value(m.as_str(), PiiType::PersonName),
                start: m.start(),
                end: m.end(),
            });
        }

        let pii_types = ordered_types(&entities);
        let risk_level = risk_level(&pii_types);
        let redacted_content = (!entities.is_empty()).then(|| redact(content, &entities));

        debug!(entities = entities.len(), risk = ?risk_level, "pii scan complete");

        PiiDetection {
            has_pii: !entities.is_empty(),
            pii_types,
            risk_level,
            entities,
            redacted_content,
        }
    }
}

#[async_trait]
impl Analyzer for PiiAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Pii
    }

    async fn analyze(
        &self,
        content: &str,
        _context: &AnalysisContext,
    ) -> Result<AnalysisPayload, AnalyzerError> {
        Ok(AnalysisPayload::Pii(self.detect(content)))
    }
}

fn push_matches(content: &str, pii_type: PiiType, re: &Regex, entities: &mut Vec<PiiEntity>) {
    for m in re.find_iter(content) {
        entities.push(PiiEntity {
            pii_type,
            value: mask_value(m.as_str(), pii_type),
            start: m.start(),
            end: m.end(),
        });
    }
}

fn overlaps(entity: &PiiEntity, start: usize, end: usize) -> bool {
    start < entity.end && entity.start < end
}

/// Distinct types found, in a fixed reporting order.
fn ordered_types(entities: &[PiiEntity]) -> Vec<PiiType> {
    [
        PiiType::Email,
        PiiType::Phone,
        PiiType::Ssn,
        PiiType::CreditCard,
        PiiType::IpAddress,
        PiiType::PersonName,
    ]
    .into_iter()
    .filter(|t| entities.iter().any(|e| e.pii_type == *t))
    .collect()
}

fn risk_level(types: &[PiiType]) -> RiskLevel {
    types
        .iter()
        .map(|t| match t {
            PiiType::Ssn | PiiType::CreditCard => RiskLevel::High,
            PiiType::Email | PiiType::Phone | PiiType::PersonName => RiskLevel::Medium,
            PiiType::IpAddress => RiskLevel::Low,
        })
        .max()
        .unwrap_or(RiskLevel::None)
}

fn last_chars(value: &str, n: usize) -> &str {
    let count = value.chars().count();
    match value.char_indices().nth(count.saturating_sub(n)) {
        Some((idx, _)) => &value[idx..],
        None => value,
    }
}

/// Masked form of a matched value, safe to store.
fn mask_value(value: &str, pii_type: PiiType) -> String {
    match pii_type {
        PiiType::Email => match value.split_once('@') {
            Some((local, domain)) => {
                let prefix: String = local.chars().take(2).collect();
                format!("{prefix}***@{domain}")
            }
            None => "***REDACTED***".to_string(),
        },
        PiiType::Phone => format!("***-***-{}", last_chars(value, 4)),
        PiiType::CreditCard => format!("****-****-****-{}", last_chars(value, 4)),
        PiiType::Ssn => format!("***-**-{}", last_chars(value, 4)),
        PiiType::PersonName => {
            let mut words = value.split_whitespace();
            let first = words.next().and_then(|w| w.chars().next());
            let last = words.last().and_then(|w| w.chars().next());
            match (first, last) {
                (Some(f), Some(l)) => format!("{f}*** {l}***"),
                _ => "***REDACTED***".to_string(),
            }
        }
        PiiType::IpAddress => "***REDACTED***".to_string(),
    }
}

/// Replace each entity span with `[REDACTED]`, working from the end of the
/// string so earlier offsets stay valid. Spans overlapping one already
/// replaced are skipped.
fn redact(content: &str, entities: &[PiiEntity]) -> String {
    let mut spans: Vec<(usize, usize)> = entities.iter().map(|e| (e.start, e.end)).collect();
    spans.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut redacted = content.to_string();
    let mut floor = usize::MAX;
    for (start, end) in spans {
        if end > floor {
            continue;
        }
        redacted.replace_range(start..end, REDACTION);
        floor = start;
    }
    redacted
}
