//! Shared types, error model, and configuration for the enrichment service.
//!
//! This crate is the foundation depended on by all other enrichment crates.
//! It provides:
//! - [`EnrichmentError`]: the unified error type
//! - Domain types ([`EnrichmentRequest`], [`EnrichmentResult`], [`EnrichmentOutcome`], [`BatchJob`])
//! - Analysis facets ([`Classification`], [`QualityAnalysis`], [`PiiDetection`])
//! - Configuration ([`AppConfig`], runtime settings, config loading)

pub mod analysis;
pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use analysis::{
    AnalyzerKind, Classification, Confidence, IntentClassification, PiiDetection, PiiEntity,
    PiiType, QualityAnalysis, RiskLevel, TopicClassification, WorkClassification,
};
pub use config::{
    AppConfig, BatchConfig, BatchSettings, CacheConfig, LlmConfig, PipelineConfig,
    PipelineSettings, ServiceConfig, StorageConfig, WebhookConfig, config_dir, config_file_path,
    init_config, llm_api_key, load_config, load_config_from, validate_api_key,
};
pub use error::{EnrichmentError, Result};
pub use text::truncate_chars;
pub use types::{
    BatchErrorEntry, BatchJob, BatchRequest, BatchStatus, EnrichmentOutcome, EnrichmentRequest,
    EnrichmentResult, HistoryEntry, OutcomeStatus, Priority, Role,
};
