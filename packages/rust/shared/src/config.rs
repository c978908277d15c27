//! Application configuration for the enrichment service.
//!
//! User config lives at `~/.enrichment/enrichment.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnrichmentError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "enrichment.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".enrichment";

// ---------------------------------------------------------------------------
// Config structs (matching enrichment.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    /// Upstream language-model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name reported in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Deployment environment: local, staging, or prod.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Number of concurrent queue worker loops.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
            max_workers: default_max_workers(),
        }
    }
}

fn default_service_name() -> String {
    "enrichment-service".into()
}
fn default_environment() -> String {
    "local".into()
}
fn default_max_workers() -> usize {
    10
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used by the analyzers and recorded on every result.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Client timeout for a single completion.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemma-2-9b-it".into()
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of `enrichment:<hash>` entries.
    #[serde(default = "default_enrichment_ttl")]
    pub enrichment_ttl_secs: u64,

    /// TTL of `batch:<batch_id>` status snapshots.
    #[serde(default = "default_batch_ttl")]
    pub batch_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enrichment_ttl_secs: default_enrichment_ttl(),
            batch_ttl_secs: default_batch_ttl(),
        }
    }
}

fn default_enrichment_ttl() -> u64 {
    3600
}
fn default_batch_ttl() -> u64 {
    86_400
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for a companion assistant response.
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,

    /// Messages shorter than this (after trimming) are skipped.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Messages longer than this are rejected.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            response_wait_ms: default_response_wait_ms(),
            min_content_chars: default_min_content_chars(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_response_wait_ms() -> u64 {
    5000
}
fn default_min_content_chars() -> usize {
    10
}
fn default_max_content_chars() -> usize {
    100_000
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Per-message content truncation for shared conversation context.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            context_chars: default_context_chars(),
        }
    }
}

fn default_max_messages() -> usize {
    100
}
fn default_context_chars() -> usize {
    500
}

/// `[webhook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.enrichment/enrichment.db".into()
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    EnrichmentError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.db_path)),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime settings (derived from config)
// ---------------------------------------------------------------------------

/// Runtime settings for the single-message pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// TTL for enrichment results written back to the cache.
    pub result_ttl: Duration,
    /// Deadline for a companion assistant response.
    pub response_wait: Duration,
    /// Model name recorded on every result.
    pub model_used: String,
    pub min_content_chars: usize,
    pub max_content_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            result_ttl: Duration::from_secs(config.cache.enrichment_ttl_secs),
            response_wait: Duration::from_millis(config.pipeline.response_wait_ms),
            model_used: config.llm.default_model.clone(),
            min_content_chars: config.pipeline.min_content_chars,
            max_content_chars: config.pipeline.max_content_chars,
        }
    }
}

/// Runtime settings for the batch orchestrator.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// TTL of cached batch status snapshots.
    pub status_ttl: Duration,
    pub max_messages: usize,
    pub context_chars: usize,
    pub max_content_chars: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            status_ttl: Duration::from_secs(config.cache.batch_ttl_secs),
            max_messages: config.batch.max_messages,
            context_chars: config.batch.context_chars,
            max_content_chars: config.pipeline.max_content_chars,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.enrichment/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnrichmentError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.enrichment/enrichment.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichmentError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        EnrichmentError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichmentError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnrichmentError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichmentError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the LLM API key from the configured env var.
pub fn llm_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(EnrichmentError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the LLM API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    llm_api_key(config).map(|_| ())
}
