//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use enrichment_analyzers::{AnalyzerSet, ChatClient};
use enrichment_core::{EnrichmentService, HttpWebhook, WorkerPool, WorkerSettings};
use enrichment_shared::{
    AppConfig, BatchRequest, EnrichmentRequest, init_config, llm_api_key, load_config,
    load_config_from, validate_api_key,
};
use enrichment_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Enrichment: classify, score, and scan chat messages.
#[derive(Parser)]
#[command(
    name = "enrichment",
    version,
    about = "Enrich chat messages with work/topic/intent classification, quality scores, and PII detection.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.enrichment/enrichment.toml).
    #[arg(long, global = true, env = "ENRICHMENT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich one message (JSON request from a file, or `-` for stdin).
    Enrich {
        input: String,

        /// Process now instead of queueing for a worker.
        #[arg(long)]
        inline: bool,
    },

    /// Enrich a batch of messages (JSON batch request from a file or stdin).
    Batch {
        input: String,

        /// Process now instead of queueing for a worker.
        #[arg(long)]
        inline: bool,
    },

    /// Show the status of a batch.
    Status {
        batch_id: String,

        /// Include per-message results.
        #[arg(long)]
        include_results: bool,
    },

    /// Show the stored enrichment of a message.
    Lookup { message_id: String },

    /// Scan text for PII without calling the model.
    DetectPii { text: String },

    /// Consume queued messages and batches.
    Worker {
        /// Number of concurrent loops (defaults to service.max_workers).
        #[arg(long)]
        workers: Option<usize>,

        /// Exit once the queue is empty.
        #[arg(long)]
        drain: bool,
    },

    /// Hand an assistant reply to the enrichment of the user message it answers.
    PublishResponse {
        #[arg(long)]
        conversation: String,

        #[arg(long)]
        message: String,

        text: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "enrichment=info",
        1 => "enrichment=debug",
        _ => "enrichment=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Enrich { input, inline } => cmd_enrich(&config, &input, inline).await,
        Command::Batch { input, inline } => cmd_batch(&config, &input, inline).await,
        Command::Status {
            batch_id,
            include_results,
        } => cmd_status(&config, &batch_id, include_results).await,
        Command::Lookup { message_id } => cmd_lookup(&config, &message_id).await,
        Command::DetectPii { text } => cmd_detect_pii(&config, &text).await,
        Command::Worker { workers, drain } => cmd_worker(&config, workers, drain).await,
        Command::PublishResponse {
            conversation,
            message,
            text,
        } => cmd_publish_response(&config, &conversation, &message, &text).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

/// Whether a command will call the model.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Llm,
    ReadOnly,
}

async fn open_service(config: &AppConfig, access: Access, queued: bool) -> Result<EnrichmentService> {
    let api_key = match access {
        Access::Llm => llm_api_key(config)?,
        // Read-only commands never reach the model; a missing key is fine.
        Access::ReadOnly => llm_api_key(config).unwrap_or_default(),
    };

    let db_path = config.storage.resolved_db_path()?;
    let storage = Arc::new(Storage::open(&db_path).await?);
    let client = Arc::new(ChatClient::new(&config.llm, api_key)?);
    let analyzers = AnalyzerSet::standard(client);

    if queued {
        return Ok(EnrichmentService::with_storage(config, storage, analyzers)?);
    }
    let notifier = Arc::new(HttpWebhook::from_config(&config.webhook)?);
    Ok(EnrichmentService::new(
        config,
        analyzers,
        storage.clone(),
        storage,
        notifier,
        None,
    ))
}

fn read_json<T: DeserializeOwned>(input: &str) -> Result<T> {
    let raw = if input == "-" {
        std::io::read_to_string(std::io::stdin()).wrap_err("failed to read stdin")?
    } else {
        std::fs::read_to_string(Path::new(input))
            .wrap_err_with(|| format!("failed to read {input}"))?
    };
    serde_json::from_str(&raw).wrap_err_with(|| format!("invalid JSON in {input}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(config: &AppConfig, input: &str, inline: bool) -> Result<()> {
    // Validate API key before doing anything
    validate_api_key(config)?;
    let request: EnrichmentRequest = read_json(input)?;
    let service = open_service(config, Access::Llm, !inline).await?;

    info!(message_id = %request.message_id, inline, "submitting message");
    let progress = spinner(&format!("Enriching {}", request.message_id))?;
    let outcome = service.submit_message(request).await;
    progress.finish_and_clear();

    print_json(&outcome?)?;
    service.shutdown().await;
    Ok(())
}

async fn cmd_batch(config: &AppConfig, input: &str, inline: bool) -> Result<()> {
    validate_api_key(config)?;
    let request: BatchRequest = read_json(input)?;
    let service = open_service(config, Access::Llm, !inline).await?;

    info!(messages = request.messages.len(), inline, "submitting batch");
    let progress = spinner(&format!("Enriching {} messages", request.messages.len()))?;
    let job = service.submit_batch(request).await;
    progress.finish_and_clear();

    print_json(&job?)?;
    // Let the completion webhook go out before exiting.
    service.shutdown().await;
    Ok(())
}

async fn cmd_status(config: &AppConfig, batch_id: &str, include_results: bool) -> Result<()> {
    let service = open_service(config, Access::ReadOnly, false).await?;
    let job = service
        .batch_status(batch_id, include_results)
        .await
        .ok_or_else(|| eyre!("batch '{batch_id}' not found (unknown or expired)"))?;
    print_json(&job)
}

async fn cmd_lookup(config: &AppConfig, message_id: &str) -> Result<()> {
    let service = open_service(config, Access::ReadOnly, false).await?;
    let result = service
        .lookup_enrichment(message_id)
        .await?
        .ok_or_else(|| eyre!("no enrichment stored for message '{message_id}'"))?;
    print_json(&result)
}

async fn cmd_detect_pii(config: &AppConfig, text: &str) -> Result<()> {
    let service = open_service(config, Access::ReadOnly, false).await?;
    print_json(&service.detect_pii(text))
}

async fn cmd_worker(config: &AppConfig, workers: Option<usize>, drain: bool) -> Result<()> {
    validate_api_key(config)?;
    let service = open_service(config, Access::Llm, true).await?;
    let queue = service
        .queue()
        .cloned()
        .ok_or_else(|| eyre!("no queue configured"))?;

    let mut settings = WorkerSettings::from(config);
    if let Some(n) = workers {
        settings.workers = n.max(1);
    }
    settings.drain = drain;

    let pool = Arc::new(WorkerPool::new(
        queue,
        service.pipeline().clone(),
        service.batches().clone(),
        settings,
    ));
    let (shutdown, rx) = watch::channel(false);
    let mut running = tokio::spawn(pool.run(rx));

    let report = tokio::select! {
        joined = &mut running => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, finishing in-flight work");
            shutdown.send_replace(true);
            running.await?
        }
    };
    service.shutdown().await;

    println!(
        "Processed {} messages and {} batches ({} failures).",
        report.messages, report.batches, report.failures
    );
    Ok(())
}

async fn cmd_publish_response(
    config: &AppConfig,
    conversation_id: &str,
    message_id: &str,
    text: &str,
) -> Result<()> {
    let service = open_service(config, Access::ReadOnly, false).await?;
    if !service
        .publish_response(conversation_id, message_id, text)
        .await
    {
        return Err(eyre!("failed to store assistant response"));
    }
    println!("Published response for {conversation_id}/{message_id}.");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
