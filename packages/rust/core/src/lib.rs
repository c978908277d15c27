//! Orchestration core for the enrichment service.
//!
//! This crate ties the analyzers and the collaborators (cache, persistence,
//! queue, webhook) together into:
//! - [`EnrichmentPipeline`]: single messages (cache, analyzers, persist)
//! - [`BatchOrchestrator`]: batches with dedup, shared context, and status snapshots
//! - [`EnrichmentService`]: the front door deciding inline vs. queued work
//! - [`WorkerPool`]: queue consumers

pub mod batch;
pub mod cache;
pub mod keys;
pub mod notify;
pub mod persistence;
pub mod pipeline;
pub mod queue;
pub mod responses;
pub mod service;
pub mod tasks;
pub mod worker;

#[cfg(test)]
mod testing;

pub use batch::BatchOrchestrator;
pub use cache::{Cache, MemoryCache};
pub use notify::{HttpWebhook, Notifier};
pub use persistence::{MemoryPersistence, Persistence};
pub use pipeline::EnrichmentPipeline;
pub use queue::{Delivery, MemoryQueue, Queue, QueueMessage};
pub use responses::AssistantResponses;
pub use service::EnrichmentService;
pub use tasks::BackgroundTasks;
pub use worker::{WorkerPool, WorkerReport, WorkerSettings};
