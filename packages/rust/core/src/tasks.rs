//! Tracked background work (webhook deliveries, queued batches).
//!
//! Tasks are spawned onto a shared `JoinSet` instead of being detached, so an
//! owner can await every one of them before shutting down.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Default)]
pub struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().await;
        // Reap anything already finished so the set doesn't grow unbounded.
        while let Some(done) = set.try_join_next() {
            log_join(done);
        }
        set.spawn(task);
    }

    /// Tasks spawned and not yet reaped.
    pub async fn pending(&self) -> usize {
        self.set.lock().await.len()
    }

    /// Wait for every tracked task, including ones spawned while waiting.
    pub async fn join_all(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.set.lock().await);
            if set.is_empty() {
                return;
            }
            debug!(tasks = set.len(), "waiting for background tasks");
            while let Some(done) = set.join_next().await {
                log_join(done);
            }
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "background task panicked");
    }
}
