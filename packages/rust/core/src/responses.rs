//! Hand-off of assistant responses to user-message enrichments.
//!
//! The chat frontend publishes the assistant's reply under
//! `assistant:<conversation_id>:<message_id>`; an enrichment of the user
//! message may wait a bounded time for it. Waiters are woken through a
//! per-slot watch channel; publishers in other processes are found by
//! re-reading the cache slot on a short interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::cache::{Cache, get_as, set_as};
use crate::keys::assistant_key;

/// How often a waiter re-reads the cache slot.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct AssistantResponses {
    cache: Arc<dyn Cache>,
    deadline: Duration,
    slots: Mutex<HashMap<String, watch::Sender<Option<String>>>>,
}

impl AssistantResponses {
    pub fn new(cache: Arc<dyn Cache>, deadline: Duration) -> Self {
        Self {
            cache,
            deadline,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Store a response and wake anyone waiting on its slot. `ttl` bounds how
    /// long a late waiter can still find it in the cache.
    pub async fn publish(
        &self,
        conversation_id: &str,
        message_id: &str,
        response: &str,
        ttl: Duration,
    ) -> bool {
        let key = assistant_key(conversation_id, message_id);
        let stored = set_as(self.cache.as_ref(), &key, &response, ttl).await;

        if let Some(slot) = self.slots.lock().await.get(&key) {
            slot.send_replace(Some(response.to_string()));
        }
        debug!(%key, stored, "assistant response published");
        stored
    }

    /// Wait up to the deadline for the response to a message. Returns `None`
    /// immediately without a conversation, and on timeout.
    pub async fn wait(&self, conversation_id: Option<&str>, message_id: &str) -> Option<String> {
        let conversation_id = conversation_id?;
        let key = assistant_key(conversation_id, message_id);

        // Subscribe before the cache check so a publish in between is not lost.
        let mut rx = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key.clone())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe()
        };

        let found = match get_as::<String>(self.cache.as_ref(), &key).await {
            Some(response) => Some(response),
            None => match tokio::time::timeout(self.deadline, self.watch(&key, &mut rx)).await {
                Ok(found) => found,
                // One last read in case the slot landed between ticks.
                Err(_) => {
                    let late = get_as::<String>(self.cache.as_ref(), &key).await;
                    if late.is_none() {
                        debug!(
                            %key,
                            deadline_ms = self.deadline.as_millis() as u64,
                            "no assistant response before deadline"
                        );
                    }
                    late
                }
            },
        };

        drop(rx);
        let mut slots = self.slots.lock().await;
        if slots.get(&key).is_some_and(|s| s.receiver_count() == 0) {
            slots.remove(&key);
        }
        found
    }

    /// Resolve on an in-process publish, or on a cache read that finds the
    /// slot. Publishers in another process only reach the cache, so it is
    /// re-read every [`POLL_INTERVAL`].
    async fn watch(&self, key: &str, rx: &mut watch::Receiver<Option<String>>) -> Option<String> {
        let mut ticker = tokio::time::interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                published = async { rx.wait_for(Option::is_some).await.map(|v| v.clone()) } => {
                    return published.ok().flatten();
                }
                _ = ticker.tick() => {
                    if let Some(response) = get_as::<String>(self.cache.as_ref(), key).await {
                        return Some(response);
                    }
                }
            }
        }
    }
}
