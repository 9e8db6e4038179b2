// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event stream: relays newly appended job events to subscribers.
//!
//! A subscriber may join at any time and sees events at-or-after what the
//! store currently holds; there is no historical replay beyond the recent
//! window the store exposes. The tail task polls the store, dedupes by
//! event id, and preserves append order. It stops once the job reaches a
//! terminal state and everything held has been forwarded, or when the
//! subscriber hangs up.

use crewd_core::{EventId, JobEvent, JobId};
use crewd_storage::JobStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How many recent events one poll asks the store for.
const POLL_WINDOW: usize = 256;

/// Polling relay from the store's event log to mpsc subscribers.
#[derive(Clone)]
pub struct EventStream {
    store: Arc<JobStore>,
    poll_interval: Duration,
}

impl EventStream {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store, poll_interval: Duration::from_millis(100) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Subscribe to a job's events. The receiver closes when the job
    /// reaches a terminal state (after delivery) or the job disappears.
    pub fn subscribe(&self, job_id: JobId) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(64);
        let store = Arc::clone(&self.store);
        let interval = self.poll_interval;

        tokio::spawn(async move {
            let mut seen: HashSet<EventId> = HashSet::new();
            let mut drained_after_terminal = false;
            loop {
                let events = match store.list_events(&job_id, POLL_WINDOW) {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::debug!(%job_id, error = %e, "event tail stopping");
                        return;
                    }
                };
                for event in events {
                    if seen.insert(event.id.clone()) && tx.send(event).await.is_err() {
                        return; // subscriber hung up
                    }
                }
                if drained_after_terminal {
                    return;
                }
                // The terminal event is appended just after the status flips,
                // so drain one more poll before closing.
                drained_after_terminal = match store.read(&job_id) {
                    Ok(job) => job.is_terminal(),
                    Err(_) => return,
                };
                tokio::time::sleep(interval).await;
            }
        });
        rx
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
