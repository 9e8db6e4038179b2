// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only job event log entries.
//!
//! Events are the sole audit trail: every job state transition appends
//! exactly one entry. Entries are never rewritten or removed, and ordering
//! within a job is append order.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an event log entry.
    ///
    /// Subscribers deduplicate by this id when tailing the log.
    pub struct EventId("evt-");
}

/// One immutable entry in a job's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: EventId,
    pub job_id: JobId,
    /// Free-form type tag naming the transition (`queued`, `approval`,
    /// `canceled`, ...).
    pub event_type: String,
    /// Human-readable description of what happened.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at_ms: u64,
}

impl JobEvent {
    pub fn new(
        job_id: JobId,
        event_type: impl Into<String>,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            job_id,
            event_type: event_type.into(),
            message: message.into(),
            payload,
            created_at_ms: epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
