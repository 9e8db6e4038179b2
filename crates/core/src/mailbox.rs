// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailbox entries: directed, asynchronous messages between the leader and
//! a specific worker (or vice versa).
//!
//! An entry is never mutated after creation except to mark delivery. A
//! recipient's mailbox is an append-then-mark-delivered queue; duplicate
//! delivery is tolerated because receivers deduplicate by entry id.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a mailbox entry (message identity for
    /// duplicate-delivery idempotence).
    pub struct MailId("msg-");
}

/// Sender/recipient address in the team protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailAddress {
    Leader,
    Worker(crate::worker::WorkerId),
}

impl MailAddress {
    /// Directory-name form of the address.
    pub fn file_stem(&self) -> String {
        match self {
            MailAddress::Leader => "leader".to_string(),
            MailAddress::Worker(id) => id.file_stem(),
        }
    }
}

crate::simple_display! {
    MailAddress {
        Leader => "leader",
        Worker(..) => "worker",
    }
}

/// One directed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub id: MailId,
    pub from: MailAddress,
    pub to: MailAddress,
    pub body: String,
    #[serde(default)]
    pub delivered: bool,
    pub created_at_ms: u64,
}

impl MailboxEntry {
    pub fn new(
        from: MailAddress,
        to: MailAddress,
        body: impl Into<String>,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: MailId::new(),
            from,
            to,
            body: body.into(),
            delivered: false,
            created_at_ms: epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
