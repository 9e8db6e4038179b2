// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crewd-storage: file-backed durable stores for the coordination engine.
//!
//! All shared mutable state lives here. Every write goes through a
//! temp-file + atomic rename, and every read-modify-write holds a per-record
//! advisory lock, so the protocol is crash-safe and restart-tolerant by
//! construction.

pub mod lock;
pub mod store;
pub mod team_dir;
mod util;

pub use lock::{LockGuard, LockOptions};
pub use store::{IdempotencyRecord, JobStore, StoreError};
pub use team_dir::TeamStore;
