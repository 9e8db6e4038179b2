// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crewd-engine: the coordination engine proper.
//!
//! [`Lifecycle`] drives the job state machine (create, approve, reject,
//! cancel, finalize) and is the only writer of job transitions. The
//! [`Coordinator`] runs team-mode jobs: it derives the task graph, spawns
//! workers, reclaims expired claims, and decides completion. [`Runner`] is
//! the worker-side half of that protocol. [`EventStream`] relays appended
//! job events to subscribers.

pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod runner;
pub mod stream;

pub use coordinator::{run_team_job, Coordinator, CoordinatorOptions, TeamMessage, TeamRun};
pub use lifecycle::{CreateJobRequest, Lifecycle};
pub use runner::Runner;
pub use stream::EventStream;
