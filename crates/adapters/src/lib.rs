// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crewd-adapters: boundaries to the outside world.
//!
//! Queue backends for work distribution, process supervision for worker
//! lifecycles, and the agent command shim that invokes provider binaries
//! and extracts structured results from their mixed output. Each adapter is
//! a trait with a production implementation and a Fake behind the
//! `test-support` feature.

pub mod agent;
pub mod process;
pub mod queue;
pub mod scan;

pub use agent::{AgentInvoker, InvokeError, RunOutput};
pub use process::{LocalProcessAdapter, ProcessAdapter, ProcessError, ProcessHandle, ProcessSpec};
pub use queue::{select_queue, BrokerClient, BrokerQueue, FileQueue, QueueAdapter, QueueError};

#[cfg(any(test, feature = "test-support"))]
pub use process::FakeProcessAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use queue::FakeBroker;
