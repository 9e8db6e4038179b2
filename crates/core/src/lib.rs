// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crewd-core: domain types for the crewd coordination engine

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod mailbox;
pub mod task;
pub mod team;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CoordError;
pub use event::{EventId, JobEvent};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    ApprovalState, Job, JobAction, JobConfig, JobConfigBuilder, JobId, JobMode, JobOptions,
    JobStatus,
};
pub use mailbox::{MailAddress, MailId, MailboxEntry};
pub use task::{PlannedTask, Task, TaskId, TaskStatus};
pub use team::{
    job_tasks, resolve_model, team_name, template_tasks, TaskMetrics, TeamConfig, TeamPhase,
    TeamSnapshot, DEFAULT_ROLES,
};
pub use worker::{WorkerId, WorkerRecord, WorkerStatus};
