//! Shared harness for the behavior specs.

pub use crewd_adapters::{AgentInvoker, BrokerQueue, FakeBroker, FakeProcessAdapter, FileQueue, QueueAdapter};
pub use crewd_core::{
    ApprovalState, Clock, CoordError, FakeClock, Job, JobAction, JobMode, JobOptions, JobStatus,
    MailAddress, Task, TaskId, TaskStatus, TeamConfig, TeamPhase, WorkerId,
};
pub use crewd_engine::{
    run_team_job, Coordinator, CoordinatorOptions, CreateJobRequest, EventStream, Lifecycle,
    Runner, TeamMessage,
};
pub use crewd_storage::{JobStore, StoreError, TeamStore};
pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;

pub type SpecLifecycle = Lifecycle<BrokerQueue<FakeBroker>, FakeClock>;
pub type SpecCoordinator = Coordinator<FakeProcessAdapter, FakeClock>;

/// Everything a spec needs, wired the way the daemon would wire it.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<JobStore>,
    pub broker: FakeBroker,
    pub procs: FakeProcessAdapter,
    pub clock: FakeClock,
    pub lifecycle: SpecLifecycle,
    pub coordinator: SpecCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new(dir.path()));
        let broker = FakeBroker::new();
        let clock = FakeClock::new();
        let lifecycle = Lifecycle::new(
            Arc::clone(&store),
            BrokerQueue::new(broker.clone(), "crewd.jobs"),
            clock.clone(),
        );
        let procs = FakeProcessAdapter::new();
        procs.set_auto_output(vec!["READY".to_string()]);
        let coordinator = Coordinator::new(
            Arc::clone(&store),
            dir.path().join("teams"),
            procs.clone(),
            clock.clone(),
        )
        .with_options(CoordinatorOptions {
            worker_program: "crewd-worker".to_string(),
            ready_timeout: Duration::from_millis(50),
            grace: Duration::from_millis(20),
            heartbeat_deadline_ms: 30_000,
            poll_interval: Duration::from_millis(5),
        });
        Self { dir, store, broker, procs, clock, lifecycle, coordinator }
    }

    pub fn teams_root(&self) -> std::path::PathBuf {
        self.dir.path().join("teams")
    }

    pub async fn create(&self, request: CreateJobRequest) -> Job {
        self.lifecycle.create_job(request).await.unwrap()
    }
}

pub fn solo_request() -> CreateJobRequest {
    CreateJobRequest::new("claude", "fix the flaky test").repo("git@example.com:acme/app.git")
}

pub fn team_request(worker_count: u32) -> CreateJobRequest {
    let mut options = JobOptions::default();
    options.worker_count = worker_count;
    CreateJobRequest::new("claude", "ship the feature").mode(JobMode::Team).options(options)
}

/// Poll `condition` until it holds or the deadline passes.
pub async fn wait_for<F: Fn() -> bool>(max: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + max;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
