// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervision for worker processes.
//!
//! The coordinator spawns, probes, feeds, and terminates workers through
//! [`ProcessAdapter`]. [`LocalProcessAdapter`] runs them as local child
//! processes; termination is SIGTERM, a bounded wait, then SIGKILL.

use async_trait::async_trait;
use crewd_core::CoordError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Errors from process supervision
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for CoordError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::NotFound(what) => CoordError::NotFound(what),
            ProcessError::SpawnFailed(msg) => CoordError::ExternalProcessFailure(msg),
            ProcessError::Io(e) => CoordError::Io(e),
        }
    }
}

/// What to spawn.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new(), cwd: None }
    }

    crewd_core::setters! {
        set {
            args: Vec<String>,
            env: Vec<(String, String)>,
        }
        option {
            cwd: PathBuf,
        }
    }
}

/// Handle to a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Adapter-scoped identifier.
    pub id: String,
    /// OS pid when the process runs locally.
    pub pid: Option<u32>,
}

/// Adapter for spawning and supervising worker processes.
#[async_trait]
pub trait ProcessAdapter: Send + Sync + 'static {
    async fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ProcessError>;

    /// Point-in-time liveness check. Unknown handles are not alive.
    async fn is_alive(&self, handle: &ProcessHandle) -> bool;

    /// Write one line to the process's stdin.
    async fn send_input(&self, handle: &ProcessHandle, input: &str) -> Result<(), ProcessError>;

    /// Last `lines` lines of combined stdout/stderr.
    async fn output_tail(&self, handle: &ProcessHandle, lines: usize)
        -> Result<String, ProcessError>;

    /// Terminate: SIGTERM, wait up to `grace`, then SIGKILL. Idempotent.
    async fn terminate(&self, handle: &ProcessHandle, grace: Duration)
        -> Result<(), ProcessError>;
}

struct LocalProc {
    pid: Option<u32>,
    stdin: Option<tokio::process::ChildStdin>,
    exited: Arc<AtomicBool>,
    output: Arc<Mutex<Vec<String>>>,
}

/// Supervises local child processes via `tokio::process`.
#[derive(Clone, Default)]
pub struct LocalProcessAdapter {
    procs: Arc<Mutex<HashMap<String, LocalProc>>>,
}

impl LocalProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessAdapter for LocalProcessAdapter {
    async fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ProcessError> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{}: {e}", spec.program)))?;

        let id = nanoid::nanoid!(12);
        let pid = child.id();
        let stdin = child.stdin.take();
        let output = Arc::new(Mutex::new(Vec::new()));
        let exited = Arc::new(AtomicBool::new(false));

        if let Some(stdout) = child.stdout.take() {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    output.lock().push(line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    output.lock().push(line);
                }
            });
        }

        // Reaper: collects the exit status so the child never zombies.
        {
            let exited = Arc::clone(&exited);
            let id = id.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        tracing::debug!(proc_id = %id, %status, "process exited");
                    }
                    Err(e) => {
                        tracing::error!(proc_id = %id, error = %e, "failed to wait on process");
                    }
                }
                exited.store(true, Ordering::SeqCst);
            });
        }

        self.procs.lock().insert(id.clone(), LocalProc { pid, stdin, exited, output });
        tracing::info!(proc_id = %id, program = %spec.program, pid, "process spawned");
        Ok(ProcessHandle { id, pid })
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        self.procs
            .lock()
            .get(&handle.id)
            .map(|p| !p.exited.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    async fn send_input(&self, handle: &ProcessHandle, input: &str) -> Result<(), ProcessError> {
        // Take stdin out of the registry so no lock is held across the write.
        let mut stdin = {
            let mut procs = self.procs.lock();
            let proc = procs
                .get_mut(&handle.id)
                .ok_or_else(|| ProcessError::NotFound(handle.id.clone()))?;
            proc.stdin
                .take()
                .ok_or_else(|| ProcessError::NotFound(format!("{}: stdin closed", handle.id)))?
        };

        let result = async {
            stdin.write_all(input.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Some(proc) = self.procs.lock().get_mut(&handle.id) {
            proc.stdin = Some(stdin);
        }
        Ok(result?)
    }

    async fn output_tail(
        &self,
        handle: &ProcessHandle,
        lines: usize,
    ) -> Result<String, ProcessError> {
        let procs = self.procs.lock();
        let proc = procs
            .get(&handle.id)
            .ok_or_else(|| ProcessError::NotFound(handle.id.clone()))?;
        let output = proc.output.lock();
        let skip = output.len().saturating_sub(lines);
        Ok(output[skip..].join("\n"))
    }

    async fn terminate(
        &self,
        handle: &ProcessHandle,
        grace: Duration,
    ) -> Result<(), ProcessError> {
        let (pid, exited) = {
            let procs = self.procs.lock();
            match procs.get(&handle.id) {
                Some(proc) => (proc.pid, Arc::clone(&proc.exited)),
                // Unknown or already removed: terminate is idempotent.
                None => return Ok(()),
            }
        };

        if let (Some(pid), false) = (pid, exited.load(Ordering::SeqCst)) {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);

            let deadline = tokio::time::Instant::now() + grace;
            while !exited.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            if !exited.load(Ordering::SeqCst) {
                tracing::warn!(proc_id = %handle.id, "grace expired, sending SIGKILL");
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
            }
        }

        self.procs.lock().remove(&handle.id);
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ProcessAdapter, ProcessError, ProcessHandle, ProcessSpec};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeProc {
        alive: bool,
        inputs: Vec<String>,
        output: Vec<String>,
    }

    #[derive(Default)]
    struct FakeState {
        seq: u32,
        spawns: Vec<ProcessSpec>,
        terminations: Vec<String>,
        procs: HashMap<String, FakeProc>,
        fail_spawn: bool,
        auto_output: Vec<String>,
    }

    /// Fake process adapter for testing: records spawns, inputs, and
    /// terminations; output and liveness are scripted by the test.
    #[derive(Clone, Default)]
    pub struct FakeProcessAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeProcessAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spawns(&self) -> Vec<ProcessSpec> {
            self.inner.lock().spawns.clone()
        }

        pub fn terminations(&self) -> Vec<String> {
            self.inner.lock().terminations.clone()
        }

        pub fn inputs(&self, handle: &ProcessHandle) -> Vec<String> {
            self.inner
                .lock()
                .procs
                .get(&handle.id)
                .map(|p| p.inputs.clone())
                .unwrap_or_default()
        }

        /// Script a line of output for a spawned process.
        pub fn push_output(&self, handle: &ProcessHandle, line: impl Into<String>) {
            if let Some(proc) = self.inner.lock().procs.get_mut(&handle.id) {
                proc.output.push(line.into());
            }
        }

        /// Script the process dying out from under the supervisor.
        pub fn set_dead(&self, handle: &ProcessHandle) {
            if let Some(proc) = self.inner.lock().procs.get_mut(&handle.id) {
                proc.alive = false;
            }
        }

        pub fn set_fail_spawn(&self, fail: bool) {
            self.inner.lock().fail_spawn = fail;
        }

        /// Script output every future spawn starts with (e.g. a readiness
        /// line).
        pub fn set_auto_output(&self, lines: Vec<String>) {
            self.inner.lock().auto_output = lines;
        }
    }

    #[async_trait]
    impl ProcessAdapter for FakeProcessAdapter {
        async fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ProcessError> {
            let mut state = self.inner.lock();
            if state.fail_spawn {
                return Err(ProcessError::SpawnFailed("scripted spawn failure".to_string()));
            }
            state.seq += 1;
            let id = format!("fake-{}", state.seq);
            state.spawns.push(spec);
            let output = state.auto_output.clone();
            state.procs.insert(id.clone(), FakeProc { alive: true, inputs: Vec::new(), output });
            Ok(ProcessHandle { id, pid: None })
        }

        async fn is_alive(&self, handle: &ProcessHandle) -> bool {
            self.inner.lock().procs.get(&handle.id).map(|p| p.alive).unwrap_or(false)
        }

        async fn send_input(
            &self,
            handle: &ProcessHandle,
            input: &str,
        ) -> Result<(), ProcessError> {
            let mut state = self.inner.lock();
            let proc = state
                .procs
                .get_mut(&handle.id)
                .ok_or_else(|| ProcessError::NotFound(handle.id.clone()))?;
            proc.inputs.push(input.to_string());
            Ok(())
        }

        async fn output_tail(
            &self,
            handle: &ProcessHandle,
            lines: usize,
        ) -> Result<String, ProcessError> {
            let state = self.inner.lock();
            let proc = state
                .procs
                .get(&handle.id)
                .ok_or_else(|| ProcessError::NotFound(handle.id.clone()))?;
            let skip = proc.output.len().saturating_sub(lines);
            Ok(proc.output[skip..].join("\n"))
        }

        async fn terminate(
            &self,
            handle: &ProcessHandle,
            _grace: Duration,
        ) -> Result<(), ProcessError> {
            let mut state = self.inner.lock();
            state.terminations.push(handle.id.clone());
            if let Some(proc) = state.procs.get_mut(&handle.id) {
                proc.alive = false;
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeProcessAdapter;

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
