// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command shim.
//!
//! Workers hand a command string to [`AgentInvoker::run`]. The invoker
//! decides whether that string is a literal shell command (leading token is
//! a known shell utility) or a prompt for the provider's agent binary,
//! resolves which binary to invoke, runs it under a timeout, and extracts a
//! structured result from the output. A non-zero exit is captured in
//! [`RunOutput`] rather than raised: callers need the status to decide
//! retry or escalation.

use crate::scan;
use crewd_core::CoordError;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from agent invocation
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("empty command")]
    EmptyCommand,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InvokeError> for CoordError {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::EmptyCommand => {
                CoordError::ExternalProcessFailure("empty command".to_string())
            }
            InvokeError::Spawn(msg) => CoordError::ExternalProcessFailure(msg),
            InvokeError::Timeout(t) => CoordError::Timeout(format!("command after {t:?}")),
            InvokeError::Io(e) => CoordError::Io(e),
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Process exit code (-1 when killed by signal).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    /// Last JSON object found in the combined output, if any.
    pub result: Option<serde_json::Value>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Leading tokens treated as literal shell commands rather than agent
/// prompts.
const SHELL_UTILITIES: &[&str] = &[
    "sh", "bash", "zsh", "env", "git", "ls", "cat", "grep", "find", "sed", "awk", "make",
    "cargo", "python", "python3", "node", "npm", "npx", "echo", "curl", "rm", "cp", "mv",
    "mkdir", "touch", "test", "true", "false",
];

/// Resolves provider binaries and runs agent commands.
#[derive(Debug, Clone, Default)]
pub struct AgentInvoker {
    /// Explicit per-provider binary overrides (highest precedence).
    bin_overrides: HashMap<String, String>,
}

impl AgentInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, provider: impl Into<String>, bin: impl Into<String>) -> Self {
        self.bin_overrides.insert(provider.into(), bin.into());
        self
    }

    /// Binary for a provider: explicit override, then the
    /// `CREWD_AGENT_BIN_<PROVIDER>` environment variable, then the provider
    /// name itself.
    pub fn resolve_binary(&self, provider: &str) -> String {
        if let Some(bin) = self.bin_overrides.get(provider) {
            return bin.clone();
        }
        let var = format!(
            "CREWD_AGENT_BIN_{}",
            provider.to_ascii_uppercase().replace('-', "_")
        );
        if let Ok(bin) = std::env::var(&var) {
            if !bin.trim().is_empty() {
                return bin;
            }
        }
        provider.to_string()
    }

    /// True when the command's leading token names a known shell utility.
    pub fn is_shell_command(command: &str) -> bool {
        command
            .split_whitespace()
            .next()
            .map(|token| SHELL_UTILITIES.contains(&token))
            .unwrap_or(false)
    }

    /// Run `command` for `provider` in `workdir`, bounded by `timeout`.
    ///
    /// Shell commands run via `sh -c`; anything else becomes a single
    /// prompt argument to the resolved agent binary. On timeout the child
    /// is killed and `Timeout` is returned.
    pub async fn run(
        &self,
        provider: &str,
        command: &str,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<RunOutput, InvokeError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(InvokeError::EmptyCommand);
        }

        let mut cmd = if Self::is_shell_command(command) {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        } else {
            let bin = self.resolve_binary(provider);
            let mut cmd = tokio::process::Command::new(bin);
            cmd.arg(command);
            cmd
        };
        cmd.current_dir(workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| InvokeError::Spawn(format!("{provider}: {e}")))?;

        let started = std::time::Instant::now();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // kill_on_drop reaps the child.
                tracing::warn!(%provider, ?timeout, "agent command timed out");
                return Err(InvokeError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code().unwrap_or(-1);
        let combined = format!("{stdout}\n{stderr}");
        let result = scan::extract_last_json(&combined);

        tracing::debug!(
            %provider,
            status,
            has_result = result.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent command finished"
        );
        Ok(RunOutput { status, stdout, stderr, result })
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
