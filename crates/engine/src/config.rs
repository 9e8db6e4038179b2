// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine.

use crewd_storage::LockOptions;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration resolution
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine state directory (set CREWD_STATE_DIR or HOME)")]
    NoStateDir,
}

/// Resolve state directory: CREWD_STATE_DIR > XDG_STATE_HOME/crewd >
/// ~/.local/state/crewd
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("CREWD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("crewd"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/crewd"))
}

/// Broker URL; when unset the file queue fallback is used.
pub fn broker_url() -> Option<String> {
    std::env::var("CREWD_BROKER_URL").ok().filter(|s| !s.is_empty())
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}

/// Lock tuning: `CREWD_LOCK_RETRY_MS` and `CREWD_LOCK_STALE_MS` override the
/// defaults.
pub fn lock_options() -> LockOptions {
    let mut options = LockOptions::default();
    if let Some(ms) = env_ms("CREWD_LOCK_RETRY_MS") {
        options.retry_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = env_ms("CREWD_LOCK_STALE_MS") {
        options.stale_after = Duration::from_millis(ms);
    }
    options
}

/// Per-task execution timeout (default 5m, `CREWD_TASK_TIMEOUT_MS`).
pub fn task_timeout() -> Duration {
    env_ms("CREWD_TASK_TIMEOUT_MS").map(Duration::from_millis).unwrap_or(Duration::from_secs(300))
}

/// Team wall-clock budget (default 1h, `CREWD_TEAM_BUDGET_MS`).
pub fn team_budget() -> Duration {
    env_ms("CREWD_TEAM_BUDGET_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(3600))
}

/// Worker heartbeat interval (default 10s, `CREWD_HEARTBEAT_INTERVAL_MS`).
pub fn heartbeat_interval() -> Duration {
    env_ms("CREWD_HEARTBEAT_INTERVAL_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Missed-heartbeat deadline: three intervals.
pub fn heartbeat_deadline_ms() -> u64 {
    heartbeat_interval().as_millis() as u64 * 3
}

/// Worker readiness timeout (default 30s, `CREWD_READY_TIMEOUT_MS`).
pub fn ready_timeout() -> Duration {
    env_ms("CREWD_READY_TIMEOUT_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Graceful shutdown window per worker (default 5s, `CREWD_GRACE_TIMEOUT_MS`).
pub fn grace_timeout() -> Duration {
    env_ms("CREWD_GRACE_TIMEOUT_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Worker binary spawned for each team slot (`CREWD_WORKER_BIN`).
pub fn worker_program() -> String {
    std::env::var("CREWD_WORKER_BIN")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "crewd-worker".to_string())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
