//! Background run status shared with observers.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Oldest errors are dropped past this many entries.
pub const MAX_ERROR_HISTORY: usize = 50;

/// Lifecycle of the background run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    TimedOut,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::TimedOut => "timed out",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of the background run as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundFetchStatus {
    pub is_running: bool,
    pub completed_sources: usize,
    pub total_sources: usize,
    pub last_update: DateTime<Utc>,
    /// Oldest first.
    pub errors: Vec<String>,
    pub state: RunState,
}

impl BackgroundFetchStatus {
    fn idle() -> Self {
        Self {
            is_running: false,
            completed_sources: 0,
            total_sources: 0,
            last_update: Utc::now(),
            errors: Vec::new(),
            state: RunState::Idle,
        }
    }
}

/// Owner of the single status instance. Readers get copies.
#[derive(Debug)]
pub struct StatusBoard {
    inner: Mutex<BackgroundFetchStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BackgroundFetchStatus::idle()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackgroundFetchStatus> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("status mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn snapshot(&self) -> BackgroundFetchStatus {
        self.lock().clone()
    }

    /// The newest `n` errors, oldest first.
    pub fn recent_errors(&self, n: usize) -> Vec<String> {
        let status = self.lock();
        let skip = status.errors.len().saturating_sub(n);
        status.errors[skip..].to_vec()
    }

    /// Back to the process-start state.
    pub fn reset(&self) {
        *self.lock() = BackgroundFetchStatus::idle();
    }

    /// Flag a background run as accepted, before its task starts.
    pub(crate) fn mark_running(&self) {
        let mut status = self.lock();
        status.is_running = true;
        status.state = RunState::Running;
        status.last_update = Utc::now();
    }

    /// Reset counters and errors at the start of a run.
    pub(crate) fn begin(&self, total: usize) {
        let mut status = self.lock();
        status.completed_sources = 0;
        status.total_sources = total;
        status.errors.clear();
        status.last_update = Utc::now();
    }

    pub(crate) fn source_done(&self, completed: usize) {
        let mut status = self.lock();
        status.completed_sources = completed;
        status.last_update = Utc::now();
    }

    pub(crate) fn record_error(&self, error: String) {
        let mut status = self.lock();
        status.errors.push(error);
        let overflow = status.errors.len().saturating_sub(MAX_ERROR_HISTORY);
        if overflow > 0 {
            status.errors.drain(..overflow);
        }
        status.last_update = Utc::now();
    }

    /// A stop was requested: observers see the run as no longer running
    /// even while the current source finishes.
    pub(crate) fn mark_stopping(&self) {
        let mut status = self.lock();
        status.is_running = false;
        status.last_update = Utc::now();
    }

    pub(crate) fn finish(&self, state: RunState) {
        let mut status = self.lock();
        status.is_running = false;
        status.state = state;
        status.last_update = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status_is_idle() {
        let board = StatusBoard::new();
        let status = board.snapshot();
        assert!(!status.is_running);
        assert_eq!(status.completed_sources, 0);
        assert_eq!(status.total_sources, 0);
        assert!(status.errors.is_empty());
        assert_eq!(status.state, RunState::Idle);
    }

    #[test]
    fn test_error_history_is_bounded() {
        let board = StatusBoard::new();
        for i in 0..(MAX_ERROR_HISTORY + 5) {
            board.record_error(format!("e{i}"));
        }
        let status = board.snapshot();
        assert_eq!(status.errors.len(), MAX_ERROR_HISTORY);
        assert_eq!(status.errors[0], "e5");
        assert_eq!(board.recent_errors(2), ["e53", "e54"]);
        assert_eq!(board.recent_errors(500).len(), MAX_ERROR_HISTORY);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let board = StatusBoard::new();
        let before = board.snapshot();
        board.mark_running();
        board.begin(3);
        board.source_done(1);
        assert!(!before.is_running);
        let now = board.snapshot();
        assert!(now.is_running);
        assert_eq!((now.completed_sources, now.total_sources), (1, 3));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(StatusBoard::new().snapshot()).unwrap();
        assert_eq!(json["isRunning"], false);
        assert_eq!(json["completedSources"], 0);
        assert_eq!(json["state"], "idle");
        assert!(json.get("lastUpdate").is_some());
    }
}
