//! Operator-facing diagnostics.
//!
//! Tracks what the pipeline is doing without retaining any observed content:
//! counters, buffer sizes, the last-activity timestamp, and the most recent
//! backend-call status string. The snapshot persists to the data directory so
//! the `status` subcommand can read it from another process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Tracking state as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Default)]
struct InnerStatus {
    event_buffer_len: usize,
    key_buffer_len: usize,
    last_activity: Option<DateTime<Utc>>,
    backend_status: String,
}

/// Shared diagnostics board updated by the agent loop.
#[derive(Debug)]
pub struct StatusBoard {
    tracking: Mutex<TrackingState>,
    captures_attempted: AtomicU64,
    captures_completed: AtomicU64,
    suggestions_requested: AtomicU64,
    batches_delivered: AtomicU64,
    inner: Mutex<InnerStatus>,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            tracking: Mutex::new(TrackingState::Stopped),
            captures_attempted: AtomicU64::new(0),
            captures_completed: AtomicU64::new(0),
            suggestions_requested: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            inner: Mutex::new(InnerStatus {
                backend_status: "not contacted".to_string(),
                ..Default::default()
            }),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// A board that writes its snapshot to `<data_dir>/status.json`.
    pub fn with_persistence(data_dir: PathBuf) -> Self {
        let mut board = Self::new();
        board.persist_path = Some(data_dir.join("status.json"));
        board
    }

    pub fn set_tracking(&self, state: TrackingState) {
        *self.tracking.lock().expect("status lock poisoned") = state;
    }

    pub fn record_capture_attempt(&self) {
        self.captures_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_completed(&self) {
        self.captures_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suggestion_request(&self) {
        self.suggestions_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_delivered(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Refresh the fields the agent loop samples every tick.
    pub fn update_buffers(
        &self,
        event_buffer_len: usize,
        key_buffer_len: usize,
        last_activity: Option<DateTime<Utc>>,
    ) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.event_buffer_len = event_buffer_len;
        inner.key_buffer_len = key_buffer_len;
        inner.last_activity = last_activity;
    }

    pub fn set_backend_status(&self, status: impl Into<String>) {
        self.inner.lock().expect("status lock poisoned").backend_status = status.into();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("status lock poisoned");
        StatusSnapshot {
            tracking: *self.tracking.lock().expect("status lock poisoned"),
            captures_attempted: self.captures_attempted.load(Ordering::Relaxed),
            captures_completed: self.captures_completed.load(Ordering::Relaxed),
            suggestions_requested: self.suggestions_requested.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            event_buffer_len: inner.event_buffer_len,
            key_buffer_len: inner.key_buffer_len,
            last_activity: inner.last_activity,
            backend_status: inner.backend_status.clone(),
            started_at: self.started_at,
            updated_at: Utc::now(),
        }
    }

    /// Write the current snapshot to disk, if persistence is configured.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.snapshot())
                .map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Read the snapshot another agent process last persisted.
    pub fn load_persisted(data_dir: &std::path::Path) -> Result<StatusSnapshot, std::io::Error> {
        let content = std::fs::read_to_string(data_dir.join("status.json"))?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tracking: TrackingState,
    pub captures_attempted: u64,
    pub captures_completed: u64,
    pub suggestions_requested: u64,
    pub batches_delivered: u64,
    pub event_buffer_len: usize,
    pub key_buffer_len: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub backend_status: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Display string for the `status` subcommand.
    pub fn summary(&self) -> String {
        let tracking = match self.tracking {
            TrackingState::Running => "running",
            TrackingState::Paused => "paused",
            TrackingState::Stopped => "stopped",
        };
        let last_activity = self
            .last_activity
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Tracking: {}\n\
             Captures: {} attempted, {} completed\n\
             Suggestions requested: {}\n\
             Report batches delivered: {}\n\
             Buffers: {} events, {} keystrokes\n\
             Last activity: {}\n\
             Backend: {}",
            tracking,
            self.captures_attempted,
            self.captures_completed,
            self.suggestions_requested,
            self.batches_delivered,
            self.event_buffer_len,
            self.key_buffer_len,
            last_activity,
            self.backend_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let board = StatusBoard::new();
        board.record_capture_attempt();
        board.record_capture_attempt();
        board.record_capture_completed();

        let snapshot = board.snapshot();
        assert_eq!(snapshot.captures_attempted, 2);
        assert_eq!(snapshot.captures_completed, 1);
        assert_eq!(snapshot.tracking, TrackingState::Stopped);
    }

    #[test]
    fn test_summary_format() {
        let board = StatusBoard::new();
        board.set_tracking(TrackingState::Running);
        board.set_backend_status("ok");

        let summary = board.snapshot().summary();
        assert!(summary.contains("Tracking: running"));
        assert!(summary.contains("Backend: ok"));
        assert!(summary.contains("Last activity: never"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = std::env::temp_dir().join(format!("deskpilot-status-{}", uuid::Uuid::new_v4()));
        let board = StatusBoard::with_persistence(dir.clone());
        board.set_tracking(TrackingState::Running);
        board.record_batch_delivered();
        board.save().unwrap();

        let snapshot = StatusBoard::load_persisted(&dir).unwrap();
        assert_eq!(snapshot.tracking, TrackingState::Running);
        assert_eq!(snapshot.batches_delivered, 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
