//! Activity event model for the deskpilot agent.
//!
//! Events are immutable once created. Ownership moves into the aggregator's
//! buffer on creation and is relinquished to the reporting sink on flush.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The application/window identity observed at event emission time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    /// Executable or application name (e.g. "Safari")
    pub app_name: String,
    /// Title of the focused window
    pub window_title: String,
    /// Platform bundle/package identifier, empty when unknown
    pub bundle_id: String,
}

impl AppContext {
    pub fn new(
        app_name: impl Into<String>,
        window_title: impl Into<String>,
        bundle_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
            bundle_id: bundle_id.into(),
        }
    }

    /// Same application, regardless of which window is focused.
    pub fn same_app(&self, other: &AppContext) -> bool {
        self.app_name == other.app_name
    }
}

/// Coarse classification of mouse motion within one summary window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MousePattern {
    Minimal,
    Slow,
    Moderate,
    Rapid,
}

/// Aggregated mouse motion over one summary window.
///
/// Derived, not raw: individual sample points never leave the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseMovementSummary {
    /// Average instantaneous velocity in px/s
    pub avg_velocity: f64,
    /// Total path length in px
    pub total_distance: f64,
    /// Bounding box of sampled points: (min_x, min_y, max_x, max_y)
    pub bounds: (f64, f64, f64, f64),
    /// Number of qualifying samples that contributed
    pub sample_count: usize,
    /// Coarse motion classification
    pub pattern: MousePattern,
}

/// Payload-carrying activity event kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActivityKind {
    /// Foreground application changed
    AppSwitch { from_app: String },
    /// Window title changed within the same application
    WindowSwitch { from_title: String },
    /// One closed keystroke sequence (structural summary, see `keys`)
    Keystroke { sequence: crate::keys::KeystrokeSequence },
    /// Periodic mouse motion rollup
    MouseMovementSummary(MouseMovementSummary),
    /// No qualifying activity for the idle threshold
    IdleDetected { idle_secs: u64 },
    /// Tracking session started
    SessionStart,
    /// Tracking session ended
    SessionEnd,
}

/// A single activity event with its emission context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub context: AppContext,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl ActivityEvent {
    pub fn new(context: AppContext, kind: ActivityKind) -> Self {
        Self {
            timestamp: Utc::now(),
            context,
            kind,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, context: AppContext, kind: ActivityKind) -> Self {
        Self {
            timestamp,
            context,
            kind,
        }
    }
}

/// Running counters for one tracking session.
///
/// Owned by the aggregator; reset only when a new session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub keystrokes: u64,
    pub mouse_clicks: u64,
    pub mouse_moves: u64,
    pub app_switches: u64,
    pub window_switches: u64,
    pub session_start: DateTime<Utc>,
}

impl SessionStats {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            keystrokes: 0,
            mouse_clicks: 0,
            mouse_moves: 0,
            app_switches: 0,
            window_switches: 0,
            session_start,
        }
    }
}

/// One batch delivered to the reporting collaborator on flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBatch {
    pub events: Vec<ActivityEvent>,
    pub session_stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouse_summary: Option<MouseMovementSummary>,
    pub current_context: AppContext,
    pub session_id: String,
    /// Configured IANA timezone for this agent, validated at session start
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_context_same_app() {
        let a = AppContext::new("Editor", "main.rs", "com.example.editor");
        let b = AppContext::new("Editor", "lib.rs", "com.example.editor");
        let c = AppContext::new("Browser", "docs", "com.example.browser");

        assert!(a.same_app(&b));
        assert!(!a.same_app(&c));
    }

    #[test]
    fn test_activity_event_serialization() {
        let event = ActivityEvent::new(
            AppContext::new("Editor", "main.rs", ""),
            ActivityKind::AppSwitch {
                from_app: "Browser".to_string(),
            },
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("app_switch"));
        assert!(json.contains("Browser"));

        let back: ActivityEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.kind, ActivityKind::AppSwitch { .. }));
    }

    #[test]
    fn test_session_stats_start_at_zero() {
        let stats = SessionStats::new(Utc::now());
        assert_eq!(stats.keystrokes, 0);
        assert_eq!(stats.app_switches, 0);
    }
}
