//! Pause detection and capture rate limiting.

use crate::config::TriggerConfig;
use crate::trigger::similarity::text_similarity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pause-detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Active,
    Paused,
}

/// Decides whether a settled context is worth a capture.
///
/// Three independent checks: the pause/resume state machine (a resume after a
/// short pause is itself a capture trigger), a minimum interval since the last
/// successful capture, and a content check against the last recognized text.
/// The single-flight guard lives in the capture client, not here.
pub struct TriggerGate {
    config: TriggerConfig,
    state: GateState,
    last_activity: Option<DateTime<Utc>>,
    /// At least one activity burst happened before the current pause began.
    /// A freshly started session that pauses immediately never counts.
    was_active_before_pause: bool,
    last_capture: Option<DateTime<Utc>>,
    last_text: Vec<String>,
}

impl TriggerGate {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: GateState::Active,
            last_activity: None,
            was_active_before_pause: false,
            last_capture: None,
            last_text: Vec::new(),
        }
    }

    /// Register qualifying activity (app switch, keystroke, filtered mouse
    /// move). Returns true when this activity resumes a pause, which is the
    /// signal to request a capture immediately.
    pub fn note_activity(&mut self, now: DateTime<Utc>) -> bool {
        self.last_activity = Some(now);

        if self.state == GateState::Paused {
            self.state = GateState::Active;
            if self.was_active_before_pause {
                tracing::debug!("resume from pause, requesting capture");
                return true;
            }
            return false;
        }
        self.was_active_before_pause = true;
        false
    }

    /// Driven by the periodic idle check. Transitions to paused once activity
    /// has been quiet past the threshold.
    pub fn check_pause(&mut self, now: DateTime<Utc>) {
        if self.state == GateState::Paused {
            return;
        }
        let Some(last) = self.last_activity else {
            return;
        };
        if now - last >= Duration::seconds(self.config.pause_threshold_secs as i64) {
            tracing::debug!("activity paused");
            self.state = GateState::Paused;
        }
    }

    /// Rate-limit check, evaluated before any expensive work begins.
    pub fn approve_capture(&self, now: DateTime<Utc>) -> bool {
        match self.last_capture {
            Some(last) => {
                now - last >= Duration::seconds(self.config.min_capture_interval_secs as i64)
            }
            None => true,
        }
    }

    /// Record a successful capture, starting the minimum-interval window.
    pub fn record_capture(&mut self, now: DateTime<Utc>) {
        self.last_capture = Some(now);
    }

    /// Compare newly recognized text against the previous capture's text.
    /// Near-duplicates are suppressed; accepted text becomes the new baseline.
    pub fn content_changed(&mut self, lines: &[String]) -> bool {
        let similarity = text_similarity(&self.last_text, lines);
        if similarity > self.config.capture_similarity_threshold {
            tracing::debug!(similarity, "screen content unchanged, suppressing");
            return false;
        }
        self.last_text = lines.to_vec();
        true
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }
}
