//! Keystroke capture types and normalization.
//!
//! Raw key transitions are deduplicated and segmented into bounded sequences by
//! the [`sequencer`], then compressed into structural summaries by [`patterns`].
//! No sequence leaves this module without its derived pattern data attached.

pub mod patterns;
pub mod sequencer;

pub use patterns::{KeyRepeat, NavRun, RhythmLabel, SequencePatterns, Shortcut, TimingStats};
pub use sequencer::{KeyOutcome, KeystrokeSequencer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized modifier keys. Left/right variants collapse to one identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Cmd,
}

impl Modifier {
    /// Map a logical key name onto its modifier identity, if it is one.
    pub fn from_key(key: &str) -> Option<Modifier> {
        match key {
            "Ctrl" | "LeftCtrl" | "RightCtrl" | "Control" => Some(Modifier::Ctrl),
            "Shift" | "LeftShift" | "RightShift" => Some(Modifier::Shift),
            "Alt" | "LeftAlt" | "RightAlt" | "Option" => Some(Modifier::Alt),
            "Cmd" | "LeftCmd" | "RightCmd" | "Meta" | "Super" | "Win" => Some(Modifier::Cmd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Alt => "alt",
            Modifier::Cmd => "cmd",
        }
    }
}

/// Direction bucket for navigation-key runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Classify a logical key as a navigation key.
pub fn navigation_direction(key: &str) -> Option<NavDirection> {
    match key {
        "UpArrow" | "PageUp" => Some(NavDirection::Up),
        "DownArrow" | "PageDown" => Some(NavDirection::Down),
        "LeftArrow" | "Home" => Some(NavDirection::Left),
        "RightArrow" | "End" => Some(NavDirection::Right),
        _ => None,
    }
}

/// One accepted key transition within a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystrokeRecord {
    pub key: String,
    /// Modifiers held when the transition fired
    pub modifiers: Vec<Modifier>,
    pub is_down: bool,
    /// Milliseconds since the sequence started
    pub offset_ms: i64,
}

/// A closed, structurally summarized batch of keystrokes.
///
/// The parallel arrays line up index-for-index; `patterns` carries the derived
/// structure and `primary_app` the most frequent application over the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystrokeSequence {
    pub keys: Vec<String>,
    pub offsets_ms: Vec<i64>,
    pub modifiers: Vec<Vec<Modifier>>,
    pub downs: Vec<bool>,
    pub patterns: SequencePatterns,
    /// Applications that contributed keystrokes, in first-seen order
    pub apps: Vec<String>,
    pub primary_app: String,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl KeystrokeSequence {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_normalization() {
        assert_eq!(Modifier::from_key("LeftCtrl"), Some(Modifier::Ctrl));
        assert_eq!(Modifier::from_key("RightCtrl"), Some(Modifier::Ctrl));
        assert_eq!(Modifier::from_key("Meta"), Some(Modifier::Cmd));
        assert_eq!(Modifier::from_key("a"), None);
    }

    #[test]
    fn test_navigation_classification() {
        assert_eq!(navigation_direction("UpArrow"), Some(NavDirection::Up));
        assert_eq!(navigation_direction("PageDown"), Some(NavDirection::Down));
        assert_eq!(navigation_direction("Home"), Some(NavDirection::Left));
        assert_eq!(navigation_direction("Enter"), None);
    }
}
