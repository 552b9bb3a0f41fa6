//! Raw observation types produced at the OS boundary.
//!
//! These are transient: raw key events and mouse points are consumed within one
//! flush cycle and never leave the aggregation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One physical key transition as reported by the platform listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKeyEvent {
    /// Normalized logical key name (e.g. "a", "Enter", "LeftArrow", "LeftCtrl")
    pub key: String,
    /// Hardware scan code when the platform provides one
    pub scan_code: Option<u32>,
    /// Key press (true) or release (false)
    pub is_down: bool,
    pub timestamp: DateTime<Utc>,
}

impl RawKeyEvent {
    pub fn down(key: impl Into<String>, scan_code: u32) -> Self {
        Self {
            key: key.into(),
            scan_code: Some(scan_code),
            is_down: true,
            timestamp: Utc::now(),
        }
    }

    pub fn up(key: impl Into<String>, scan_code: u32) -> Self {
        Self {
            key: key.into(),
            scan_code: Some(scan_code),
            is_down: false,
            timestamp: Utc::now(),
        }
    }
}

/// One sampled cursor position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MousePoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
    /// Instantaneous velocity in px/s, distance over the sample interval
    pub velocity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_key_event_constructors() {
        let down = RawKeyEvent::down("a", 30);
        assert!(down.is_down);
        assert_eq!(down.scan_code, Some(30));

        let up = RawKeyEvent::up("a", 30);
        assert!(!up.is_down);
    }
}
