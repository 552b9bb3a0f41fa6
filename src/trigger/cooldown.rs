//! Suggestion request throttling.

use crate::config::TriggerConfig;
use crate::trigger::similarity::text_similarity;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

struct Snapshot {
    accepted_at: DateTime<Utc>,
    lines: Vec<String>,
}

/// Second throttle between successful recognition and the suggestion request.
///
/// Retains the last few accepted content snapshots and rejects a new request
/// that comes too soon after the previous acceptance or looks like any of
/// them. History is bounded by count with oldest-first eviction, not by age.
pub struct SuggestionCooldownGuard {
    config: TriggerConfig,
    history: VecDeque<Snapshot>,
}

impl SuggestionCooldownGuard {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    /// Accept or reject a suggestion request for the given recognized text.
    /// Acceptance records the snapshot.
    pub fn admit(&mut self, lines: &[String], now: DateTime<Utc>) -> bool {
        if let Some(last) = self.history.back() {
            let elapsed = now - last.accepted_at;
            if elapsed < Duration::seconds(self.config.suggestion_cooldown_secs as i64) {
                tracing::debug!(
                    elapsed_secs = elapsed.num_seconds(),
                    "suggestion cooldown active"
                );
                return false;
            }
        }

        for snapshot in &self.history {
            let similarity = text_similarity(&snapshot.lines, lines);
            if similarity > self.config.suggestion_similarity_threshold {
                tracing::debug!(similarity, "near-duplicate suggestion input rejected");
                return false;
            }
        }

        self.history.push_back(Snapshot {
            accepted_at: now,
            lines: lines.to_vec(),
        });
        if self.history.len() > self.config.cooldown_history {
            self.history.pop_front();
        }
        true
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SuggestionCooldownGuard {
        SuggestionCooldownGuard::new(TriggerConfig::default())
    }

    fn lines(text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    #[test]
    fn test_cooldown_rejects_rapid_requests() {
        let base = Utc::now();
        let mut guard = guard();

        assert!(guard.admit(&lines("first"), base));
        assert!(!guard.admit(&lines("second"), base + Duration::seconds(10)));
        assert!(guard.admit(&lines("second"), base + Duration::seconds(15)));
    }

    #[test]
    fn test_near_duplicate_rejected_against_any_snapshot() {
        let base = Utc::now();
        let mut guard = guard();

        assert!(guard.admit(&lines("alpha"), base));
        assert!(guard.admit(&lines("beta"), base + Duration::seconds(20)));

        // Matches the first snapshot, not just the most recent one.
        assert!(!guard.admit(&lines("alpha"), base + Duration::seconds(40)));
    }

    #[test]
    fn test_history_bounded_fifo() {
        let base = Utc::now();
        let mut guard = guard();
        let bound = TriggerConfig::default().cooldown_history;

        for i in 0..bound + 3 {
            let at = base + Duration::seconds(20 * i as i64);
            assert!(guard.admit(&lines(&format!("content {i}")), at));
            assert!(guard.history_len() <= bound);
        }

        // "content 0" has been evicted, so the same text is admissible again.
        let later = base + Duration::seconds(20 * (bound as i64 + 4));
        assert!(guard.admit(&lines("content 0"), later));
    }

    #[test]
    fn test_empty_content_matches_empty_snapshot() {
        let base = Utc::now();
        let mut guard = guard();

        assert!(guard.admit(&[], base));
        assert!(!guard.admit(&[], base + Duration::seconds(30)));
    }
}
