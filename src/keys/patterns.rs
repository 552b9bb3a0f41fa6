//! Structural pattern extraction for closed keystroke sequences.
//!
//! All pattern data is computed from DOWN events: repeats and navigation runs
//! describe what was pressed, timing statistics describe the press rhythm.

use crate::keys::{navigation_direction, KeystrokeRecord, Modifier, NavDirection};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Identical-key runs shorter than this are ordinary typing.
const MIN_REPEAT_RUN: usize = 3;

/// Navigation-key runs qualify from this length.
const MIN_NAV_RUN: usize = 2;

/// Mean inter-key interval below this counts as fast typing, in ms.
const FAST_MEAN_MS: f64 = 150.0;

/// Mean inter-key interval above this counts as deliberate typing, in ms.
const SLOW_MEAN_MS: f64 = 400.0;

/// Coefficient of variation below this counts as a consistent rhythm.
const CONSISTENT_CV: f64 = 0.5;

/// Coarse typing-rhythm classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmLabel {
    FastConsistent,
    FastVariable,
    SlowDeliberate,
    ConsistentModerate,
    VariableModerate,
}

/// A run of the identical key pressed consecutively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRepeat {
    pub key: String,
    pub count: usize,
    pub avg_interval_ms: f64,
}

/// Inter-key interval statistics over the sequence, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingStats {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub variance_ms: f64,
}

/// A contiguous run of same-direction navigation keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavRun {
    pub direction: NavDirection,
    pub count: usize,
}

/// One modified keypress (non-modifier key with a non-empty modifier set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortcut {
    pub key: String,
    pub modifiers: Vec<Modifier>,
}

/// Derived structure attached to every emitted sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequencePatterns {
    pub repeats: Vec<KeyRepeat>,
    pub timing: TimingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<RhythmLabel>,
    /// Press counts per modifier name
    pub modifier_usage: BTreeMap<String, u32>,
    /// Modified presses over total presses
    pub modified_ratio: f64,
    pub nav_runs: Vec<NavRun>,
    pub shortcuts: Vec<Shortcut>,
}

impl SequencePatterns {
    /// Compute all derived pattern data for a closed sequence.
    pub fn extract(records: &[KeystrokeRecord]) -> SequencePatterns {
        let downs: Vec<&KeystrokeRecord> = records.iter().filter(|r| r.is_down).collect();
        if downs.is_empty() {
            return SequencePatterns::default();
        }

        let intervals: Vec<f64> = downs
            .windows(2)
            .map(|pair| (pair[1].offset_ms - pair[0].offset_ms) as f64)
            .collect();

        let timing = timing_stats(&intervals);
        let rhythm = if intervals.is_empty() {
            None
        } else {
            Some(classify_rhythm(&timing))
        };

        let mut modifier_usage: BTreeMap<String, u32> = BTreeMap::new();
        let mut modified = 0usize;
        let mut shortcuts = Vec::new();
        for record in &downs {
            if record.modifiers.is_empty() {
                continue;
            }
            modified += 1;
            for modifier in &record.modifiers {
                *modifier_usage.entry(modifier.name().to_string()).or_insert(0) += 1;
            }
            shortcuts.push(Shortcut {
                key: record.key.clone(),
                modifiers: record.modifiers.clone(),
            });
        }

        SequencePatterns {
            repeats: find_repeats(&downs),
            timing,
            rhythm,
            modifier_usage,
            modified_ratio: modified as f64 / downs.len() as f64,
            nav_runs: find_nav_runs(&downs),
            shortcuts,
        }
    }
}

fn timing_stats(intervals: &[f64]) -> TimingStats {
    if intervals.is_empty() {
        return TimingStats::default();
    }
    let variance = if intervals.len() < 2 {
        0.0
    } else {
        intervals.iter().variance()
    };
    TimingStats {
        mean_ms: intervals.iter().mean(),
        min_ms: intervals.iter().copied().fold(f64::MAX, f64::min),
        max_ms: intervals.iter().copied().fold(f64::MIN, f64::max),
        variance_ms: variance,
    }
}

fn classify_rhythm(timing: &TimingStats) -> RhythmLabel {
    let mean = timing.mean_ms;
    let cv = if mean > 0.0 {
        timing.variance_ms.sqrt() / mean
    } else {
        0.0
    };
    let consistent = cv < CONSISTENT_CV;

    if mean < FAST_MEAN_MS {
        if consistent {
            RhythmLabel::FastConsistent
        } else {
            RhythmLabel::FastVariable
        }
    } else if mean > SLOW_MEAN_MS {
        RhythmLabel::SlowDeliberate
    } else if consistent {
        RhythmLabel::ConsistentModerate
    } else {
        RhythmLabel::VariableModerate
    }
}

/// Runs of the identical key repeated at least [`MIN_REPEAT_RUN`] times.
fn find_repeats(downs: &[&KeystrokeRecord]) -> Vec<KeyRepeat> {
    let mut repeats = Vec::new();
    let mut start = 0;

    while start < downs.len() {
        let mut end = start + 1;
        while end < downs.len() && downs[end].key == downs[start].key {
            end += 1;
        }
        let count = end - start;
        if count >= MIN_REPEAT_RUN {
            let span_ms = (downs[end - 1].offset_ms - downs[start].offset_ms) as f64;
            repeats.push(KeyRepeat {
                key: downs[start].key.clone(),
                count,
                avg_interval_ms: span_ms / (count - 1) as f64,
            });
        }
        start = end;
    }
    repeats
}

/// Contiguous same-direction navigation runs of at least [`MIN_NAV_RUN`] keys.
fn find_nav_runs(downs: &[&KeystrokeRecord]) -> Vec<NavRun> {
    let mut runs = Vec::new();
    let mut current: Option<(NavDirection, usize)> = None;

    for record in downs {
        match navigation_direction(&record.key) {
            Some(direction) => match current {
                Some((dir, count)) if dir == direction => current = Some((dir, count + 1)),
                Some((dir, count)) => {
                    if count >= MIN_NAV_RUN {
                        runs.push(NavRun {
                            direction: dir,
                            count,
                        });
                    }
                    current = Some((direction, 1));
                }
                None => current = Some((direction, 1)),
            },
            None => {
                if let Some((dir, count)) = current.take() {
                    if count >= MIN_NAV_RUN {
                        runs.push(NavRun {
                            direction: dir,
                            count,
                        });
                    }
                }
            }
        }
    }
    if let Some((dir, count)) = current {
        if count >= MIN_NAV_RUN {
            runs.push(NavRun {
                direction: dir,
                count,
            });
        }
    }
    runs
}
