//! Keystroke deduplication and sequence segmentation.
//!
//! The dedup rules mirror what the hardware actually does: OS key-repeat fires
//! the same scan code in a tight loop (~35 ms window), and some listeners
//! deliver the same logical key twice within a few milliseconds. Only DOWN
//! events are deduplicated; UP events always pass so hold durations stay exact.

use crate::config::KeysConfig;
use crate::events::AppContext;
use crate::keys::patterns::SequencePatterns;
use crate::keys::{KeystrokeRecord, KeystrokeSequence, Modifier};
use crate::monitor::RawKeyEvent;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

/// What happened to one raw key event.
#[derive(Debug, Default)]
pub struct KeyOutcome {
    /// The event survived dedup and was recorded
    pub accepted: bool,
    /// A sequence closed as a result (size cap)
    pub closed: Option<KeystrokeSequence>,
}

/// Segments a deduplicated key stream into bounded sequences.
///
/// Lifecycle is idle → collecting → closed. A sequence closes on the size cap,
/// the max-duration timer, a natural break in typing, or an application switch;
/// the switch case bypasses the minimum-length rule so sequences stay scoped to
/// one application.
pub struct KeystrokeSequencer {
    config: KeysConfig,
    last_scan_down: HashMap<u32, DateTime<Utc>>,
    last_logical_down: HashMap<String, DateTime<Utc>>,
    held: BTreeSet<Modifier>,
    records: Vec<KeystrokeRecord>,
    apps: Vec<String>,
    app_counts: HashMap<String, u32>,
    started_at: Option<DateTime<Utc>>,
    last_keystroke: Option<DateTime<Utc>>,
}

impl KeystrokeSequencer {
    pub fn new(config: KeysConfig) -> Self {
        Self {
            config,
            last_scan_down: HashMap::new(),
            last_logical_down: HashMap::new(),
            held: BTreeSet::new(),
            records: Vec::new(),
            apps: Vec::new(),
            app_counts: HashMap::new(),
            started_at: None,
            last_keystroke: None,
        }
    }

    /// Feed one raw key transition observed in the given app context.
    pub fn handle(&mut self, event: &RawKeyEvent, context: &AppContext) -> KeyOutcome {
        let mut outcome = KeyOutcome::default();

        // Modifier keys maintain the held set instead of entering the buffer.
        if let Some(modifier) = Modifier::from_key(&event.key) {
            if event.is_down {
                self.held.insert(modifier);
            } else {
                self.held.remove(&modifier);
            }
            return outcome;
        }

        if event.is_down && !self.accept_down(event) {
            return outcome;
        }
        outcome.accepted = true;

        let started_at = *self.started_at.get_or_insert(event.timestamp);
        let offset_ms = (event.timestamp - started_at).num_milliseconds();

        self.records.push(KeystrokeRecord {
            key: event.key.clone(),
            modifiers: self.held.iter().copied().collect(),
            is_down: event.is_down,
            offset_ms,
        });
        self.last_keystroke = Some(event.timestamp);

        if !context.app_name.is_empty() {
            let count = self.app_counts.entry(context.app_name.clone()).or_insert(0);
            if *count == 0 {
                self.apps.push(context.app_name.clone());
            }
            *count += 1;
        }

        if self.records.len() >= self.config.sequence_capacity {
            outcome.closed = self.close(event.timestamp, false);
        }
        outcome
    }

    /// Close the current sequence on natural break or max duration.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Option<KeystrokeSequence> {
        let started_at = self.started_at?;

        if now - started_at >= Duration::seconds(self.config.max_duration_secs as i64) {
            return self.close(now, false);
        }
        if let Some(last) = self.last_keystroke {
            if now - last >= Duration::seconds(self.config.natural_break_secs as i64) {
                return self.close(now, false);
            }
        }
        None
    }

    /// Force-flush on an application switch, bypassing the minimum-length rule
    /// so the sequence stays scoped to the app it was typed in.
    pub fn context_changed(&mut self, now: DateTime<Utc>) -> Option<KeystrokeSequence> {
        self.close(now, true)
    }

    /// Flush whatever is collecting (used on tracking stop).
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<KeystrokeSequence> {
        self.close(now, false)
    }

    /// Number of buffered records, for status reporting.
    pub fn buffer_len(&self) -> usize {
        self.records.len()
    }

    /// DOWN dedup: reject the same scan code inside the repeat window and the
    /// same logical key inside the jitter window; record both timestamps on
    /// accept.
    fn accept_down(&mut self, event: &RawKeyEvent) -> bool {
        if let Some(scan_code) = event.scan_code {
            if let Some(last) = self.last_scan_down.get(&scan_code) {
                if event.timestamp - *last
                    < Duration::milliseconds(self.config.scancode_dedup_ms)
                {
                    return false;
                }
            }
        }
        if let Some(last) = self.last_logical_down.get(&event.key) {
            if event.timestamp - *last < Duration::milliseconds(self.config.logical_dedup_ms) {
                return false;
            }
        }

        if let Some(scan_code) = event.scan_code {
            self.last_scan_down.insert(scan_code, event.timestamp);
        }
        self.last_logical_down
            .insert(event.key.clone(), event.timestamp);
        true
    }

    fn close(&mut self, now: DateTime<Utc>, bypass_min_len: bool) -> Option<KeystrokeSequence> {
        let started_at = self.started_at.take()?;
        let records = std::mem::take(&mut self.records);
        let apps = std::mem::take(&mut self.apps);
        let app_counts = std::mem::take(&mut self.app_counts);
        self.last_keystroke = None;

        let down_count = records.iter().filter(|r| r.is_down).count();
        if !bypass_min_len && down_count < self.config.min_sequence_len {
            tracing::trace!(len = down_count, "discarding short keystroke sequence");
            return None;
        }
        if records.is_empty() {
            return None;
        }

        let patterns = SequencePatterns::extract(&records);
        let primary_app = app_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(app, _)| app.clone())
            .unwrap_or_default();

        let mut keys = Vec::with_capacity(records.len());
        let mut offsets_ms = Vec::with_capacity(records.len());
        let mut modifiers = Vec::with_capacity(records.len());
        let mut downs = Vec::with_capacity(records.len());
        for record in records {
            keys.push(record.key);
            offsets_ms.push(record.offset_ms);
            modifiers.push(record.modifiers);
            downs.push(record.is_down);
        }

        Some(KeystrokeSequence {
            keys,
            offsets_ms,
            modifiers,
            downs,
            patterns,
            apps,
            primary_app,
            started_at,
            closed_at: now,
        })
    }
}
