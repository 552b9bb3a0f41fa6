//! Activity aggregation: event buffering, session statistics, and the two-tier
//! mouse sampler.
//!
//! The aggregator is pure state driven by the agent's timers; every operation
//! takes the observation and the current time, so tests never sleep. Flushing
//! hands a [`ReportBatch`] to the caller and never blocks producers.

use crate::config::SamplerConfig;
use crate::events::{
    ActivityEvent, ActivityKind, AppContext, MouseMovementSummary, MousePattern, ReportBatch,
    SessionStats,
};
use crate::keys::KeystrokeSequence;
use crate::monitor::MousePoint;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Rolling mouse sample buffer cap; oldest points are evicted first.
const MOUSE_BUFFER_CAP: usize = 200;

/// Average velocity below this classifies a summary as slow, in px/s.
const SLOW_VELOCITY: f64 = 100.0;

/// Average velocity above this classifies a summary as rapid, in px/s.
const RAPID_VELOCITY: f64 = 500.0;

/// Total distance below this classifies a summary as minimal motion, in px.
const MINIMAL_DISTANCE: f64 = 50.0;

/// A context transition observed by the foreground poller.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextChange {
    /// Foreground application changed
    App(AppContext),
    /// Window title changed within the same application
    Window(AppContext),
}

impl ContextChange {
    pub fn context(&self) -> &AppContext {
        match self {
            ContextChange::App(ctx) | ContextChange::Window(ctx) => ctx,
        }
    }
}

/// Accumulates activity events and session statistics for one tracking session.
pub struct ActivityAggregator {
    config: SamplerConfig,
    /// Own application name; focus events for it are ignored to avoid feedback
    self_app_name: String,
    session_id: String,
    /// Canonical IANA zone name stamped on every batch
    timezone: String,
    stats: SessionStats,
    buffer: Vec<ActivityEvent>,
    current_context: AppContext,
    mouse: MouseTracker,
    last_activity: DateTime<Utc>,
    last_flush: DateTime<Utc>,
}

impl ActivityAggregator {
    /// Start a new tracking session. Emits the session-start event.
    ///
    /// The timezone is validated against the IANA database; unrecognized
    /// names fall back to UTC rather than propagating into reports.
    pub fn new(
        config: SamplerConfig,
        self_app_name: impl Into<String>,
        session_id: impl Into<String>,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let timezone = match timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz.to_string(),
            Err(_) => {
                tracing::warn!(timezone, "unknown timezone, reporting as UTC");
                chrono_tz::Tz::UTC.to_string()
            }
        };
        let mut aggregator = Self {
            mouse: MouseTracker::new(config.mouse_noise_px, now),
            config,
            self_app_name: self_app_name.into(),
            session_id: session_id.into(),
            timezone,
            stats: SessionStats::new(now),
            buffer: Vec::new(),
            current_context: AppContext::default(),
            last_activity: now,
            last_flush: now,
        };
        aggregator.push(ActivityEvent::at(
            now,
            AppContext::default(),
            ActivityKind::SessionStart,
        ));
        aggregator
    }

    /// Compare the observed foreground identity against the previous one.
    ///
    /// Emits an app-switch or window-switch event on change and reports the
    /// transition so the debouncer and trigger gate can react. Observations of
    /// the agent's own windows are dropped.
    pub fn record_app_context(
        &mut self,
        observed: Option<AppContext>,
        now: DateTime<Utc>,
    ) -> Option<ContextChange> {
        let observed = observed?;
        if observed.app_name == self.self_app_name {
            return None;
        }
        if observed == self.current_context {
            return None;
        }

        let change = if observed.same_app(&self.current_context) {
            self.stats.window_switches += 1;
            self.push(ActivityEvent::at(
                now,
                observed.clone(),
                ActivityKind::WindowSwitch {
                    from_title: self.current_context.window_title.clone(),
                },
            ));
            ContextChange::Window(observed.clone())
        } else {
            self.stats.app_switches += 1;
            self.push(ActivityEvent::at(
                now,
                observed.clone(),
                ActivityKind::AppSwitch {
                    from_app: self.current_context.app_name.clone(),
                },
            ));
            ContextChange::App(observed.clone())
        };

        self.current_context = observed;
        self.last_activity = now;
        Some(change)
    }

    /// Record one cursor sample. Returns true when the displacement exceeded
    /// the noise threshold and a point was kept.
    pub fn sample_mouse(&mut self, position: Option<(f64, f64)>, now: DateTime<Utc>) -> bool {
        let Some((x, y)) = position else {
            return false;
        };
        if !self.mouse.sample(x, y, now) {
            return false;
        }
        self.stats.mouse_moves += 1;
        self.last_activity = now;
        true
    }

    /// Count a mouse click from an embedding that has a click hook.
    pub fn note_click(&mut self, now: DateTime<Utc>) {
        self.stats.mouse_clicks += 1;
        self.last_activity = now;
    }

    /// Count one accepted keystroke (called per deduplicated DOWN event).
    pub fn note_keystroke(&mut self, now: DateTime<Utc>) {
        self.stats.keystrokes += 1;
        self.last_activity = now;
    }

    /// Append a closed keystroke sequence as an activity event.
    pub fn record_sequence(&mut self, sequence: KeystrokeSequence, now: DateTime<Utc>) {
        self.push(ActivityEvent::at(
            now,
            self.current_context.clone(),
            ActivityKind::Keystroke { sequence },
        ));
    }

    /// Drain the mouse sample buffer into one summary event if the rollup
    /// interval elapsed. Independent of the main event flush.
    pub fn maybe_summarize_mouse(&mut self, now: DateTime<Utc>) {
        let due = now - self.mouse.last_summary
            >= Duration::seconds(self.config.mouse_summary_secs as i64);
        if !due {
            return;
        }
        if let Some(summary) = self.mouse.summarize(now) {
            self.push(ActivityEvent::at(
                now,
                self.current_context.clone(),
                ActivityKind::MouseMovementSummary(summary),
            ));
        }
    }

    /// Emit an idle event when no qualifying activity was observed for the
    /// idle threshold, then reset the clock.
    pub fn check_idle(&mut self, now: DateTime<Utc>) -> bool {
        let idle_for = now - self.last_activity;
        if idle_for < Duration::seconds(self.config.idle_threshold_secs as i64) {
            return false;
        }
        self.push(ActivityEvent::at(
            now,
            self.current_context.clone(),
            ActivityKind::IdleDetected {
                idle_secs: idle_for.num_seconds().max(0) as u64,
            },
        ));
        self.last_activity = now;
        true
    }

    /// Close the session. Emits the session-end event; the caller should take
    /// one final forced batch afterwards.
    pub fn end_session(&mut self, now: DateTime<Utc>) {
        self.push(ActivityEvent::at(
            now,
            self.current_context.clone(),
            ActivityKind::SessionEnd,
        ));
    }

    /// Whether the buffer reached its forced-flush capacity.
    pub fn over_capacity(&self) -> bool {
        self.buffer.len() >= self.config.buffer_capacity
    }

    /// Take a batch when the buffer is over capacity, the flush interval
    /// elapsed, or `force` is set. Returns `None` when nothing is due.
    pub fn take_batch(&mut self, now: DateTime<Utc>, force: bool) -> Option<ReportBatch> {
        let time_due = now - self.last_flush >= Duration::seconds(self.config.flush_secs as i64);
        if !(force || time_due || self.over_capacity()) {
            return None;
        }
        if self.buffer.is_empty() && !force {
            self.last_flush = now;
            return None;
        }

        self.last_flush = now;
        let mouse_summary = self.mouse.summarize(now);
        Some(ReportBatch {
            events: std::mem::take(&mut self.buffer),
            session_stats: self.stats.clone(),
            mouse_summary,
            current_context: self.current_context.clone(),
            session_id: self.session_id.clone(),
            timezone: self.timezone.clone(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn current_context(&self) -> &AppContext {
        &self.current_context
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn push(&mut self, event: ActivityEvent) {
        self.buffer.push(event);
    }
}

/// Two-tier mouse sampler: fine-grained points in, one coarse summary out.
struct MouseTracker {
    noise_px: f64,
    points: VecDeque<MousePoint>,
    last_point: Option<MousePoint>,
    last_summary: DateTime<Utc>,
}

impl MouseTracker {
    fn new(noise_px: f64, now: DateTime<Utc>) -> Self {
        Self {
            noise_px,
            points: VecDeque::new(),
            last_point: None,
            last_summary: now,
        }
    }

    /// Keep a point only when it moved past the noise threshold.
    fn sample(&mut self, x: f64, y: f64, now: DateTime<Utc>) -> bool {
        let velocity = match self.last_point {
            Some(last) => {
                let distance = ((x - last.x).powi(2) + (y - last.y).powi(2)).sqrt();
                if distance <= self.noise_px {
                    return false;
                }
                let elapsed = (now - last.timestamp).num_milliseconds().max(1) as f64 / 1000.0;
                distance / elapsed
            }
            None => 0.0,
        };

        let point = MousePoint {
            x,
            y,
            timestamp: now,
            velocity,
        };
        if self.points.len() >= MOUSE_BUFFER_CAP {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.last_point = Some(point);
        true
    }

    /// Collapse and clear the sample buffer. `None` when no points were kept.
    fn summarize(&mut self, now: DateTime<Utc>) -> Option<MouseMovementSummary> {
        self.last_summary = now;
        if self.points.is_empty() {
            return None;
        }

        let mut total_distance = 0.0;
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut velocity_sum = 0.0;

        let mut previous: Option<&MousePoint> = None;
        for point in &self.points {
            if let Some(prev) = previous {
                total_distance +=
                    ((point.x - prev.x).powi(2) + (point.y - prev.y).powi(2)).sqrt();
            }
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
            velocity_sum += point.velocity;
            previous = Some(point);
        }

        let sample_count = self.points.len();
        let avg_velocity = velocity_sum / sample_count as f64;
        let pattern = classify_pattern(avg_velocity, total_distance);

        self.points.clear();
        self.last_point = None;

        Some(MouseMovementSummary {
            avg_velocity,
            total_distance,
            bounds: (min_x, min_y, max_x, max_y),
            sample_count,
            pattern,
        })
    }
}

fn classify_pattern(avg_velocity: f64, total_distance: f64) -> MousePattern {
    if total_distance < MINIMAL_DISTANCE {
        MousePattern::Minimal
    } else if avg_velocity < SLOW_VELOCITY {
        MousePattern::Slow
    } else if avg_velocity < RAPID_VELOCITY {
        MousePattern::Moderate
    } else {
        MousePattern::Rapid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(app: &str, title: &str) -> AppContext {
        AppContext::new(app, title, "")
    }

    fn aggregator(now: DateTime<Utc>) -> ActivityAggregator {
        ActivityAggregator::new(
            SamplerConfig::default(),
            "deskpilot-agent",
            "SESS-test",
            "UTC",
            now,
        )
    }

    #[test]
    fn test_app_switch_vs_window_switch() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        let change = agg.record_app_context(Some(ctx("Editor", "main.rs")), now);
        assert!(matches!(change, Some(ContextChange::App(_))));

        let change = agg.record_app_context(Some(ctx("Editor", "lib.rs")), now);
        assert!(matches!(change, Some(ContextChange::Window(_))));

        let change = agg.record_app_context(Some(ctx("Editor", "lib.rs")), now);
        assert!(change.is_none());

        assert_eq!(agg.stats().app_switches, 1);
        assert_eq!(agg.stats().window_switches, 1);
    }

    #[test]
    fn test_own_process_ignored() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        let change = agg.record_app_context(Some(ctx("deskpilot-agent", "overlay")), now);
        assert!(change.is_none());
        assert_eq!(agg.stats().app_switches, 0);
    }

    #[test]
    fn test_mouse_noise_threshold() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        assert!(agg.sample_mouse(Some((100.0, 100.0)), now));
        // 3px displacement is under the 5px noise floor.
        assert!(!agg.sample_mouse(Some((103.0, 100.0)), now + Duration::milliseconds(100)));
        assert!(agg.sample_mouse(Some((120.0, 100.0)), now + Duration::milliseconds(200)));
        assert_eq!(agg.stats().mouse_moves, 2);
    }

    #[test]
    fn test_capacity_forces_flush() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        for i in 0..SamplerConfig::default().buffer_capacity {
            agg.record_app_context(Some(ctx(&format!("App{i}"), "w")), now);
        }
        assert!(agg.over_capacity());

        // Capacity alone is enough; no time needs to pass.
        let batch = agg.take_batch(now, false).expect("forced flush");
        assert!(batch.events.len() >= SamplerConfig::default().buffer_capacity);
        assert_eq!(agg.buffer_len(), 0);
    }

    #[test]
    fn test_time_based_flush() {
        let now = Utc::now();
        let mut agg = aggregator(now);
        agg.record_app_context(Some(ctx("Editor", "main.rs")), now);

        assert!(agg.take_batch(now + Duration::seconds(1), false).is_none());

        let batch = agg
            .take_batch(now + Duration::seconds(6), false)
            .expect("time-based flush");
        // Session start + app switch.
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.current_context.app_name, "Editor");
    }

    #[test]
    fn test_idle_detection_resets_clock() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        assert!(!agg.check_idle(now + Duration::seconds(10)));
        assert!(agg.check_idle(now + Duration::seconds(31)));
        // Clock was reset; not idle again right away.
        assert!(!agg.check_idle(now + Duration::seconds(40)));
    }

    #[test]
    fn test_mouse_summary_drains_buffer() {
        let now = Utc::now();
        let mut agg = aggregator(now);

        agg.sample_mouse(Some((0.0, 0.0)), now);
        agg.sample_mouse(Some((100.0, 0.0)), now + Duration::milliseconds(100));
        agg.sample_mouse(Some((100.0, 100.0)), now + Duration::milliseconds(200));

        agg.maybe_summarize_mouse(now + Duration::seconds(6));
        let batch = agg.take_batch(now + Duration::seconds(6), true).unwrap();
        let summary = batch.events.iter().find_map(|e| match &e.kind {
            ActivityKind::MouseMovementSummary(s) => Some(s),
            _ => None,
        });
        let summary = summary.expect("summary event");
        assert_eq!(summary.sample_count, 3);
        assert!((summary.total_distance - 200.0).abs() < 1e-6);

        // Buffer cleared: a second rollup emits nothing.
        agg.maybe_summarize_mouse(now + Duration::seconds(12));
        let batch = agg.take_batch(now + Duration::seconds(12), true).unwrap();
        assert!(batch.events.is_empty());
    }

    #[test]
    fn test_timezone_stamped_on_batches() {
        let now = Utc::now();
        let mut agg = ActivityAggregator::new(
            SamplerConfig::default(),
            "deskpilot-agent",
            "SESS-test",
            "America/Los_Angeles",
            now,
        );
        let batch = agg.take_batch(now, true).unwrap();
        assert_eq!(batch.timezone, "America/Los_Angeles");
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let now = Utc::now();
        let mut agg = ActivityAggregator::new(
            SamplerConfig::default(),
            "deskpilot-agent",
            "SESS-test",
            "Mars/Olympus_Mons",
            now,
        );
        let batch = agg.take_batch(now, true).unwrap();
        assert_eq!(batch.timezone, "UTC");
    }

    #[test]
    fn test_mouse_pattern_classification() {
        assert_eq!(classify_pattern(10.0, 20.0), MousePattern::Minimal);
        assert_eq!(classify_pattern(50.0, 200.0), MousePattern::Slow);
        assert_eq!(classify_pattern(300.0, 200.0), MousePattern::Moderate);
        assert_eq!(classify_pattern(900.0, 200.0), MousePattern::Rapid);
    }
}
