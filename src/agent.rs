//! The agent event loop.
//!
//! One task owns every piece of pipeline state and drives it from timers and
//! channels: foreground and mouse polls, the key-event bridge, the settled
//! contexts coming back from the debouncer, and completions from spawned
//! capture tasks. Only the capture round trip and report delivery run
//! concurrently with sampling; they communicate back over channels, so none
//! of the in-loop state needs a lock.

use crate::aggregator::{ActivityAggregator, ContextChange};
use crate::backend::{
    PushListener, RecognitionBackend, ReportSink, SuggestionBackend, SuggestionRequest,
};
use crate::capture::{CaptureJobClient, CaptureOutcome, ScreenSource};
use crate::config::Config;
use crate::events::AppContext;
use crate::keys::KeystrokeSequencer;
use crate::monitor::{KeySource, SystemProbe};
use crate::status::{StatusBoard, TrackingState};
use crate::trigger::{SuggestionCooldownGuard, SwitchDebouncer, TriggerGate};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Cadence of the housekeeping tick that drives pause detection, sequence
/// timeouts, and flush checks.
const TICK_MS: u64 = 1000;

/// How long the final report delivery may hold up shutdown.
const SHUTDOWN_FLUSH_SECS: u64 = 5;

/// Everything the agent talks to through a trait seam.
pub struct AgentDeps {
    pub probe: Box<dyn SystemProbe>,
    pub keys: Box<dyn KeySource>,
    pub backend: Arc<dyn RecognitionBackend>,
    pub reports: Arc<dyn ReportSink>,
    pub suggestions: Arc<dyn SuggestionBackend>,
    pub screen: Arc<dyn ScreenSource>,
}

pub struct Agent {
    config: Config,
    deps: AgentDeps,
    status: Arc<StatusBoard>,
    watch_config: bool,
}

impl Agent {
    pub fn new(config: Config, deps: AgentDeps, status: Arc<StatusBoard>) -> Self {
        Self {
            config,
            deps,
            status,
            watch_config: false,
        }
    }

    /// Reload the config file each tick so `pause`/`resume` from another
    /// process control this agent. Off by default so tests stay hermetic.
    pub fn watch_config(mut self, enabled: bool) -> Self {
        self.watch_config = enabled;
        self
    }

    /// Run the pipeline until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let session_id = format!("SESS-{}", Utc::now().timestamp_millis());
        tracing::info!(%session_id, "tracking session starting");

        self.deps.keys.start()?;
        let key_rx = bridge_key_events(self.deps.keys.receiver().clone());

        let push = Arc::new(PushListener::start(self.config.capture.push_port).await?);
        let client = Arc::new(CaptureJobClient::new(
            self.config.capture.clone(),
            self.config.backend.user_id.clone(),
            self.deps.backend.clone(),
            self.deps.screen.clone(),
            push.clone(),
        ));

        let (settled_tx, settled_rx) = mpsc::channel(16);
        let debouncer = SwitchDebouncer::spawn(self.config.trigger.debounce_quiet_ms, settled_tx);

        let now = Utc::now();
        let aggregator = ActivityAggregator::new(
            self.config.sampler.clone(),
            env!("CARGO_PKG_NAME"),
            session_id.clone(),
            &self.config.backend.timezone,
            now,
        );
        let sequencer = KeystrokeSequencer::new(self.config.keys.clone());
        let gate = TriggerGate::new(self.config.trigger.clone());
        let cooldown = SuggestionCooldownGuard::new(self.config.trigger.clone());

        self.status.set_tracking(if self.config.paused {
            TrackingState::Paused
        } else {
            TrackingState::Running
        });
        self.status.save().ok();

        let mut loop_state = LoopState {
            config: self.config,
            watch_config: self.watch_config,
            status: self.status.clone(),
            session_id,
            aggregator,
            sequencer,
            gate,
            cooldown,
            client,
            reports: self.deps.reports,
            suggestions: self.deps.suggestions,
        };

        run_loop(
            &mut loop_state,
            &mut self.deps.probe,
            key_rx,
            settled_rx,
            &debouncer,
            &shutdown,
        )
        .await;

        // Ordered teardown: stop producers, flush what remains, cancel timers,
        // release listener handles.
        self.deps.keys.stop();
        let now = Utc::now();
        if let Some(sequence) = loop_state.sequencer.flush(now) {
            loop_state.aggregator.record_sequence(sequence, now);
        }
        loop_state.aggregator.end_session(now);
        if let Some(batch) = loop_state.aggregator.take_batch(now, true) {
            let delivery = loop_state.reports.deliver(&batch);
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_FLUSH_SECS), delivery).await {
                Ok(Ok(())) => loop_state.status.record_batch_delivered(),
                Ok(Err(e)) => tracing::warn!("final report delivery failed: {}", e),
                Err(_) => tracing::warn!("final report delivery timed out"),
            }
        }
        debouncer.shutdown().await;
        drop(push);

        loop_state.status.set_tracking(TrackingState::Stopped);
        loop_state.status.save().ok();
        tracing::info!("tracking session stopped");
        Ok(())
    }
}

struct LoopState {
    config: Config,
    watch_config: bool,
    status: Arc<StatusBoard>,
    session_id: String,
    aggregator: ActivityAggregator,
    sequencer: KeystrokeSequencer,
    gate: TriggerGate,
    cooldown: SuggestionCooldownGuard,
    client: Arc<CaptureJobClient>,
    reports: Arc<dyn ReportSink>,
    suggestions: Arc<dyn SuggestionBackend>,
}

async fn run_loop(
    state: &mut LoopState,
    probe: &mut Box<dyn SystemProbe>,
    mut key_rx: mpsc::Receiver<crate::monitor::RawKeyEvent>,
    mut settled_rx: mpsc::Receiver<ContextChange>,
    debouncer: &SwitchDebouncer,
    shutdown: &CancellationToken,
) {
    let mut app_poll = interval_ms(state.config.sampler.app_poll_ms);
    let mut mouse_poll = interval_ms(state.config.sampler.mouse_poll_ms);
    let mut idle_check = interval_ms(state.config.sampler.idle_check_secs * 1000);
    let mut tick = interval_ms(TICK_MS);

    let (capture_tx, mut capture_rx) = mpsc::channel::<CaptureOutcome>(8);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = app_poll.tick() => {
                let now = Utc::now();
                match probe.foreground() {
                    Ok(observed) => {
                        if let Some(change) = state.aggregator.record_app_context(observed, now) {
                            if matches!(change, ContextChange::App(_)) {
                                if let Some(sequence) = state.sequencer.context_changed(now) {
                                    state.aggregator.record_sequence(sequence, now);
                                }
                            }
                            state.on_activity(now, &capture_tx);
                            debouncer.notify(change).await;
                            state.flush_if_full(now);
                        }
                    }
                    // Sampling failures are survivable; keep polling.
                    Err(e) => tracing::warn!("foreground sample failed: {}", e),
                }
            }

            _ = mouse_poll.tick() => {
                let now = Utc::now();
                match probe.mouse_position() {
                    Ok(position) => {
                        if state.aggregator.sample_mouse(position, now) {
                            state.on_activity(now, &capture_tx);
                        }
                    }
                    Err(e) => tracing::warn!("mouse sample failed: {}", e),
                }
            }

            Some(event) = key_rx.recv() => {
                let now = event.timestamp;
                let outcome = state
                    .sequencer
                    .handle(&event, state.aggregator.current_context());
                if outcome.accepted && event.is_down {
                    state.aggregator.note_keystroke(now);
                    state.on_activity(now, &capture_tx);
                }
                if let Some(sequence) = outcome.closed {
                    state.aggregator.record_sequence(sequence, now);
                }
                state.flush_if_full(now);
            }

            Some(settled) = settled_rx.recv() => {
                let now = Utc::now();
                tracing::debug!(app = %settled.context().app_name, "context settled");
                state.maybe_capture(settled.context().clone(), now, &capture_tx);
            }

            Some(outcome) = capture_rx.recv() => {
                let now = Utc::now();
                state.on_capture_done(outcome, now);
            }

            _ = idle_check.tick() => {
                let now = Utc::now();
                state.aggregator.check_idle(now);
                state.flush_if_full(now);
            }

            _ = tick.tick() => {
                let now = Utc::now();
                state.reload_pause_flag();
                state.gate.check_pause(now);
                state.aggregator.maybe_summarize_mouse(now);
                if let Some(sequence) = state.sequencer.check_timeouts(now) {
                    state.aggregator.record_sequence(sequence, now);
                }
                state.flush_reports(now);
                state.status.update_buffers(
                    state.aggregator.buffer_len(),
                    state.sequencer.buffer_len(),
                    Some(state.aggregator.last_activity()),
                );
            }
        }
    }
}

impl LoopState {
    /// Pick up `pause`/`resume` issued from another process.
    fn reload_pause_flag(&mut self) {
        if !self.watch_config {
            return;
        }
        let Ok(config) = Config::load() else {
            return;
        };
        if config.paused != self.config.paused {
            self.config.paused = config.paused;
            if config.paused {
                tracing::info!("tracking paused");
                self.status.set_tracking(TrackingState::Paused);
            } else {
                tracing::info!("tracking resumed");
                self.status.set_tracking(TrackingState::Running);
            }
            self.status.save().ok();
        }
    }

    /// Qualifying activity: refresh the gate, and capture when this activity
    /// resumes a pause.
    fn on_activity(&mut self, now: chrono::DateTime<Utc>, capture_tx: &mpsc::Sender<CaptureOutcome>) {
        if self.gate.note_activity(now) {
            let context = self.aggregator.current_context().clone();
            self.maybe_capture(context, now, capture_tx);
        }
    }

    /// Gate checks, then hand the expensive part to a task so sampling
    /// continues. The client enforces single-flight on its own.
    fn maybe_capture(
        &mut self,
        context: AppContext,
        now: chrono::DateTime<Utc>,
        capture_tx: &mpsc::Sender<CaptureOutcome>,
    ) {
        if self.config.paused {
            return;
        }
        if context.app_name.is_empty() {
            return;
        }
        if !self.gate.approve_capture(now) {
            tracing::debug!("capture rejected by minimum interval");
            return;
        }
        if self.client.is_busy() {
            tracing::debug!("capture rejected, job in flight");
            return;
        }

        self.status.record_capture_attempt();
        let session_context = serde_json::json!({
            "stats": self.aggregator.stats(),
        });
        let client = self.client.clone();
        let status = self.status.clone();
        let session_id = self.session_id.clone();
        let capture_tx = capture_tx.clone();
        tokio::spawn(async move {
            let outcome = client
                .submit_and_await(&context, &session_id, session_context)
                .await;
            status.set_backend_status(client.last_status());
            let _ = capture_tx.send(outcome).await;
        });
    }

    /// A capture resolved. Successful text flows through the content check and
    /// the cooldown guard before a suggestion request goes out.
    fn on_capture_done(&mut self, outcome: CaptureOutcome, now: chrono::DateTime<Utc>) {
        if outcome.is_empty() {
            return;
        }
        self.gate.record_capture(now);
        self.status.record_capture_completed();

        if !self.gate.content_changed(&outcome.text_lines) {
            return;
        }
        if !self.cooldown.admit(&outcome.text_lines, now) {
            return;
        }

        self.status.record_suggestion_request();
        let request = SuggestionRequest {
            session_id: self.session_id.clone(),
            user_id: self.config.backend.user_id.clone(),
            current_context: outcome.context,
            text_lines: outcome.text_lines,
            session_stats: self.aggregator.stats().clone(),
        };
        let suggestions = self.suggestions.clone();
        tokio::spawn(async move {
            match suggestions.request_suggestions(&request).await {
                Ok(items) => tracing::info!(count = items.len(), "suggestions received"),
                Err(e) => tracing::warn!("suggestion request failed: {}", e),
            }
        });
    }

    /// Capacity overflow flushes right away instead of waiting for the tick.
    fn flush_if_full(&mut self, now: chrono::DateTime<Utc>) {
        if self.aggregator.over_capacity() {
            self.flush_reports(now);
        }
    }

    /// Deliver a due report batch without blocking the loop.
    fn flush_reports(&mut self, now: chrono::DateTime<Utc>) {
        let Some(batch) = self.aggregator.take_batch(now, false) else {
            return;
        };
        let reports = self.reports.clone();
        let status = self.status.clone();
        tokio::spawn(async move {
            match reports.deliver(&batch).await {
                Ok(()) => status.record_batch_delivered(),
                Err(e) => tracing::warn!(
                    events = batch.events.len(),
                    "report delivery failed: {}", e
                ),
            }
        });
        self.status.save().ok();
    }
}

fn interval_ms(ms: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Move key events from the hook thread's channel onto the loop's channel.
/// The thread exits once the source disconnects or the agent is gone.
fn bridge_key_events(
    raw: crossbeam_channel::Receiver<crate::monitor::RawKeyEvent>,
) -> mpsc::Receiver<crate::monitor::RawKeyEvent> {
    let (tx, rx) = mpsc::channel(1024);
    std::thread::spawn(move || loop {
        match raw.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    });
    rx
}
