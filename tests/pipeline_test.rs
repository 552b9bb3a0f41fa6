//! End-to-end pipeline tests with scripted producers and an in-memory backend.
//!
//! Timers run on the paused tokio clock; the gate's wall-clock guards are
//! exercised only in the direction that holds regardless of clock skew
//! (milliseconds of real time never satisfy the 5s minimum capture interval).

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use deskpilot_agent::backend::{
    BackendError, JobStatus, JobStatusResponse, RecognitionBackend, ReportSink, SubmitRequest,
    SubmitResponse, SuggestionBackend, SuggestionRequest,
};
use deskpilot_agent::capture::ScriptedScreen;
use deskpilot_agent::config::Config;
use deskpilot_agent::events::{ActivityEvent, ActivityKind, AppContext, ReportBatch};
use deskpilot_agent::monitor::{RawKeyEvent, ScriptedKeySource, ScriptedProbe};
use deskpilot_agent::status::StatusBoard;
use deskpilot_agent::{Agent, AgentDeps};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One fake service standing in for recognition, reporting, and suggestions.
#[derive(Default)]
struct RecordingBackend {
    submissions: Mutex<Vec<SubmitRequest>>,
    suggestion_requests: Mutex<Vec<SuggestionRequest>>,
    batches: Mutex<Vec<ReportBatch>>,
}

impl RecordingBackend {
    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    fn delivered_events(&self) -> Vec<ActivityEvent> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.events.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl RecognitionBackend for RecordingBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        self.submissions.lock().unwrap().push(request.clone());
        Ok(SubmitResponse {
            job_id: Uuid::new_v4(),
        })
    }

    async fn status(&self, _job_id: &Uuid) -> Result<JobStatusResponse, BackendError> {
        Ok(JobStatusResponse {
            status: JobStatus::Completed,
            text_lines: Some(vec!["recognized screen text".to_string()]),
            app_context: None,
            error_message: None,
        })
    }
}

#[async_trait]
impl ReportSink for RecordingBackend {
    async fn deliver(&self, batch: &ReportBatch) -> Result<(), BackendError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

#[async_trait]
impl SuggestionBackend for RecordingBackend {
    async fn request_suggestions(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        self.suggestion_requests.lock().unwrap().push(request.clone());
        Ok(Vec::new())
    }
}

struct Harness {
    backend: Arc<RecordingBackend>,
    probe: deskpilot_agent::monitor::ScriptedProbeHandle,
    keys: deskpilot_agent::monitor::ScriptedKeyHandle,
    status: Arc<StatusBoard>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

fn start_agent() -> Harness {
    start_agent_with(Config::default())
}

fn start_agent_with(config: Config) -> Harness {
    let backend = Arc::new(RecordingBackend::default());
    let probe = ScriptedProbe::new();
    let probe_handle = probe.handle();
    let keys = ScriptedKeySource::new();
    let keys_handle = keys.handle();

    let deps = AgentDeps {
        probe: Box::new(probe),
        keys: Box::new(keys),
        backend: backend.clone(),
        reports: backend.clone(),
        suggestions: backend.clone(),
        screen: Arc::new(ScriptedScreen::with_image("frame")),
    };

    let status = Arc::new(StatusBoard::new());
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(Agent::new(config, deps, status.clone()).run(shutdown.clone()));

    Harness {
        backend,
        probe: probe_handle,
        keys: keys_handle,
        status,
        shutdown,
        task,
    }
}

fn ctx(app: &str, title: &str) -> AppContext {
    AppContext::new(app, title, "")
}

#[tokio::test(start_paused = true)]
async fn test_switch_burst_captures_once() {
    let harness = start_agent();

    // Two rapid switches inside the quiet window settle as one context.
    harness.probe.push_foreground(ctx("Editor", "main.rs"));
    harness.probe.push_foreground(ctx("Browser", "docs"));
    tokio::time::sleep(Duration::from_secs(3)).await;

    {
        let submissions = harness.backend.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].app_name, "Browser");
    }
    assert_eq!(harness.backend.suggestion_requests.lock().unwrap().len(), 1);

    // A switch moments after the capture fails the minimum-interval check.
    harness.probe.push_foreground(ctx("Terminal", "sh"));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.backend.submission_count(), 1);

    harness.shutdown.cancel();
    harness.task.await.unwrap().unwrap();

    let events = harness.backend.delivered_events();
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, ActivityKind::SessionStart)));
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, ActivityKind::SessionEnd)));
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, ActivityKind::AppSwitch { .. })));

    let snapshot = harness.status.snapshot();
    assert_eq!(snapshot.captures_completed, 1);
    assert_eq!(snapshot.suggestions_requested, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keystroke_sequence_lands_in_report() {
    let harness = start_agent();

    harness.probe.push_foreground(ctx("Editor", "main.rs"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let base = Utc::now();
    for i in 0..3 {
        let event = RawKeyEvent {
            key: "a".to_string(),
            scan_code: Some(30),
            is_down: true,
            timestamp: base + ChronoDuration::milliseconds(i * 100),
        };
        assert!(harness.keys.emit(event));
    }

    // Let the bridge thread move the events onto the loop's channel.
    std::thread::sleep(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The app switch force-closes the 3-keystroke sequence.
    harness.probe.push_foreground(ctx("Browser", "docs"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.shutdown.cancel();
    harness.task.await.unwrap().unwrap();

    let events = harness.backend.delivered_events();
    let sequence = events
        .iter()
        .find_map(|e| match &e.kind {
            ActivityKind::Keystroke { sequence } => Some(sequence),
            _ => None,
        })
        .expect("keystroke sequence event");

    assert_eq!(sequence.len(), 3);
    assert_eq!(sequence.primary_app, "Editor");
    assert_eq!(sequence.patterns.repeats.len(), 1);
    assert_eq!(sequence.patterns.repeats[0].count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_capacity_flushes_without_waiting_for_tick() {
    let mut config = Config::default();
    config.sampler.buffer_capacity = 3;
    // Periodic flushing pushed far out so only the capacity path can deliver.
    config.sampler.flush_secs = 600;
    let harness = start_agent_with(config);

    harness.probe.push_foreground(ctx("Editor", "a"));
    harness.probe.push_foreground(ctx("Browser", "b"));
    harness.probe.push_foreground(ctx("Terminal", "c"));

    // Session start plus two switches hit capacity at the 300ms poll; the
    // batch must be out before the 1s housekeeping tick.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let delivered: usize = harness
        .backend
        .batches
        .lock()
        .unwrap()
        .iter()
        .map(|batch| batch.events.len())
        .sum();
    assert!(delivered >= 3);

    harness.shutdown.cancel();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_window_switch_does_not_close_sequence() {
    let harness = start_agent();

    harness.probe.push_foreground(ctx("Editor", "main.rs"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let base = Utc::now();
    for i in 0..2 {
        let event = RawKeyEvent {
            key: "b".to_string(),
            scan_code: Some(48),
            is_down: true,
            timestamp: base + ChronoDuration::milliseconds(i * 100),
        };
        assert!(harness.keys.emit(event));
    }
    std::thread::sleep(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Title change within the same app keeps the sequence collecting; the
    // discard-below-minimum rule then applies at shutdown flush.
    harness.probe.push_foreground(ctx("Editor", "lib.rs"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.shutdown.cancel();
    harness.task.await.unwrap().unwrap();

    let events = harness.backend.delivered_events();
    assert!(!events
        .iter()
        .any(|e| matches!(&e.kind, ActivityKind::Keystroke { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, ActivityKind::WindowSwitch { .. })));
}
