//! Single-flight capture round trip.
//!
//! One capture job at a time, screenshot to recognized text, completion via
//! the push channel when the backend has one open and a polling fallback when
//! it does not. Every failure mode resolves to an empty outcome; nothing in
//! this module can fault the pipeline.

use crate::backend::{
    JobStatus, JobStatusResponse, PushListener, RecognitionBackend, SubmitRequest,
};
use crate::capture::{CaptureError, ScreenSource};
use crate::config::CaptureConfig;
use crate::events::AppContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Result of one capture attempt. Empty text lines mean "nothing happened",
/// whether from rejection, failure, or timeout.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub text_lines: Vec<String>,
    pub context: AppContext,
}

impl CaptureOutcome {
    pub fn empty(context: AppContext) -> Self {
        Self {
            text_lines: Vec::new(),
            context,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text_lines.is_empty()
    }
}

/// Clears the in-flight flag on drop, covering success, failure, and
/// cancellation alike.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self { flag: flag.clone() })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Owns the at-most-one-in-flight invariant for capture jobs.
pub struct CaptureJobClient {
    config: CaptureConfig,
    user_id: String,
    backend: Arc<dyn RecognitionBackend>,
    screen: Arc<dyn ScreenSource>,
    push: Arc<PushListener>,
    in_flight: Arc<AtomicBool>,
    last_status: Mutex<String>,
}

impl CaptureJobClient {
    pub fn new(
        config: CaptureConfig,
        user_id: String,
        backend: Arc<dyn RecognitionBackend>,
        screen: Arc<dyn ScreenSource>,
        push: Arc<PushListener>,
    ) -> Self {
        Self {
            config,
            user_id,
            backend,
            screen,
            push,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_status: Mutex::new("idle".to_string()),
        }
    }

    /// Capture the screen, submit it, and await recognition.
    ///
    /// Returns immediately with an empty outcome if a job is already in
    /// flight; requests are never queued.
    pub async fn submit_and_await(
        &self,
        context: &AppContext,
        session_id: &str,
        session_context: serde_json::Value,
    ) -> CaptureOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("capture already in flight, rejecting");
            self.set_status("capture already in flight");
            return CaptureOutcome::empty(context.clone());
        };

        // Overlays come back regardless of how the screenshot went.
        self.screen.hide_overlays();
        let shot = self.screen.capture();
        self.screen.restore_overlays();

        let image = match shot {
            Ok(image) => image,
            Err(CaptureError::Permission(msg)) => {
                tracing::warn!("screen capture permission missing: {}", msg);
                self.set_status(format!("screen capture blocked: {msg}"));
                return CaptureOutcome::empty(context.clone());
            }
            Err(CaptureError::Capture(msg)) => {
                tracing::warn!("screenshot failed: {}", msg);
                self.set_status(format!("screenshot failed: {msg}"));
                return CaptureOutcome::empty(context.clone());
            }
        };

        let request = SubmitRequest {
            image,
            app_name: context.app_name.clone(),
            window_title: context.window_title.clone(),
            bundle_id: context.bundle_id.clone(),
            user_id: self.user_id.clone(),
            session_id: session_id.to_string(),
            priority: self.config.priority.clone(),
            session_context,
        };

        let job_id = match self.backend.submit(&request).await {
            Ok(response) => response.job_id,
            Err(e) => {
                tracing::warn!("job submission failed: {}", e);
                self.set_status(if e.is_permission() {
                    format!("backend authorization failed: {e}")
                } else {
                    format!("submission failed: {e}")
                });
                return CaptureOutcome::empty(context.clone());
            }
        };

        tracing::debug!(%job_id, app = %context.app_name, "capture job submitted");
        let deadline = Duration::from_secs(self.config.job_timeout_secs);

        let result = if self.push.is_connected() {
            self.await_push(job_id, deadline).await
        } else {
            self.poll_until_terminal(job_id, deadline).await
        };

        match result {
            Some(result) if result.status == JobStatus::Completed => {
                self.set_status("ok");
                CaptureOutcome {
                    text_lines: result.text_lines.unwrap_or_default(),
                    context: result.app_context.unwrap_or_else(|| context.clone()),
                }
            }
            Some(result) => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string());
                tracing::warn!(%job_id, "recognition failed: {}", message);
                self.set_status(format!("recognition failed: {message}"));
                CaptureOutcome::empty(context.clone())
            }
            None => {
                tracing::warn!(%job_id, "capture job timed out");
                self.set_status("capture timed out");
                CaptureOutcome::empty(context.clone())
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Human-readable state of the most recent backend interaction.
    pub fn last_status(&self) -> String {
        self.last_status
            .lock()
            .expect("status lock poisoned")
            .clone()
    }

    fn set_status(&self, status: impl Into<String>) {
        *self.last_status.lock().expect("status lock poisoned") = status.into();
    }

    async fn await_push(&self, job_id: Uuid, deadline: Duration) -> Option<JobStatusResponse> {
        let rx = self.push.subscribe(job_id);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => Some(result),
            // Listener torn down under us.
            Ok(Err(_)) => None,
            Err(_) => {
                self.push.unsubscribe(&job_id);
                None
            }
        }
    }

    async fn poll_until_terminal(
        &self,
        job_id: Uuid,
        deadline: Duration,
    ) -> Option<JobStatusResponse> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let poll_loop = async {
            loop {
                match self.backend.status(&job_id).await {
                    Ok(result) if result.status.is_terminal() => return result,
                    Ok(_) => {}
                    // Transient poll errors ride on the overall deadline.
                    Err(e) => tracing::debug!(%job_id, "status poll failed: {}", e),
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::time::timeout(deadline, poll_loop).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::push::CompletionMessage;
    use crate::backend::{BackendError, SubmitResponse};
    use crate::capture::ScriptedScreen;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeBackend {
        job_id: Uuid,
        submissions: Mutex<Vec<SubmitRequest>>,
        polls: AtomicUsize,
        /// How many polls answer pending before completion; usize::MAX never completes
        pending_polls: usize,
        lines: Vec<String>,
        /// Pushes the completion while submit() is still running
        push_during_submit: Mutex<Option<Arc<PushListener>>>,
    }

    impl FakeBackend {
        fn completing_after(pending_polls: usize, lines: &[&str]) -> Self {
            Self {
                job_id: Uuid::new_v4(),
                submissions: Mutex::new(Vec::new()),
                polls: AtomicUsize::new(0),
                pending_polls,
                lines: lines.iter().map(|s| s.to_string()).collect(),
                push_during_submit: Mutex::new(None),
            }
        }

        fn submission_count(&self) -> usize {
            self.submissions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecognitionBackend for FakeBackend {
        async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
            self.submissions.lock().unwrap().push(request.clone());
            if let Some(push) = self.push_during_submit.lock().unwrap().take() {
                push.inject(CompletionMessage {
                    job_id: self.job_id,
                    result: JobStatusResponse {
                        status: JobStatus::Completed,
                        text_lines: Some(self.lines.clone()),
                        app_context: None,
                        error_message: None,
                    },
                });
            }
            Ok(SubmitResponse {
                job_id: self.job_id,
            })
        }

        async fn status(&self, _job_id: &Uuid) -> Result<JobStatusResponse, BackendError> {
            let polls = self.polls.fetch_add(1, Ordering::SeqCst);
            if polls < self.pending_polls {
                return Ok(JobStatusResponse {
                    status: JobStatus::Pending,
                    text_lines: None,
                    app_context: None,
                    error_message: None,
                });
            }
            Ok(JobStatusResponse {
                status: JobStatus::Completed,
                text_lines: Some(self.lines.clone()),
                app_context: None,
                error_message: None,
            })
        }
    }

    async fn client_with(
        backend: Arc<FakeBackend>,
        screen: Arc<ScriptedScreen>,
    ) -> (Arc<CaptureJobClient>, Arc<PushListener>) {
        let push = Arc::new(PushListener::start(0).await.unwrap());
        let client = Arc::new(CaptureJobClient::new(
            CaptureConfig::default(),
            "tester".to_string(),
            backend,
            screen,
            push.clone(),
        ));
        (client, push)
    }

    fn ctx() -> AppContext {
        AppContext::new("Editor", "main.rs", "")
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fallback_resolves() {
        let backend = Arc::new(FakeBackend::completing_after(2, &["recognized"]));
        let screen = Arc::new(ScriptedScreen::with_image("img"));
        let (client, _push) = client_with(backend.clone(), screen).await;

        let outcome = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;

        assert_eq!(outcome.text_lines, vec!["recognized"]);
        assert_eq!(outcome.context.app_name, "Editor");
        assert_eq!(backend.submission_count(), 1);
        assert_eq!(client.last_status(), "ok");
        assert!(!client.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_rejected_while_in_flight() {
        let backend = Arc::new(FakeBackend::completing_after(5, &["slow"]));
        let screen = Arc::new(ScriptedScreen::with_image("img"));
        let (client, _push) = client_with(backend.clone(), screen).await;

        let first = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(client.is_busy());

        // Rejected immediately, no second submission.
        let second = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;
        assert!(second.is_empty());
        assert_eq!(backend.submission_count(), 1);

        let first = first.await.unwrap();
        assert_eq!(first.text_lines, vec!["slow"]);
        assert!(!client.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_empty() {
        let backend = Arc::new(FakeBackend::completing_after(usize::MAX, &[]));
        let screen = Arc::new(ScriptedScreen::with_image("img"));
        let (client, _push) = client_with(backend, screen).await;

        let outcome = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;

        assert!(outcome.is_empty());
        assert_eq!(client.last_status(), "capture timed out");
        assert!(!client.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_path_used_when_connected() {
        let backend = Arc::new(FakeBackend::completing_after(usize::MAX, &[]));
        let screen = Arc::new(ScriptedScreen::with_image("img"));
        let (client, push) = client_with(backend.clone(), screen).await;

        // Mark the channel connected before the job goes out.
        push.inject(CompletionMessage {
            job_id: Uuid::new_v4(),
            result: JobStatusResponse {
                status: JobStatus::Completed,
                text_lines: None,
                app_context: None,
                error_message: None,
            },
        });
        assert!(push.is_connected());

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(push.inject(CompletionMessage {
            job_id: backend.job_id,
            result: JobStatusResponse {
                status: JobStatus::Completed,
                text_lines: Some(vec!["pushed".to_string()]),
                app_context: None,
                error_message: None,
            },
        }));

        let outcome = task.await.unwrap();
        assert_eq!(outcome.text_lines, vec!["pushed"]);
        // Poll path never ran.
        assert_eq!(backend.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_during_submit_window_resolves() {
        let backend = Arc::new(FakeBackend::completing_after(usize::MAX, &["raced"]));
        let screen = Arc::new(ScriptedScreen::with_image("img"));
        let (client, push) = client_with(backend.clone(), screen).await;

        // Push channel considered live before the job goes out.
        push.inject(CompletionMessage {
            job_id: Uuid::new_v4(),
            result: JobStatusResponse {
                status: JobStatus::Completed,
                text_lines: None,
                app_context: None,
                error_message: None,
            },
        });
        // The completion lands mid-submit, before the client subscribes.
        *backend.push_during_submit.lock().unwrap() = Some(push.clone());

        let outcome = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;

        assert_eq!(outcome.text_lines, vec!["raced"]);
        assert_eq!(client.last_status(), "ok");
        assert_eq!(backend.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlays_restored_when_capture_fails() {
        let backend = Arc::new(FakeBackend::completing_after(0, &[]));
        let screen = Arc::new(ScriptedScreen::new());
        screen.push(Err(CaptureError::Capture("display gone".to_string())));
        let (client, _push) = client_with(backend.clone(), screen.clone()).await;

        let outcome = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;

        assert!(outcome.is_empty());
        assert_eq!(screen.hidden_count(), 1);
        assert_eq!(screen.restored_count(), 1);
        assert_eq!(backend.submission_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denial_surfaces_in_status() {
        let backend = Arc::new(FakeBackend::completing_after(0, &[]));
        let screen = Arc::new(ScriptedScreen::denied());
        let (client, _push) = client_with(backend, screen).await;

        let outcome = client
            .submit_and_await(&ctx(), "SESS-1", serde_json::json!({}))
            .await;

        assert!(outcome.is_empty());
        assert!(client.last_status().contains("blocked"));
    }
}
