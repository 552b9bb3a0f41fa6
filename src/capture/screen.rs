//! Screen access abstraction.

use crate::capture::CaptureError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Takes screenshots and manages the agent's own overlay windows around them.
///
/// `hide_overlays` runs immediately before a capture so the agent does not
/// photograph itself; `restore_overlays` must be called afterward whether or
/// not the capture succeeded, and must not steal input focus.
pub trait ScreenSource: Send + Sync {
    fn hide_overlays(&self);

    /// Capture the screen as a base64-encoded PNG.
    fn capture(&self) -> Result<String, CaptureError>;

    fn restore_overlays(&self);
}

/// Scripted screen for tests and hookless platforms.
///
/// Returns queued results, then repeats the last one. Hide/restore calls are
/// counted so overlay discipline is checkable.
pub struct ScriptedScreen {
    script: Mutex<VecDeque<Result<String, CaptureError>>>,
    last: Mutex<Option<Result<String, CaptureError>>>,
    hidden: AtomicUsize,
    restored: AtomicUsize,
}

impl ScriptedScreen {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            hidden: AtomicUsize::new(0),
            restored: AtomicUsize::new(0),
        }
    }

    /// A screen that always yields the same image.
    pub fn with_image(image: &str) -> Self {
        let screen = Self::new();
        screen.push(Ok(image.to_string()));
        screen
    }

    /// A screen that always reports missing capture permission.
    pub fn denied() -> Self {
        let screen = Self::new();
        screen.push(Err(CaptureError::Permission(
            "screen recording not authorized".to_string(),
        )));
        screen
    }

    pub fn push(&self, result: Result<String, CaptureError>) {
        self.script
            .lock()
            .expect("screen script lock poisoned")
            .push_back(result);
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn restored_count(&self) -> usize {
        self.restored.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedScreen {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_result(result: &Result<String, CaptureError>) -> Result<String, CaptureError> {
    match result {
        Ok(image) => Ok(image.clone()),
        Err(CaptureError::Permission(msg)) => Err(CaptureError::Permission(msg.clone())),
        Err(CaptureError::Capture(msg)) => Err(CaptureError::Capture(msg.clone())),
    }
}

impl ScreenSource for ScriptedScreen {
    fn hide_overlays(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }

    fn capture(&self) -> Result<String, CaptureError> {
        let next = self
            .script
            .lock()
            .expect("screen script lock poisoned")
            .pop_front();
        let mut last = self.last.lock().expect("screen script lock poisoned");
        if let Some(result) = next {
            *last = Some(clone_result(&result));
            return result;
        }
        match last.as_ref() {
            Some(result) => clone_result(result),
            None => Err(CaptureError::Capture("no scripted frames".to_string())),
        }
    }

    fn restore_overlays(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
    }
}
