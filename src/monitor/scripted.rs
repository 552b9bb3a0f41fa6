//! Scripted implementations of the observation traits.
//!
//! These back the test suite and let the agent run on platforms without a hook
//! backend: the probe replays queued observations, the key source exposes a
//! sender handle that stands in for the OS hook thread.

use crate::events::AppContext;
use crate::monitor::types::RawKeyEvent;
use crate::monitor::{KeySource, MonitorError, SystemProbe};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A probe that replays queued foreground/mouse observations.
///
/// When the queue runs dry it keeps returning the last observation, which
/// matches how a real desktop looks to a poller between focus changes.
#[derive(Default)]
pub struct ScriptedProbe {
    foreground_script: Arc<Mutex<VecDeque<Option<AppContext>>>>,
    mouse_script: Arc<Mutex<VecDeque<Option<(f64, f64)>>>>,
    last_foreground: Option<AppContext>,
    last_mouse: Option<(f64, f64)>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a foreground observation for a later poll.
    pub fn push_foreground(&self, context: AppContext) {
        self.foreground_script
            .lock()
            .expect("probe script lock poisoned")
            .push_back(Some(context));
    }

    /// Queue a cursor position for a later poll.
    pub fn push_mouse(&self, x: f64, y: f64) {
        self.mouse_script
            .lock()
            .expect("probe script lock poisoned")
            .push_back(Some((x, y)));
    }

    /// A handle that can keep queueing observations after the probe has been
    /// handed to the agent.
    pub fn handle(&self) -> ScriptedProbeHandle {
        ScriptedProbeHandle {
            foreground_script: self.foreground_script.clone(),
            mouse_script: self.mouse_script.clone(),
        }
    }
}

/// Cloneable injection handle for a [`ScriptedProbe`].
#[derive(Clone)]
pub struct ScriptedProbeHandle {
    foreground_script: Arc<Mutex<VecDeque<Option<AppContext>>>>,
    mouse_script: Arc<Mutex<VecDeque<Option<(f64, f64)>>>>,
}

impl ScriptedProbeHandle {
    pub fn push_foreground(&self, context: AppContext) {
        self.foreground_script
            .lock()
            .expect("probe script lock poisoned")
            .push_back(Some(context));
    }

    pub fn push_mouse(&self, x: f64, y: f64) {
        self.mouse_script
            .lock()
            .expect("probe script lock poisoned")
            .push_back(Some((x, y)));
    }
}

impl SystemProbe for ScriptedProbe {
    fn foreground(&mut self) -> Result<Option<AppContext>, MonitorError> {
        let next = self
            .foreground_script
            .lock()
            .expect("probe script lock poisoned")
            .pop_front();
        if let Some(observation) = next {
            self.last_foreground = observation;
        }
        Ok(self.last_foreground.clone())
    }

    fn mouse_position(&mut self) -> Result<Option<(f64, f64)>, MonitorError> {
        let next = self
            .mouse_script
            .lock()
            .expect("probe script lock poisoned")
            .pop_front();
        if let Some(observation) = next {
            self.last_mouse = observation;
        }
        Ok(self.last_mouse)
    }
}

/// A key source fed by tests (or a demo driver) instead of an OS hook.
pub struct ScriptedKeySource {
    sender: Sender<RawKeyEvent>,
    receiver: Receiver<RawKeyEvent>,
    running: Arc<AtomicBool>,
}

impl ScriptedKeySource {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A sender handle standing in for the hook thread.
    ///
    /// Events sent while the source is stopped are dropped, mirroring an
    /// unhooked listener.
    pub fn handle(&self) -> ScriptedKeyHandle {
        ScriptedKeyHandle {
            sender: self.sender.clone(),
            running: self.running.clone(),
        }
    }
}

impl Default for ScriptedKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for ScriptedKeySource {
    fn start(&mut self) -> Result<(), MonitorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<RawKeyEvent> {
        &self.receiver
    }
}

/// Cloneable injection handle for a [`ScriptedKeySource`].
#[derive(Clone)]
pub struct ScriptedKeyHandle {
    sender: Sender<RawKeyEvent>,
    running: Arc<AtomicBool>,
}

impl ScriptedKeyHandle {
    /// Inject one raw key event; returns whether it was accepted.
    pub fn emit(&self, event: RawKeyEvent) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_repeats_last_observation() {
        let mut probe = ScriptedProbe::new();
        probe.push_foreground(AppContext::new("Editor", "main.rs", ""));

        let first = probe.foreground().unwrap().unwrap();
        assert_eq!(first.app_name, "Editor");

        // Script exhausted: poller keeps seeing the same focus.
        let second = probe.foreground().unwrap().unwrap();
        assert_eq!(second.app_name, "Editor");
    }

    #[test]
    fn test_key_source_lifecycle() {
        let mut source = ScriptedKeySource::new();
        let handle = source.handle();

        // Stopped source drops injected events.
        assert!(!handle.emit(RawKeyEvent::down("a", 30)));

        source.start().unwrap();
        assert!(source.is_running());
        assert!(source.start().is_err());

        assert!(handle.emit(RawKeyEvent::down("a", 30)));
        assert!(source.receiver().try_recv().is_ok());

        source.stop();
        assert!(!source.is_running());
        assert!(!handle.emit(RawKeyEvent::up("a", 30)));
    }
}
