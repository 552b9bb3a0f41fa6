//! OS observation boundary for the deskpilot agent.
//!
//! The pipeline never talks to platform APIs directly. It polls a [`SystemProbe`]
//! for foreground/mouse state and drains a [`KeySource`] for raw key transitions,
//! so platform hooks plug in behind these traits and tests run against scripted
//! implementations.

pub mod scripted;
pub mod types;

pub use scripted::{ScriptedKeyHandle, ScriptedKeySource, ScriptedProbe, ScriptedProbeHandle};
pub use types::{MousePoint, RawKeyEvent};

use crate::events::AppContext;
use crossbeam_channel::Receiver;
use thiserror::Error;

/// Errors from platform sampling calls.
///
/// Permission failures are kept distinct so the pipeline can report degraded
/// mode instead of a generic fault.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("OS permission denied: {0}")]
    Permission(String),
    #[error("listener already running")]
    AlreadyRunning,
    #[error("platform sampling failed: {0}")]
    Sampling(String),
}

/// Polled source of foreground-window and cursor state.
///
/// Implementations must be cheap to call at a few hundred millisecond cadence.
/// A failed observation returns an error; the caller logs and keeps sampling.
pub trait SystemProbe: Send {
    /// The currently focused application/window, or `None` when undetermined.
    fn foreground(&mut self) -> Result<Option<AppContext>, MonitorError>;

    /// Current cursor position in screen coordinates.
    fn mouse_position(&mut self) -> Result<Option<(f64, f64)>, MonitorError>;
}

/// Owned global key listener with an explicit lifecycle.
///
/// Raw events cross from the hook thread over a crossbeam channel; `stop()`
/// releases the OS handle and disconnects the sender.
pub trait KeySource: Send {
    fn start(&mut self) -> Result<(), MonitorError>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Receiver end of the raw key event channel.
    fn receiver(&self) -> &Receiver<RawKeyEvent>;
}
