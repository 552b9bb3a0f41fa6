//! Screenshot capture and the single-flight recognition round trip.

pub mod client;
pub mod screen;

pub use client::{CaptureJobClient, CaptureOutcome};
pub use screen::{ScreenSource, ScriptedScreen};

use thiserror::Error;

/// Screenshot acquisition failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The OS denied screen capture; the pipeline degrades to no-capture mode.
    #[error("screen capture permission missing: {0}")]
    Permission(String),
    #[error("capture failed: {0}")]
    Capture(String),
}
