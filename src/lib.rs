//! DeskPilot Agent - local activity tracking with smart capture triggering.
//!
//! This library watches workstation activity (foreground app, mouse motion,
//! keystrokes) and decides autonomously when a screenshot-plus-recognition
//! round trip to a remote backend is actually worth the cost.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        DeskPilot Agent                         │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────┐   ┌───────────┐                │
//! │  │ Monitor  │──▶│ Aggregator │──▶│ Debouncer │                │
//! │  │ (probes) │   │ Sequencer  │   └─────┬─────┘                │
//! │  └──────────┘   └─────┬──────┘         ▼                      │
//! │                       │          ┌───────────┐   ┌─────────┐  │
//! │                       │          │  Trigger  │──▶│ Capture │  │
//! │                       ▼          │   Gate    │   │ Client  │  │
//! │                 ┌───────────┐    └───────────┘   └────┬────┘  │
//! │                 │  Report   │                         ▼       │
//! │                 │   Sink    │                   ┌──────────┐  │
//! │                 └───────────┘                   │ Cooldown │  │
//! │                                                 │  Guard   │  │
//! │                                                 └──────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows left to right as enriched context; only pass/fail decisions
//! flow back. Expensive work (screenshot, recognition, suggestions) happens
//! only after the debouncer, the gate, and the cooldown guard all agree.

pub mod agent;
pub mod aggregator;
pub mod backend;
pub mod capture;
pub mod config;
pub mod events;
pub mod keys;
pub mod monitor;
pub mod status;
pub mod trigger;

// Re-export key types at crate root for convenience
pub use agent::{Agent, AgentDeps};
pub use aggregator::{ActivityAggregator, ContextChange};
pub use backend::{HttpBackend, PushListener, RecognitionBackend, ReportSink, SuggestionBackend};
pub use capture::{CaptureJobClient, CaptureOutcome, ScreenSource};
pub use config::Config;
pub use events::{ActivityEvent, ActivityKind, AppContext, ReportBatch, SessionStats};
pub use keys::{KeystrokeSequence, KeystrokeSequencer};
pub use status::{StatusBoard, StatusSnapshot, TrackingState};
pub use trigger::{SuggestionCooldownGuard, SwitchDebouncer, TriggerGate};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
