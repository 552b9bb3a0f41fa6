//! Trigger decision stage.
//!
//! Everything between "the desktop changed" and "spend money on a capture"
//! lives here: the [`debounce`] timer that settles rapid focus changes, the
//! [`gate`] that combines pause detection with rate limiting, the [`cooldown`]
//! guard applied after recognition, and the [`similarity`] metric both of the
//! latter use to spot near-duplicate content.

pub mod cooldown;
pub mod debounce;
pub mod gate;
pub mod similarity;

pub use cooldown::SuggestionCooldownGuard;
pub use debounce::SwitchDebouncer;
pub use gate::{GateState, TriggerGate};
pub use similarity::text_similarity;
