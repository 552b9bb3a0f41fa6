//! Configuration for the deskpilot agent.
//!
//! Every timing threshold in the pipeline lives here with its default. The two
//! similarity thresholds differ on purpose: the capture gate and the suggestion
//! guard are tuned independently per call site.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sampling cadences and aggregation bounds
    pub sampler: SamplerConfig,
    /// Keystroke dedup and sequencing thresholds
    pub keys: KeysConfig,
    /// Debounce, pause detection and cooldown thresholds
    pub trigger: TriggerConfig,
    /// Capture job client behavior
    pub capture: CaptureConfig,
    /// Remote backend endpoints and identity
    pub backend: BackendConfig,
    /// Whether tracking is currently paused
    pub paused: bool,
    /// Path for status/state persistence
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deskpilot-agent");

        Self {
            sampler: SamplerConfig::default(),
            keys: KeysConfig::default(),
            trigger: TriggerConfig::default(),
            capture: CaptureConfig::default(),
            backend: BackendConfig::default(),
            paused: false,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deskpilot-agent")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Sampling cadences and aggregation bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Foreground app poll interval in milliseconds
    pub app_poll_ms: u64,
    /// Mouse position poll interval in milliseconds
    pub mouse_poll_ms: u64,
    /// Displacement below this many pixels is sampling noise
    pub mouse_noise_px: f64,
    /// Interval between mouse summary rollups, in seconds
    pub mouse_summary_secs: u64,
    /// Idle check cadence in seconds
    pub idle_check_secs: u64,
    /// No activity for this long emits an idle event, in seconds
    pub idle_threshold_secs: u64,
    /// Event buffer size that forces an immediate flush
    pub buffer_capacity: usize,
    /// Time-based event flush interval in seconds
    pub flush_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            app_poll_ms: 300,
            mouse_poll_ms: 100,
            mouse_noise_px: 5.0,
            mouse_summary_secs: 5,
            idle_check_secs: 10,
            idle_threshold_secs: 30,
            buffer_capacity: 100,
            flush_secs: 5,
        }
    }
}

/// Keystroke dedup and sequencing thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Same-scancode window for suppressing OS key-repeat, in milliseconds
    pub scancode_dedup_ms: i64,
    /// Per-logical-key minimum spacing for listener jitter, in milliseconds
    pub logical_dedup_ms: i64,
    /// Sequence closes when it reaches this many keystrokes
    pub sequence_capacity: usize,
    /// Sequence closes after this long regardless of activity, in seconds
    pub max_duration_secs: u64,
    /// Silence that closes a sequence as a natural break, in seconds
    pub natural_break_secs: u64,
    /// Sequences shorter than this are discarded without emission
    pub min_sequence_len: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            scancode_dedup_ms: 35,
            logical_dedup_ms: 5,
            sequence_capacity: 100,
            max_duration_secs: 30,
            natural_break_secs: 5,
            min_sequence_len: 5,
        }
    }
}

/// Debounce, pause detection and cooldown thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Quiet period for settling rapid focus changes, in milliseconds
    pub debounce_quiet_ms: u64,
    /// Inactivity that counts as a pause, in seconds
    pub pause_threshold_secs: u64,
    /// Minimum time between successful captures, in seconds
    pub min_capture_interval_secs: u64,
    /// Text similarity above this suppresses a new capture-driven request
    pub capture_similarity_threshold: f64,
    /// Minimum time between accepted suggestion requests, in seconds
    pub suggestion_cooldown_secs: u64,
    /// Text similarity above this rejects a suggestion request as a near-duplicate
    pub suggestion_similarity_threshold: f64,
    /// How many accepted snapshots the cooldown guard retains
    pub cooldown_history: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            debounce_quiet_ms: 500,
            pause_threshold_secs: 3,
            min_capture_interval_secs: 5,
            capture_similarity_threshold: 0.8,
            suggestion_cooldown_secs: 15,
            suggestion_similarity_threshold: 0.7,
            cooldown_history: 5,
        }
    }
}

/// Capture job client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Overall deadline for one capture round trip, in seconds
    pub job_timeout_secs: u64,
    /// Status poll interval when the push channel is down, in milliseconds
    pub poll_interval_ms: u64,
    /// Local port the push listener binds to (0 for random)
    pub push_port: u16,
    /// Priority tag attached to submitted jobs
    pub priority: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 30,
            poll_interval_ms: 1000,
            push_port: 0,
            priority: "normal".to_string(),
        }
    }
}

/// Remote backend endpoints and identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the recognition/reporting backend
    pub base_url: String,
    /// Bearer authentication token
    pub token: String,
    /// User identity attached to submissions; defaults to the hostname
    pub user_id: String,
    /// IANA timezone stamped on report envelopes
    pub timezone: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let user_id = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            base_url: "http://127.0.0.1:8750".to_string(),
            token: String::new(),
            user_id,
            timezone: chrono_tz::Tz::UTC.to_string(),
        }
    }
}

impl BackendConfig {
    /// Job submission endpoint.
    pub fn submit_url(&self) -> String {
        format!("{}/v1/jobs", self.base_url)
    }

    /// Job status endpoint for a given job id.
    pub fn status_url(&self, job_id: &uuid::Uuid) -> String {
        format!("{}/v1/jobs/{}", self.base_url, job_id)
    }

    /// Activity report ingest endpoint.
    pub fn report_url(&self) -> String {
        format!("{}/v1/activity", self.base_url)
    }

    /// Suggestion request endpoint.
    pub fn suggestions_url(&self) -> String {
        format!("{}/v1/suggestions", self.base_url)
    }

    /// Health check endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}
