//! Recognition backend contracts and wire types.
//!
//! The pipeline talks to one remote service through three narrow interfaces:
//! job submission/status for the capture round trip, batch delivery for
//! activity reports, and the suggestion request the cooldown guard fronts.
//! Everything network-shaped lives behind a trait so the pipeline can be
//! driven against in-memory fakes.

pub mod http;
pub mod push;

pub use http::HttpBackend;
pub use push::PushListener;

use crate::events::{AppContext, ReportBatch, SessionStats};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Backend call failures.
///
/// Permission failures are kept distinct so the operator-facing status can
/// say "grant screen recording access" instead of "network error".
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn is_permission(&self) -> bool {
        matches!(self, BackendError::Permission(_))
    }
}

/// Capture job submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Screenshot, base64-encoded PNG
    pub image: String,
    pub app_name: String,
    pub window_title: String,
    pub bundle_id: String,
    pub user_id: String,
    pub session_id: String,
    pub priority: String,
    /// Free-form context the backend threads through to recognition
    pub session_context: serde_json::Value,
}

/// Synchronous response to a job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
}

/// Terminal and non-terminal job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Job status as reported by polling or the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_context: Option<AppContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Suggestion request payload, sent only after the cooldown guard admits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub session_id: String,
    pub user_id: String,
    pub current_context: AppContext,
    /// Most recent recognized screen text
    pub text_lines: Vec<String>,
    pub session_stats: SessionStats,
}

/// Job submission and status for the capture round trip.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError>;

    async fn status(&self, job_id: &Uuid) -> Result<JobStatusResponse, BackendError>;
}

/// Delivery target for periodic activity report batches.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, batch: &ReportBatch) -> Result<(), BackendError>;
}

/// The AI-suggestion service. Responses are passed through uninterpreted.
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    async fn request_suggestions(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<serde_json::Value>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_response_minimal_json() {
        // A pending status carries no result fields at all.
        let response: JobStatusResponse =
            serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(response.status, JobStatus::Pending);
        assert!(response.text_lines.is_none());

        let completed: JobStatusResponse = serde_json::from_str(
            r#"{"status":"completed","text_lines":["fn main() {"]}"#,
        )
        .unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.text_lines.unwrap().len(), 1);
    }

    #[test]
    fn test_permission_errors_distinguished() {
        let permission = BackendError::Permission("screen recording".to_string());
        let network = BackendError::Network("connection refused".to_string());
        assert!(permission.is_permission());
        assert!(!network.is_permission());
    }
}
