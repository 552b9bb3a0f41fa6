//! HTTP implementation of the backend contracts.

use crate::backend::{
    BackendError, JobStatusResponse, RecognitionBackend, ReportSink, SubmitRequest,
    SubmitResponse, SuggestionBackend, SuggestionRequest,
};
use crate::config::BackendConfig;
use crate::events::ReportBatch;
use async_trait::async_trait;
use uuid::Uuid;

/// Per-request timeout. The overall capture deadline is enforced one layer up.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Reqwest-backed client for the recognition/reporting/suggestion endpoints.
pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Check whether the backend is reachable.
    pub async fn test_connection(&self) -> Result<bool, BackendError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.token)
    }
}

/// Map an error response body onto the error taxonomy. Authorization
/// failures become permission errors so they surface distinctly.
async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        BackendError::Permission(message)
    } else {
        BackendError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl RecognitionBackend for HttpBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let response = self
            .client
            .post(self.config.submit_url())
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))
    }

    async fn status(&self, job_id: &Uuid) -> Result<JobStatusResponse, BackendError> {
        let response = self
            .client
            .get(self.config.status_url(job_id))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ReportSink for HttpBackend {
    async fn deliver(&self, batch: &ReportBatch) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.config.report_url())
            .header("Authorization", self.bearer())
            .json(batch)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl SuggestionBackend for HttpBackend {
    async fn request_suggestions(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        let response = self
            .client
            .post(self.config.suggestions_url())
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))
    }
}
