//! REST client for the payments API step endpoints.
//!
//! Wraps the step query and step update calls using [`reqwest`]. Every
//! request carries the agent's API key as a bearer token.

use std::time::Duration;

use imagen_core::{StepRef, StepUpdate, TaskStep};

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the payments API.
#[derive(Clone)]
pub struct PaymentsApi {
    client: reqwest::Client,
    backend_url: String,
    api_key: String,
}

/// Errors from the payments REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum PaymentsApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decode, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The payments API returned a non-2xx status code.
    #[error("Payments API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl PaymentsApi {
    /// Create a new API client.
    ///
    /// * `backend_url` - Base HTTP URL, e.g. `https://one-backend.staging.nevermined.app`.
    /// * `api_key`     - Nevermined API key sent as a bearer token.
    pub fn new(
        backend_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentsApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, backend_url, api_key))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        backend_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Fetch a step by its identifier.
    ///
    /// Sends `GET /api/v1/agents/steps/{step_id}`.
    pub async fn get_step(&self, step_id: &str) -> Result<TaskStep, PaymentsApiError> {
        let response = self
            .client
            .get(self.step_url(step_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Update a step's status and outputs.
    ///
    /// Sends `PUT /api/v1/agents/{did}/tasks/{task_id}/step/{step_id}`
    /// with the update as JSON body.
    pub async fn update_step(
        &self,
        step: &StepRef,
        update: &StepUpdate,
    ) -> Result<(), PaymentsApiError> {
        let response = self
            .client
            .put(self.update_url(step))
            .bearer_auth(&self.api_key)
            .json(update)
            .send()
            .await?;

        Self::check_status(response).await
    }

    fn step_url(&self, step_id: &str) -> String {
        format!("{}/api/v1/agents/steps/{}", self.backend_url, step_id)
    }

    fn update_url(&self, step: &StepRef) -> String {
        format!(
            "{}/api/v1/agents/{}/tasks/{}/step/{}",
            self.backend_url, step.did, step.task_id, step.step_id
        )
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PaymentsApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PaymentsApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PaymentsApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentsApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), PaymentsApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
