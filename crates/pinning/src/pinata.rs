//! Pinata `pinFileToIPFS` client with exponential-backoff retry.
//!
//! Failed uploads are retried up to three times (1 s, 2 s, 4 s). Client
//! errors other than `429 Too Many Requests` are returned immediately.

use std::time::Duration;

use imagen_core::Artifact;
use reqwest::multipart;
use serde::Deserialize;

/// Pinata API base URL.
pub const DEFAULT_API_URL: &str = "https://api.pinata.cloud";

/// Public gateway URL template; `{CID}` is replaced by the content hash.
pub const DEFAULT_GATEWAY_TEMPLATE: &str = "https://gateway.pinata.cloud/ipfs/{CID}";

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single upload attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const CID_PLACEHOLDER: &str = "{CID}";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for pinning failures.
#[derive(Debug, thiserror::Error)]
pub enum PinningError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Pinata returned a non-2xx status code.
    #[error("Pinata returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response did not carry a content hash.
    #[error("Pinata response has no IpfsHash")]
    MissingHash,
}

impl PinningError {
    fn is_retryable(&self) -> bool {
        match self {
            PinningError::Request(_) => true,
            PinningError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            PinningError::MissingHash => false,
        }
    }
}

/// Body of a successful `pinFileToIPFS` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PinResponse {
    #[serde(rename = "IpfsHash", default)]
    pub ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pub pin_size: u64,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// PinataClient
// ---------------------------------------------------------------------------

/// Uploads artifacts to Pinata.
#[derive(Clone)]
pub struct PinataClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    api_secret: String,
    gateway_template: String,
    retry_delays: Vec<Duration>,
}

impl PinataClient {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, PinningError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            gateway_template: DEFAULT_GATEWAY_TEMPLATE.to_string(),
            retry_delays: RETRY_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        })
    }

    /// Point the client at another API host.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use another gateway URL template. A template without `{CID}` is
    /// treated as a base URL the hash is appended to.
    pub fn with_gateway(mut self, template: impl Into<String>) -> Self {
        self.gateway_template = template.into();
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Public URL of a pinned content hash.
    pub fn gateway_url(&self, cid: &str) -> String {
        if self.gateway_template.contains(CID_PLACEHOLDER) {
            self.gateway_template.replace(CID_PLACEHOLDER, cid)
        } else {
            format!("{}/{}", self.gateway_template.trim_end_matches('/'), cid)
        }
    }

    /// Pin an artifact and return its public gateway URL.
    pub async fn upload(&self, artifact: &Artifact) -> Result<String, PinningError> {
        let pinned = self.pin_file(artifact).await?;
        let url = self.gateway_url(&pinned.ipfs_hash);
        tracing::info!(
            cid = %pinned.ipfs_hash,
            file_name = %artifact.file_name,
            url = %url,
            "Artifact pinned to IPFS",
        );
        Ok(url)
    }

    /// Pin an artifact with retry.
    ///
    /// Returns `Ok` on the first successful attempt. On failure the error
    /// of the last attempt made is returned.
    pub async fn pin_file(&self, artifact: &Artifact) -> Result<PinResponse, PinningError> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_pin(artifact).await {
                Ok(pinned) => return Ok(pinned),
                Err(e) if !e.is_retryable() => {
                    tracing::error!(file_name = %artifact.file_name, error = %e, "Pinata rejected upload");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        file_name = %artifact.file_name,
                        error = %e,
                        "Pinata upload attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_pin(artifact).await.inspect_err(|e| {
            tracing::error!(file_name = %artifact.file_name, error = %e, "Pinata upload failed after all retries");
        })
    }

    /// Execute a single upload and check the response.
    async fn try_pin(&self, artifact: &Artifact) -> Result<PinResponse, PinningError> {
        let file = multipart::Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name.clone())
            .mime_str(artifact.content_type())?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("pinataMetadata", pin_metadata(artifact).to_string());

        let response = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.api_secret)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PinningError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let pinned: PinResponse = response.json().await?;
        if pinned.ipfs_hash.is_empty() {
            return Err(PinningError::MissingHash);
        }
        Ok(pinned)
    }
}

fn pin_metadata(artifact: &Artifact) -> serde_json::Value {
    serde_json::json!({
        "name": artifact.file_name,
        "keyvalues": {
            "generated_at": artifact.generated_at.to_rfc3339(),
            "width": artifact.width,
            "height": artifact.height,
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
