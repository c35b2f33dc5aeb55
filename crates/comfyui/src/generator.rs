//! Prompt-to-image generation through a ComfyUI instance.
//!
//! [`ComfyUIGenerator::generate`] wraps the character prompt in the
//! photographic template, submits the txt2img workflow, polls
//! `/history/{prompt_id}` until the prompt finishes, downloads the first
//! output image and validates it as PNG.

use std::time::Duration;

use imagen_core::prompt::{positive_prompt, NEGATIVE_PROMPT};
use imagen_core::{Artifact, CoreError};

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{prompt_state, HistoryEntry, PromptState};
use crate::workflow::{self, GenerationParams, SAVE_IMAGE_NODE};

/// Delay between two history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Overall deadline for one generation, queue time included.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from a single generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The workflow could not be queued.
    #[error("Failed to submit workflow: {0}")]
    Submit(#[source] ComfyUIApiError),

    /// ComfyUI rejected or failed to execute the workflow.
    #[error("ComfyUI execution failed: {0}")]
    Execution(String),

    #[error("Generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The prompt finished without any image output.
    #[error("Prompt {0} produced no image")]
    NoImage(String),

    #[error("Generated image is invalid: {0}")]
    InvalidImage(#[from] CoreError),

    /// Polling history or downloading the output failed.
    #[error("{0}")]
    Api(#[from] ComfyUIApiError),
}

/// Generates one PNG per prompt on a ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIGenerator {
    api: ComfyUIApi,
    params: GenerationParams,
    client_id: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl ComfyUIGenerator {
    pub fn new(api: ComfyUIApi, params: GenerationParams) -> Self {
        Self {
            api,
            params,
            client_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Generate an image for a character prompt.
    pub async fn generate(&self, character: &str) -> Result<Artifact, GenerationError> {
        let positive = positive_prompt(character);
        tracing::debug!(prompt = %positive, "Positive prompt");
        let workflow = workflow::txt2img(&self.params, &positive, NEGATIVE_PROMPT);

        let submitted = self
            .api
            .submit_workflow(&workflow, &self.client_id)
            .await
            .map_err(GenerationError::Submit)?;
        if !submitted.node_errors.is_empty() {
            return Err(GenerationError::Execution(format!(
                "workflow rejected: {}",
                serde_json::Value::Object(submitted.node_errors)
            )));
        }

        let prompt_id = submitted.prompt_id;
        tracing::info!(
            prompt_id = %prompt_id,
            queue_position = submitted.number,
            checkpoint = %self.params.checkpoint,
            "Workflow submitted to ComfyUI",
        );

        let entry = match tokio::time::timeout(self.timeout, self.wait_for_completion(&prompt_id))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(prompt_id = %prompt_id, "Generation timed out, interrupting");
                if let Err(e) = self.api.interrupt().await {
                    tracing::warn!(error = %e, "Failed to interrupt ComfyUI");
                }
                return Err(GenerationError::Timeout(self.timeout));
            }
        };

        let image = entry
            .first_image(SAVE_IMAGE_NODE)
            .ok_or_else(|| GenerationError::NoImage(prompt_id.clone()))?;
        let bytes = self.api.view_image(image).await?;
        let artifact = Artifact::from_png(bytes, image.filename.clone())?;

        tracing::info!(
            prompt_id = %prompt_id,
            width = artifact.width,
            height = artifact.height,
            bytes = artifact.len(),
            "Image generated",
        );
        Ok(artifact)
    }

    async fn wait_for_completion(&self, prompt_id: &str) -> Result<HistoryEntry, GenerationError> {
        loop {
            let history = self.api.get_history(prompt_id).await?;
            let state = prompt_state(&history, prompt_id)
                .map_err(|e| GenerationError::Execution(format!("malformed history: {e}")))?;

            match state {
                PromptState::Pending => tokio::time::sleep(self.poll_interval).await,
                PromptState::Succeeded(entry) => return Ok(entry),
                PromptState::Failed(message) => return Err(GenerationError::Execution(message)),
            }
        }
    }
}
