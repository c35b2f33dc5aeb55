//! Collaborators of the task processor.
//!
//! Each external system the processor talks to sits behind a small
//! `async_trait` so the lifecycle can be driven by in-memory fakes. The
//! production adapters at the bottom of this module delegate to the
//! payments, ComfyUI and Pinata clients.

use async_trait::async_trait;
use imagen_comfyui::{ComfyUIGenerator, GenerationError};
use imagen_core::{Artifact, StepRef, StepUpdate, TaskLog, TaskStep};
use imagen_payments::subscription::SubscriptionClosed;
use imagen_payments::{PaymentsApi, PaymentsApiError, TaskLogSender};
use imagen_pinning::{PinataClient, PinningError};

/// Errors surfaced by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Payments(#[from] PaymentsApiError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Pinning(#[from] PinningError),

    #[error("Task log not delivered: {0}")]
    TaskLog(#[from] SubscriptionClosed),

    #[error("{0}")]
    Other(String),
}

/// Step query and update calls of the payments API.
#[async_trait]
pub trait StepApi: Send + Sync {
    async fn get_step(&self, step_id: &str) -> Result<TaskStep, ProcessError>;

    async fn update_step(&self, step: &StepRef, update: &StepUpdate) -> Result<(), ProcessError>;
}

/// Records task logs.
#[async_trait]
pub trait TaskLogger: Send + Sync {
    async fn log_task(&self, log: TaskLog) -> Result<(), ProcessError>;
}

/// Turns a character prompt into an image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Artifact, ProcessError>;
}

/// Publishes an artifact and returns its public URL.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, artifact: &Artifact) -> Result<String, ProcessError>;
}

// ---------------------------------------------------------------------------
// Production adapters
// ---------------------------------------------------------------------------

#[async_trait]
impl StepApi for PaymentsApi {
    async fn get_step(&self, step_id: &str) -> Result<TaskStep, ProcessError> {
        Ok(PaymentsApi::get_step(self, step_id).await?)
    }

    async fn update_step(&self, step: &StepRef, update: &StepUpdate) -> Result<(), ProcessError> {
        Ok(PaymentsApi::update_step(self, step, update).await?)
    }
}

#[async_trait]
impl TaskLogger for TaskLogSender {
    async fn log_task(&self, log: TaskLog) -> Result<(), ProcessError> {
        Ok(self.send(log)?)
    }
}

#[async_trait]
impl ImageGenerator for ComfyUIGenerator {
    async fn generate(&self, prompt: &str) -> Result<Artifact, ProcessError> {
        Ok(ComfyUIGenerator::generate(self, prompt).await?)
    }
}

#[async_trait]
impl ArtifactUploader for PinataClient {
    async fn upload(&self, artifact: &Artifact) -> Result<String, ProcessError> {
        Ok(PinataClient::upload(self, artifact).await?)
    }
}
