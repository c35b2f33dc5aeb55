//! Per-step lifecycle: fetch, gate on Pending, generate, pin, report.

use std::sync::Arc;

use imagen_core::artifact::artifact_file_name;
use imagen_core::prompt::{character_prompt, is_blank};
use imagen_core::{StepRef, StepStatus, StepUpdate, TaskLog};

use crate::ports::{ArtifactUploader, ImageGenerator, ProcessError, StepApi, TaskLogger};

const STARTING_MESSAGE: &str = "Starting image generation...";
const NO_CHARACTER_DATA: &str = "No character data provided.";
const COMPLETED_MESSAGE: &str = "Image generation and upload to IPFS completed.";

/// Which branch of the lifecycle a notification took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The step could not be fetched; nothing was reported.
    Dropped { reason: String },
    /// The step was not Pending.
    Skipped { status: StepStatus },
    /// The step carried no character data and was marked Failed.
    Rejected,
    Completed { url: String },
    /// Generation, upload or the Completed update failed; the step was
    /// marked Failed.
    Failed { reason: String },
}

/// Runs the step lifecycle against its collaborators.
#[derive(Clone)]
pub struct TaskProcessor {
    steps: Arc<dyn StepApi>,
    logger: Arc<dyn TaskLogger>,
    generator: Arc<dyn ImageGenerator>,
    uploader: Arc<dyn ArtifactUploader>,
}

impl TaskProcessor {
    pub fn new(
        steps: Arc<dyn StepApi>,
        logger: Arc<dyn TaskLogger>,
        generator: Arc<dyn ImageGenerator>,
        uploader: Arc<dyn ArtifactUploader>,
    ) -> Self {
        Self {
            steps,
            logger,
            generator,
            uploader,
        }
    }

    /// Handle one step notification.
    pub async fn process(&self, notification: &StepRef) -> ProcessOutcome {
        let step = match self.steps.get_step(&notification.step_id).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(
                    step_id = %notification.step_id,
                    error = %e,
                    "Failed to fetch step, dropping notification",
                );
                return ProcessOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        if step.step_status != StepStatus::Pending {
            tracing::info!(
                step_id = %step.step_id,
                status = %step.step_status,
                "Step status is not pending, skipping",
            );
            return ProcessOutcome::Skipped {
                status: step.step_status,
            };
        }

        let step_ref = step.step_ref();
        tracing::info!(
            step_id = %step_ref.step_id,
            task_id = %step_ref.task_id,
            "Processing step",
        );
        self.log(TaskLog::info(&step_ref.task_id, STARTING_MESSAGE)).await;

        let prompt = character_prompt(&step.input_query);
        if is_blank(&prompt) {
            tracing::warn!(step_id = %step_ref.step_id, "Step has no character data");
            self.log(
                TaskLog::error(&step_ref.task_id, NO_CHARACTER_DATA).with_status(StepStatus::Failed),
            )
            .await;
            self.report_failure(&step_ref, NO_CHARACTER_DATA).await;
            return ProcessOutcome::Rejected;
        }

        match self.generate_and_publish(&step_ref, &prompt).await {
            Ok(url) => {
                tracing::info!(
                    step_id = %step_ref.step_id,
                    task_id = %step_ref.task_id,
                    url = %url,
                    "Step completed",
                );
                self.log(
                    TaskLog::info(&step_ref.task_id, COMPLETED_MESSAGE)
                        .with_status(StepStatus::Completed),
                )
                .await;
                ProcessOutcome::Completed { url }
            }
            Err(e) => {
                let reason = format!("Error during image generation: {e}");
                tracing::error!(
                    step_id = %step_ref.step_id,
                    task_id = %step_ref.task_id,
                    error = %e,
                    "Step failed",
                );
                self.log(TaskLog::error(&step_ref.task_id, &reason).with_status(StepStatus::Failed))
                    .await;
                self.report_failure(&step_ref, &reason).await;
                ProcessOutcome::Failed { reason }
            }
        }
    }

    async fn generate_and_publish(
        &self,
        step: &StepRef,
        prompt: &str,
    ) -> Result<String, ProcessError> {
        let artifact = self
            .generator
            .generate(prompt)
            .await?
            .renamed(artifact_file_name(&step.task_id));

        let url = self.uploader.upload(&artifact).await?;

        self.steps
            .update_step(step, &StepUpdate::completed(step, vec![url.clone()]))
            .await?;
        Ok(url)
    }

    async fn report_failure(&self, step: &StepRef, reason: &str) {
        if let Err(e) = self
            .steps
            .update_step(step, &StepUpdate::failed(step, reason))
            .await
        {
            tracing::error!(step_id = %step.step_id, error = %e, "Failed to mark step as failed");
        }
    }

    /// Task logs are best effort.
    async fn log(&self, log: TaskLog) {
        let task_id = log.task_id.clone();
        if let Err(e) = self.logger.log_task(log).await {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to send task log");
        }
    }
}
