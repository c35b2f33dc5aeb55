//! Wires the subscription task to the step processor.
//!
//! The subscription task owns the payments socket and feeds step
//! notifications into an unbounded channel. The worker loop drains that
//! channel and processes one step at a time. Cancelling the token stops
//! the subscription; a step already in flight runs to completion.

use std::sync::Arc;
use std::time::Duration;

use imagen_comfyui::{ComfyUIApi, ComfyUIApiError, ComfyUIGenerator, GenerationParams};
use imagen_core::StepRef;
use imagen_payments::{
    PaymentsApi, PaymentsApiError, PaymentsSocketClient, Subscription, SubscriptionOptions,
};
use imagen_pinning::{PinataClient, PinningError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::processor::{ProcessOutcome, TaskProcessor};

/// How long to wait for the subscription task after the worker loop ends.
const SUBSCRIPTION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while building the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to build payments client: {0}")]
    Payments(#[from] PaymentsApiError),

    #[error("Failed to build ComfyUI client: {0}")]
    ComfyUI(#[from] ComfyUIApiError),

    #[error("Failed to build Pinata client: {0}")]
    Pinning(#[from] PinningError),
}

/// Run the agent until `cancel` is triggered.
pub async fn run(config: WorkerConfig, cancel: CancellationToken) -> Result<(), RuntimeError> {
    let steps = PaymentsApi::new(
        &config.endpoints.backend_url,
        &config.nvm_api_key,
        config.http_timeout,
    )?;

    let comfyui = ComfyUIApi::new(&config.comfyui_url, config.http_timeout)?;
    let generator = ComfyUIGenerator::new(
        comfyui,
        GenerationParams::default().with_checkpoint(&config.sd_checkpoint),
    )
    .with_timeout(config.generation_timeout);

    let pinata = PinataClient::new(&config.pinata_api_key, &config.pinata_api_secret)?
        .with_gateway(&config.pinata_gateway);

    let socket = PaymentsSocketClient::new(&config.endpoints.websocket_url, &config.nvm_api_key);
    let subscription = Subscription::spawn(
        socket,
        SubscriptionOptions::for_agent(&config.agent_did),
        cancel.clone(),
    );
    let (mut notifications, task_logs, subscription_handle) = subscription.into_parts();

    let processor = TaskProcessor::new(
        Arc::new(steps),
        Arc::new(task_logs),
        Arc::new(generator),
        Arc::new(pinata),
    );

    tracing::info!(did = %config.agent_did, "Worker ready, waiting for step notifications");
    let processed = run_worker(&processor, &mut notifications, &cancel).await;
    tracing::info!(processed, "Worker loop stopped");

    // The loop also ends when the subscription exits on its own.
    cancel.cancel();
    if tokio::time::timeout(SUBSCRIPTION_SHUTDOWN_TIMEOUT, subscription_handle)
        .await
        .is_err()
    {
        tracing::warn!("Subscription task did not stop in time");
    }
    Ok(())
}

/// Process notifications sequentially until cancelled or the channel
/// closes. Returns the number of notifications handled.
pub async fn run_worker(
    processor: &TaskProcessor,
    notifications: &mut mpsc::UnboundedReceiver<StepRef>,
    cancel: &CancellationToken,
) -> usize {
    let mut processed = 0usize;

    loop {
        let notification = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = notifications.recv() => match next {
                Some(step) => step,
                None => break,
            },
        };

        let outcome = processor.process(&notification).await;
        processed += 1;
        match &outcome {
            ProcessOutcome::Completed { url } => {
                tracing::info!(step_id = %notification.step_id, url = %url, "Notification handled");
            }
            other => {
                tracing::debug!(step_id = %notification.step_id, outcome = ?other, "Notification handled");
            }
        }
    }

    processed
}
