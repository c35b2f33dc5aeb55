//! `imagen-worker` -- image generator agent.
//!
//! Subscribes to step notifications for its agent DID on the Nevermined
//! payments socket, generates an image for every Pending step on a
//! ComfyUI instance, pins it on IPFS through Pinata and reports the step
//! as Completed with the public URL.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use imagen_worker::config::{LogFormat, WorkerConfig};
use imagen_worker::runtime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "imagen_worker=info,imagen_payments=info,imagen_comfyui=info,imagen_pinning=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    init_tracing(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or(LogFormat::Text),
    );

    let config = config.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        did = %config.agent_did,
        environment = ?config.environment,
        backend_url = %config.endpoints.backend_url,
        websocket_url = %config.endpoints.websocket_url,
        comfyui_url = %config.comfyui_url,
        checkpoint = %config.sd_checkpoint,
        "Starting imagen-worker",
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, finishing current step");
            cancel.cancel();
        }
    });

    if let Err(e) = runtime::run(config, cancel).await {
        tracing::error!(error = %e, "Worker failed to start");
        std::process::exit(1);
    }

    tracing::info!("imagen-worker stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
