use std::time::Duration;

use imagen_comfyui::workflow::DEFAULT_CHECKPOINT;
use imagen_payments::{Endpoints, Environment};
use imagen_pinning::DEFAULT_GATEWAY_TEMPLATE;

const DEFAULT_ENVIRONMENT: &str = "staging";
const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub nvm_api_key: String,
    pub environment: Environment,
    /// Agent DID; also the subscription room.
    pub agent_did: String,
    pub endpoints: Endpoints,
    pub pinata_api_key: String,
    pub pinata_api_secret: String,
    /// Gateway URL template containing `{CID}`.
    pub pinata_gateway: String,
    pub comfyui_url: String,
    pub sd_checkpoint: String,
    pub generation_timeout: Duration,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Required | Default                                   |
    /// |---------------------------|----------|-------------------------------------------|
    /// | `NVM_API_KEY`             | yes      | --                                        |
    /// | `AGENT_DID`               | yes      | --                                        |
    /// | `NVM_ENVIRONMENT`         | no       | `staging`                                 |
    /// | `NVM_BACKEND_URL`         | no       | per environment                           |
    /// | `NVM_WEBSOCKET_URL`       | no       | per environment                           |
    /// | `PINATA_API_KEY`          | yes      | --                                        |
    /// | `PINATA_API_SECRET`       | yes      | --                                        |
    /// | `PINATA_GATEWAY_URL`      | no       | `https://gateway.pinata.cloud/ipfs/{CID}` |
    /// | `COMFYUI_URL`             | no       | `http://127.0.0.1:8188`                   |
    /// | `SD_CHECKPOINT`           | no       | `analogMadness_v70.safetensors`           |
    /// | `GENERATION_TIMEOUT_SECS` | no       | `600`                                     |
    /// | `HTTP_TIMEOUT_SECS`       | no       | `30`                                      |
    /// | `LOG_FORMAT`              | no       | `text` (`json` for JSON lines)            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let nvm_api_key = required("NVM_API_KEY")?;
        let agent_did = required("AGENT_DID")?;
        let pinata_api_key = required("PINATA_API_KEY")?;
        let pinata_api_secret = required("PINATA_API_SECRET")?;

        let environment_name = get("NVM_ENVIRONMENT").unwrap_or_else(|| DEFAULT_ENVIRONMENT.into());
        let environment =
            Environment::from_name(&environment_name).map_err(|e| ConfigError::Invalid {
                var: "NVM_ENVIRONMENT",
                reason: e.to_string(),
            })?;
        let endpoints = environment.endpoints(
            get("NVM_BACKEND_URL").as_deref(),
            get("NVM_WEBSOCKET_URL").as_deref(),
        );

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected 'text' or 'json', got '{other}'"),
                })
            }
        };

        Ok(Self {
            nvm_api_key,
            environment,
            agent_did,
            endpoints,
            pinata_api_key,
            pinata_api_secret,
            pinata_gateway: get("PINATA_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_TEMPLATE.into()),
            comfyui_url: get("COMFYUI_URL").unwrap_or_else(|| DEFAULT_COMFYUI_URL.into()),
            sd_checkpoint: get("SD_CHECKPOINT").unwrap_or_else(|| DEFAULT_CHECKPOINT.into()),
            generation_timeout: secs(
                "GENERATION_TIMEOUT_SECS",
                get("GENERATION_TIMEOUT_SECS"),
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?,
            http_timeout: secs(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
            log_format,
        })
    }
}

fn secs(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".into(),
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
