//! Deployment environments of the payments API.
//!
//! `NVM_ENVIRONMENT` selects one of the known deployments; explicit
//! backend/WebSocket URLs may override the table (e.g. for a local
//! stack behind a tunnel).

/// Known payments API deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Staging,
    Testing,
    Arbitrum,
    Base,
    BaseSepolia,
}

/// Errors from environment selection.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Unknown environment '{0}'. Must be one of: local, staging, testing, arbitrum, base, base_sepolia")]
    Unknown(String),
}

/// Resolved HTTP and WebSocket base URLs for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// HTTP base URL, without a trailing slash.
    pub backend_url: String,
    /// WebSocket base URL, without a trailing slash.
    pub websocket_url: String,
}

impl Environment {
    /// Parse an environment name.
    ///
    /// Accepts snake_case names as well as the camelCase `app`-prefixed
    /// aliases used by the hosted app (`appStaging`, `appArbitrum`, ...).
    pub fn from_name(name: &str) -> Result<Self, EnvironmentError> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized.strip_prefix("app").unwrap_or(&normalized);

        match normalized {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "testing" => Ok(Environment::Testing),
            "arbitrum" | "production" => Ok(Environment::Arbitrum),
            "base" => Ok(Environment::Base),
            "basesepolia" => Ok(Environment::BaseSepolia),
            _ => Err(EnvironmentError::Unknown(name.to_string())),
        }
    }

    /// HTTP base URL of the deployment.
    pub fn backend_url(self) -> &'static str {
        match self {
            Environment::Local => "http://localhost:3001",
            Environment::Staging => "https://one-backend.staging.nevermined.app",
            Environment::Testing => "https://one-backend.testing.nevermined.app",
            Environment::Arbitrum => "https://one-backend.arbitrum.nevermined.app",
            Environment::Base => "https://one-backend.base.nevermined.app",
            Environment::BaseSepolia => "https://one-backend.base-sepolia.nevermined.app",
        }
    }

    /// WebSocket base URL of the deployment.
    pub fn websocket_url(self) -> &'static str {
        match self {
            Environment::Local => "ws://localhost:3001",
            Environment::Staging => "wss://one-backend.staging.nevermined.app",
            Environment::Testing => "wss://one-backend.testing.nevermined.app",
            Environment::Arbitrum => "wss://one-backend.arbitrum.nevermined.app",
            Environment::Base => "wss://one-backend.base.nevermined.app",
            Environment::BaseSepolia => "wss://one-backend.base-sepolia.nevermined.app",
        }
    }

    /// Resolve endpoints, applying optional overrides.
    pub fn endpoints(self, backend_override: Option<&str>, websocket_override: Option<&str>) -> Endpoints {
        let backend_url = backend_override.unwrap_or(self.backend_url());
        let websocket_url = websocket_override.unwrap_or(self.websocket_url());
        Endpoints {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            websocket_url: websocket_url.trim_end_matches('/').to_string(),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
