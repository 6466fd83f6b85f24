use anyhow::{Context, Result};
use dotenvy::dotenv;
use job_sync::{ExtensionCredentials, SignatureScheme};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_path: PathBuf,
    pub credentials: ExtensionCredentials,
    pub backend_url: Option<String>,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub signature_scheme: SignatureScheme,
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let secret = env::var("TRACKRUIT_EXTENSION_SECRET")
            .context("TRACKRUIT_EXTENSION_SECRET must be set")?;
        let version =
            env::var("TRACKRUIT_EXTENSION_VERSION").unwrap_or_else(|_| "1.0.0".to_string());
        let credentials = ExtensionCredentials::new(secret, version)
            .context("TRACKRUIT_EXTENSION_SECRET must not be empty")?;

        Ok(Self {
            data_path: env::var("TRACKRUIT_DATA_PATH")
                .unwrap_or_else(|_| "./trackruit-data.json".to_string())
                .into(),
            credentials,
            backend_url: env::var("TRACKRUIT_BACKEND_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            sync_interval: Duration::from_secs(
                env::var("TRACKRUIT_SYNC_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("TRACKRUIT_SYNC_INTERVAL_SECS must be a valid number")?,
            ),
            request_timeout: Duration::from_secs(
                env::var("TRACKRUIT_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .context("TRACKRUIT_REQUEST_TIMEOUT_SECS must be a valid number")?,
            ),
            signature_scheme: env::var("TRACKRUIT_SIGNATURE_SCHEME")
                .unwrap_or_else(|_| "hmac-sha256".to_string())
                .parse()
                .context("TRACKRUIT_SIGNATURE_SCHEME must be hmac-sha256 or sha256")?,
        })
    }
}
