//! Configuration management for prsync.

use std::fs;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable overriding `github.app_id`.
pub const ENV_APP_ID: &str = "PRSYNC_GITHUB_APP_ID";
/// Environment variable overriding `github.api_url`.
pub const ENV_API_URL: &str = "PRSYNC_GITHUB_API_URL";
/// Environment variable overriding `github.private_key_secret`.
pub const ENV_PRIVATE_KEY_SECRET: &str = "PRSYNC_PRIVATE_KEY_SECRET";
/// Environment variable overriding `server.listen`.
pub const ENV_LISTEN: &str = "PRSYNC_LISTEN";
/// Environment variable holding the App private key PEM itself.
pub const ENV_PRIVATE_KEY: &str = "PRSYNC_GITHUB_PRIVATE_KEY";

/// prsync configuration, usually loaded from `prsync.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// GitHub App settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Run behaviour.
    #[serde(default)]
    pub sync: SyncConfig,

    /// HTTP entry point.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object store access.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load config from a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    ///
    /// Secrets that only ever come from the environment, the private key PEM
    /// and the storage bearer token, are picked up here as well.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(app_id) = get(ENV_APP_ID) {
            self.github.app_id = Some(app_id);
        }
        if let Some(api_url) = get(ENV_API_URL) {
            self.github.api_url = Some(api_url);
        }
        if let Some(secret) = get(ENV_PRIVATE_KEY_SECRET) {
            self.github.private_key_secret = Some(secret);
        }
        if let Some(listen) = get(ENV_LISTEN) {
            self.server.listen = listen;
        }
        if let Some(pem) = get(ENV_PRIVATE_KEY) {
            self.github.private_key = Some(SecretString::from(pem));
        }
        if let Some(token) = get(&self.storage.access_token_env) {
            self.storage.access_token = Some(SecretString::from(token));
        }
    }

    /// Check that a run can be attempted with this configuration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first unusable setting.
    pub fn validate(&self) -> Result<()> {
        if self.github.app_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            return Err(Error::Config(format!(
                "github.app_id is not set (config file or {ENV_APP_ID})"
            )));
        }
        if self.sync.deadline_secs == 0 {
            return Err(Error::Config("sync.deadline_secs must be positive".into()));
        }
        if self.sync.max_auth_attempts == 0 {
            return Err(Error::Config(
                "sync.max_auth_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// GitHub App settings.
#[derive(Debug, Deserialize, Default)]
pub struct GitHubConfig {
    /// Numeric App id, kept as a string as GitHub prints it.
    pub app_id: Option<String>,

    /// Custom API URL for GitHub Enterprise.
    pub api_url: Option<String>,

    /// Where the App private key lives (`gs://bucket/key.pem` or `file:///path`).
    pub private_key_secret: Option<String>,

    /// PEM given directly through [`ENV_PRIVATE_KEY`]. Takes precedence over
    /// `private_key_secret`.
    #[serde(skip)]
    pub private_key: Option<SecretString>,
}

/// Run behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Overall deadline for a single run.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Attempts at credential acquisition when failures are transient.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,

    /// First backoff between credential attempts; doubles each retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl SyncConfig {
    /// Deadline as a duration.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Initial retry backoff as a duration.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_auth_attempts: default_max_auth_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

const fn default_deadline_secs() -> u64 {
    3600
}

const fn default_max_auth_attempts() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    500
}

/// HTTP entry point settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

/// Object store settings.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the GCS JSON API.
    #[serde(default = "default_gcs_api_url")]
    pub gcs_api_url: String,

    /// Name of the environment variable holding a GCS bearer token. When it
    /// is unset the metadata server is asked instead.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Bearer token read from `access_token_env`.
    #[serde(skip)]
    pub access_token: Option<SecretString>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gcs_api_url: default_gcs_api_url(),
            access_token_env: default_access_token_env(),
            access_token: None,
        }
    }
}

fn default_gcs_api_url() -> String {
    "https://storage.googleapis.com".into()
}

fn default_access_token_env() -> String {
    "GCS_ACCESS_TOKEN".into()
}
