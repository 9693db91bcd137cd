//! Chat client configuration
//!
//! Loaded from `client.toml` in the same locations the relay searches for
//! its own config file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use chatrelay_server::config::default_config_paths;

use crate::consumer::RetryPolicy;
use crate::error::{ClientError, ClientResult};
use crate::session::DEFAULT_GREETING;

/// Name of the client's config file in the default search locations
pub const CLIENT_CONFIG_FILE_NAME: &str = "client.toml";

/// Chat client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Relay chat endpoint
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Total attempts per send when rate limited
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between rate-limited attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Assistant message opening every new chat
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Signed-in user ID
    #[serde(default = "default_user")]
    pub user: String,
    /// Where chats are stored (default: ~/.chatrelay/chats)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            greeting: default_greeting(),
            user: default_user(),
            data_dir: None,
        }
    }
}

fn default_relay_url() -> String {
    "http://127.0.0.1:3000/api/chat".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_user() -> String {
    "local".to_string()
}

impl ClientConfig {
    /// Load from an explicit path or the default locations, falling back
    /// to defaults when no file exists
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for candidate in default_config_paths(CLIENT_CONFIG_FILE_NAME) {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::debug!("No client config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn relay_url(&self) -> ClientResult<Url> {
        Url::parse(&self.relay_url).map_err(|e| {
            ClientError::Config(format!("Invalid relay URL '{}': {e}", self.relay_url))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".chatrelay").join("chats"))
                .unwrap_or_else(|| PathBuf::from(".chatrelay/chats"))
        })
    }
}
