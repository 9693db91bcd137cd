use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ChatRelayError, Result};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;

/// Name of the relay's config file in the default search locations
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration structure for the relay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream completion API configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// System instruction configuration
    #[serde(default)]
    pub prompt: PromptConfig,
}

impl Config {
    /// Load configuration from an explicit path, or search the default
    /// locations (`~/.chatrelay/`, the platform config dir, the working
    /// directory) and fall back to defaults when nothing is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for candidate in default_config_paths(CONFIG_FILE_NAME) {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatRelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ChatRelayError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Candidate locations for a config file, in priority order
pub fn default_config_paths(file_name: &str) -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".chatrelay").join(file_name)),
        dirs::config_dir().map(|c| c.join("chatrelay").join(file_name)),
        Some(PathBuf::from(file_name)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Upstream completion API configuration, fixed at deployment time
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Request streaming responses from the upstream
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Connect timeout in seconds; responses themselves are never timed out
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            stream: default_stream(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_model() -> String {
    "meta-llama/llama-3.1-8b-instruct:free".to_string()
}

fn default_stream() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// System instruction configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptConfig {
    /// Inline system prompt, overrides the built-in one
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// File to read the system prompt from; takes precedence over `system_prompt`
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
}

impl PromptConfig {
    /// Resolve the system prompt text to prepend to every upstream payload
    pub fn resolve(&self) -> Result<String> {
        if let Some(ref path) = self.system_prompt_file {
            let prompt = std::fs::read_to_string(path).map_err(|e| {
                ChatRelayError::Config(format!(
                    "Failed to read system prompt file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            return non_empty_prompt(prompt);
        }

        match self.system_prompt {
            Some(ref prompt) => non_empty_prompt(prompt.clone()),
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

fn non_empty_prompt(prompt: String) -> Result<String> {
    if prompt.trim().is_empty() {
        Err(ChatRelayError::Config(
            "System prompt must not be empty".to_string(),
        ))
    } else {
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.upstream.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.upstream.api_key_env, "OPENROUTER_API_KEY");
        assert!(config.upstream.stream);
        assert!(config.prompt.system_prompt.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [upstream]
            model = "openai/gpt-4o-mini"
            stream = false
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.model, "openai/gpt-4o-mini");
        assert!(!config.upstream.stream);
        assert_eq!(config.upstream.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.server.listen_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[server\nlisten_addr = 1").unwrap_err();
        assert!(matches!(err, ChatRelayError::Config(_)));
    }

    #[test]
    fn test_prompt_resolution_order() {
        assert_eq!(
            PromptConfig::default().resolve().unwrap(),
            DEFAULT_SYSTEM_PROMPT
        );

        let inline = PromptConfig {
            system_prompt: Some("Be brief.".to_string()),
            system_prompt_file: None,
        };
        assert_eq!(inline.resolve().unwrap(), "Be brief.");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "From a file.").unwrap();
        let from_file = PromptConfig {
            system_prompt: Some("Be brief.".to_string()),
            system_prompt_file: Some(file.path().to_path_buf()),
        };
        assert_eq!(from_file.resolve().unwrap(), "From a file.");
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let blank = PromptConfig {
            system_prompt: Some("   ".to_string()),
            system_prompt_file: None,
        };
        assert!(blank.resolve().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/chatrelay.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
