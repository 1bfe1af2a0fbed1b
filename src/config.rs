//! Node configuration.
//!
//! Loaded from a TOML file; every section has defaults so a partial file
//! (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::policy::{is_safe_tool_name, DEFAULT_ALLOWED_TOOLS, DEFAULT_USER_AGENT};
use crate::search::{DEFAULT_MODEL, EMBEDDING_DIM};

/// Default environment variable holding the remote embedding API key.
pub const DEFAULT_API_KEY_ENV: &str = "SYNAPSE_EMBEDDING_API_KEY";

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynapseConfig {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub policy: PolicyConfig,
    pub api: ApiConfig,
}

/// Semantic store persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// RocksDB directory.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/synapse_memory"),
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local ONNX model through fastembed.
    #[default]
    Local,
    /// Remote Gemini `embedContent` API.
    Gemini,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimensions: usize,
    /// Base URL for the remote provider.
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: DEFAULT_MODEL.to_string(),
            dimensions: EMBEDDING_DIM,
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl EmbeddingConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Policy gate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// User agent matched against robots.txt groups.
    pub user_agent: String,
    /// Tool names permitted for MCP invocations.
    pub allowed_tools: Vec<String>,
    /// Relay prefix for robots.txt fetches, e.g. `https://api.allorigins.win/raw?url=`.
    pub relay_url: Option<String>,
    /// Robots.txt cache lifetime. Zero disables caching.
    pub robots_cache_ttl_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect(),
            relay_url: None,
            robots_cache_ttl_secs: 0,
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8080".to_string(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl SynapseConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: SynapseConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw =
            toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Reject configurations the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.policy.user_agent.trim().is_empty() {
            return Err(Error::Config("policy.user_agent must not be empty".into()));
        }
        if let Some(bad) = self
            .policy
            .allowed_tools
            .iter()
            .find(|t| !is_safe_tool_name(t))
        {
            return Err(Error::Config(format!(
                "policy.allowed_tools entry '{}' is not a valid tool name",
                bad
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::Config("embedding.dimensions must be > 0".into()));
        }
        Ok(())
    }
}
