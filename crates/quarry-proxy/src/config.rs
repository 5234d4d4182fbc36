//! Proxy configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Proxy configuration, loaded from YAML with CLI overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream LLM settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Web-search backend settings
    #[serde(default)]
    pub search: SearchSettings,

    /// Pipeline execution settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Allow http/localhost upstreams (development only)
    #[serde(default)]
    pub development: bool,
}

/// Upstream LLM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Service API key; clients may override per-request with their own
    /// bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model driving the search decision
    #[serde(default = "default_agent_model")]
    pub agent_model: String,

    /// Model evaluating safeguard policies
    #[serde(default = "default_safeguard_model")]
    pub safeguard_model: String,
}

/// Web-search backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Full search endpoint URL
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Hard per-request deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request body cap in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            agent_model: default_agent_model(),
            safeguard_model: default_safeguard_model(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            search: SearchSettings::default(),
            pipeline: PipelineSettings::default(),
            development: false,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from file and apply CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(base_url) = &cli.llm_base_url {
            config.llm.base_url = base_url.clone();
        }
        if let Some(api_key) = &cli.llm_api_key {
            config.llm.api_key = Some(api_key.clone());
        }
        if let Some(endpoint) = &cli.search_endpoint {
            config.search.endpoint = endpoint.clone();
        }
        if let Some(api_key) = &cli.search_api_key {
            config.search.api_key = Some(api_key.clone());
        }
        if cli.development {
            config.development = true;
        }

        Ok(config)
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_agent_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_safeguard_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_body_bytes() -> usize {
    200 * 1024 * 1024
}
