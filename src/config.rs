//! Environment configuration
//!
//! Binaries call `dotenv::dotenv().ok()` before [`AgentConfig::from_env`].

use crate::error::OrchestrationError;
use crate::gemini;
use crate::tools::search::DEFAULT_TAVILY_BASE_URL;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FINANCIAL_DATASETS_BASE_URL: &str = "https://api.financialdatasets.ai";
pub const DEFAULT_RAG_COLLECTION: &str = "financial-docs";
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_embedding_model: String,
    pub gemini_base_url: String,
    pub financial_datasets_api_key: Option<String>,
    pub financial_datasets_base_url: String,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
    /// `None` selects the in-process vector store.
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub rag_collection: String,
    pub max_iterations: u32,
    pub collaborator_timeout: Option<Duration>,
    pub max_tool_rounds: u32,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            gemini_embedding_model: gemini::DEFAULT_EMBEDDING_MODEL.to_string(),
            gemini_base_url: gemini::DEFAULT_BASE_URL.to_string(),
            financial_datasets_api_key: None,
            financial_datasets_base_url: DEFAULT_FINANCIAL_DATASETS_BASE_URL.to_string(),
            tavily_api_key: None,
            tavily_base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
            qdrant_url: None,
            qdrant_api_key: None,
            rag_collection: DEFAULT_RAG_COLLECTION.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collaborator_timeout: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            port: DEFAULT_PORT,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let timeout_secs: Option<u64> = parse_opt(&get, "AGENT_COLLABORATOR_TIMEOUT_SECS")?;
        let port = match parse_opt(&get, "PORT")? {
            Some(port) => port,
            None => parse_opt(&get, "API_PORT")?.unwrap_or(defaults.port),
        };

        let config = Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_embedding_model: get("GEMINI_EMBEDDING_MODEL")
                .unwrap_or(defaults.gemini_embedding_model),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            financial_datasets_api_key: get("FINANCIAL_DATASETS_API_KEY"),
            financial_datasets_base_url: get("FINANCIAL_DATASETS_BASE_URL")
                .unwrap_or(defaults.financial_datasets_base_url),
            tavily_api_key: get("TAVILY_API_KEY"),
            tavily_base_url: get("TAVILY_BASE_URL").unwrap_or(defaults.tavily_base_url),
            qdrant_url: get("QDRANT_URL"),
            qdrant_api_key: get("QDRANT_API_KEY"),
            rag_collection: get("RAG_COLLECTION").unwrap_or(defaults.rag_collection),
            max_iterations: parse_opt(&get, "AGENT_MAX_ITERATIONS")?
                .unwrap_or(defaults.max_iterations),
            collaborator_timeout: timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_tool_rounds: parse_opt(&get, "AGENT_MAX_TOOL_ROUNDS")?
                .unwrap_or(defaults.max_tool_rounds),
            port,
        };

        if config.max_iterations == 0 {
            return Err(OrchestrationError::ConfigError(
                "AGENT_MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }
        if config.max_tool_rounds == 0 {
            return Err(OrchestrationError::ConfigError(
                "AGENT_MAX_TOOL_ROUNDS must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| {
                OrchestrationError::ConfigError(format!("{}='{}' is invalid: {}", key, raw, e))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AgentConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.max_tool_rounds, 8);
        assert_eq!(config.port, 8080);
        assert_eq!(config.rag_collection, "financial-docs");
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert!(config.qdrant_url.is_none());
        assert!(config.collaborator_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "g-key"),
            ("API_PORT", "9090"),
            ("AGENT_COLLABORATOR_TIMEOUT_SECS", "30"),
            ("QDRANT_URL", "http://localhost:6333"),
            ("TAVILY_API_KEY", "  "),
        ])
        .unwrap();

        assert_eq!(config.gemini_api_key, "g-key");
        assert_eq!(config.port, 9090);
        assert_eq!(config.collaborator_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.qdrant_url.as_deref(), Some("http://localhost:6333"));
        assert!(config.tavily_api_key.is_none());
    }

    #[test]
    fn test_invalid_numbers() {
        let err = config_from(&[("AGENT_MAX_ITERATIONS", "fifty")]).unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(ref m) if m.contains("AGENT_MAX_ITERATIONS")));

        assert!(config_from(&[("PORT", "99999")]).is_err());
        assert!(config_from(&[("AGENT_MAX_ITERATIONS", "0")]).is_err());
    }
}
