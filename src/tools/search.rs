//! Web search through the Tavily API

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::tools::{require_str, Tool};
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";
const MAX_RESULTS: usize = 5;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

pub struct TavilySearchTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TavilySearchTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Self::new(config.tavily_base_url.clone(), config.tavily_api_key.clone())
    }
}

#[async_trait::async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &'static str {
        "tavily_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for recent news, market trends and macro information"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OrchestrationError::ToolError("TAVILY_API_KEY is not configured".to_string())
        })?;
        let query = require_str(input, "query")?;

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                api_key,
                query: &query,
                max_results: MAX_RESULTS,
            })
            .send()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::ToolError(format!(
                "Tavily returned {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid Tavily response: {}", e)))?;

        let results: Vec<SearchHit> = parsed.results.into_iter().take(MAX_RESULTS).collect();

        Ok(ToolOutput::ok(json!({
            "query": query,
            "results": results,
        })))
    }
}
