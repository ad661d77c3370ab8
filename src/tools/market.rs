//! Market data tools backed by the Financial Datasets API

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::tools::{require_str, Tool};
use crate::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct FinancialDatasetsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FinancialDatasetsClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
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
        Self::new(
            config.financial_datasets_base_url.clone(),
            config.financial_datasets_api_key.clone(),
        )
    }

    /// `GET {base}{path}?ticker=...` and return the decoded body.
    async fn get_snapshot(&self, path: &str, ticker: &str) -> Result<Value> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OrchestrationError::ToolError("FINANCIAL_DATASETS_API_KEY is not configured".to_string())
        })?;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ticker, "Financial Datasets request");

        let response = self
            .client
            .get(url)
            .query(&[("ticker", ticker)])
            .header("X-API-KEY", api_key)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!(
                    "Financial Datasets request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::ToolError(format!(
                "Financial Datasets returned {} for {} ({}): {}",
                status, path, ticker, body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))
    }
}

/// Upper-case and validate a ticker symbol such as `brk.b` or `rds-a`.
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_uppercase();

    let valid = !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if !valid {
        return Err(OrchestrationError::InvalidToolInput(format!(
            "Invalid ticker symbol '{}'",
            raw
        )));
    }

    Ok(ticker)
}

fn ticker_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ticker": {"type": "string", "description": "Stock ticker symbol, e.g. AAPL"}
        },
        "required": ["ticker"]
    })
}

pub struct StockPriceTool {
    api: FinancialDatasetsClient,
}

impl StockPriceTool {
    pub fn new(api: FinancialDatasetsClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "stock_price_retrieval"
    }

    fn description(&self) -> &'static str {
        "Retrieve the latest stock price for a ticker symbol"
    }

    fn parameters(&self) -> Value {
        ticker_parameters()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ticker = normalize_ticker(&require_str(input, "ticker")?)?;
        let body = self.api.get_snapshot("/prices/snapshot", &ticker).await?;

        let price = body
            .get("snapshot")
            .and_then(|s| s.get("price"))
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                OrchestrationError::ToolError(format!("No price data found for {}", ticker))
            })?;

        Ok(ToolOutput::ok(json!({
            "ticker": ticker,
            "price": price,
        })))
    }
}

pub struct FinancialMetricsTool {
    api: FinancialDatasetsClient,
}

impl FinancialMetricsTool {
    pub fn new(api: FinancialDatasetsClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Tool for FinancialMetricsTool {
    fn name(&self) -> &'static str {
        "stock_financial_metrics_retrieval"
    }

    fn description(&self) -> &'static str {
        "Retrieve a snapshot of financial metrics (valuation, margins, growth) for a ticker symbol"
    }

    fn parameters(&self) -> Value {
        ticker_parameters()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ticker = normalize_ticker(&require_str(input, "ticker")?)?;
        let body = self
            .api
            .get_snapshot("/financial-metrics/snapshot", &ticker)
            .await?;

        let metrics = body
            .get("snapshot")
            .filter(|s| s.is_object())
            .cloned()
            .ok_or_else(|| {
                OrchestrationError::ToolError(format!(
                    "No financial metrics found for {}",
                    ticker
                ))
            })?;

        Ok(ToolOutput::ok(json!({
            "ticker": ticker,
            "metrics": metrics,
        })))
    }
}
