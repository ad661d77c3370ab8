//! Tool trait and registry
//!
//! Tools are the step executor's hands: each one validates its own input and
//! reports failures as errors, which the executor hands back to the model.

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::gemini::FunctionDeclaration;
use crate::models::{ToolInput, ToolOutput};
use crate::rag::Retriever;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub mod calculator;
pub mod market;
pub mod retrieval;
pub mod search;

pub use calculator::CalculatorTool;
pub use market::{FinancialDatasetsClient, FinancialMetricsTool, StockPriceTool};
pub use retrieval::DocumentRetrievalTool;
pub use search::TavilySearchTool;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Function declarations advertised to the model, sorted by name
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, parameters: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| OrchestrationError::ToolNotFound(name.to_string()))?;

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters,
        };
        ensure_object_parameters(&input)?;

        debug!(tool = name, "Executing tool");
        tool.execute(&input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

/// Non-blank string argument
pub(crate) fn require_str(input: &ToolInput, key: &str) -> Result<String> {
    input
        .parameters
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!(
                "Expected '{}' in tool_input for {}",
                key, input.tool_name
            ))
        })
}

/// Create the default registry.
///
/// Every tool is registered even when its backing key is absent; such tools
/// fail at call time naming the missing setting.
pub fn create_default_registry(
    config: &AgentConfig,
    retriever: Option<Arc<Retriever>>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let market = FinancialDatasetsClient::from_config(config)?;

    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(StockPriceTool::new(market.clone())));
    registry.register(Arc::new(FinancialMetricsTool::new(market)));
    registry.register(Arc::new(TavilySearchTool::from_config(config)?));
    registry.register(Arc::new(DocumentRetrievalTool::new(retriever)));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_registry_names() {
        let registry = create_default_registry(&AgentConfig::default(), None).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                "calculator",
                "retrieve_from_documents",
                "stock_financial_metrics_retrieval",
                "stock_price_retrieval",
                "tavily_search",
            ]
        );

        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 5);
        assert_eq!(declarations[0].name, "calculator");
        assert_eq!(declarations[0].parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_execute_unknown_and_bad_input() {
        let registry = create_default_registry(&AgentConfig::default(), None).unwrap();

        let err = registry.execute("web_search", json!({})).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolNotFound(ref n) if n == "web_search"));

        let err = registry
            .execute("calculator", json!("1 + 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidToolInput(_)));

        let output = registry
            .execute("calculator", json!({"expression": "1 + 1"}))
            .await
            .unwrap();
        assert_eq!(output.data["result"], "2");
    }

    #[tokio::test]
    async fn test_unconfigured_tools_fail_with_tool_error() {
        let registry = create_default_registry(&AgentConfig::default(), None).unwrap();

        let err = registry
            .execute("stock_price_retrieval", json!({"ticker": "AAPL"}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolError(ref m) if m.contains("FINANCIAL_DATASETS_API_KEY")));

        let err = registry
            .execute("retrieve_from_documents", json!({"query": "revenue"}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolError(_)));
    }
}
