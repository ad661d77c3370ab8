//! Similarity search over ingested documents

use crate::error::OrchestrationError;
use crate::models::{ToolInput, ToolOutput};
use crate::rag::Retriever;
use crate::tools::{require_str, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const TOP_K: usize = 5;

pub struct DocumentRetrievalTool {
    retriever: Option<Arc<Retriever>>,
}

impl DocumentRetrievalTool {
    pub fn new(retriever: Option<Arc<Retriever>>) -> Self {
        Self { retriever }
    }
}

#[async_trait::async_trait]
impl Tool for DocumentRetrievalTool {
    fn name(&self) -> &'static str {
        "retrieve_from_documents"
    }

    fn description(&self) -> &'static str {
        "Retrieve the most relevant passages from documents the user has uploaded"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look for in the documents"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let retriever = self.retriever.as_ref().ok_or_else(|| {
            OrchestrationError::ToolError("Document retrieval is not configured".to_string())
        })?;
        let query = require_str(input, "query")?;

        let passages = retriever.query(&query, TOP_K).await?;

        Ok(ToolOutput::ok(json!({
            "collection": retriever.collection(),
            "passages": passages,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::memory::InMemoryVectorStore;
    use crate::rag::testing::KeywordEmbedder;
    use crate::rag::{DocumentIngestor, RecursiveTextSplitter};

    #[tokio::test]
    async fn test_retrieves_ingested_passages() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(KeywordEmbedder);
        let ingestor = DocumentIngestor::new(
            RecursiveTextSplitter::default(),
            embedder.clone(),
            store.clone(),
        );
        ingestor
            .ingest(
                "filings",
                b"Revenue grew 8% to $383B.\n\nDividends were raised.",
                "10k.txt",
            )
            .await
            .unwrap();

        let retriever = Arc::new(Retriever::new(embedder, store, "filings"));
        let tool = DocumentRetrievalTool::new(Some(retriever));

        let output = tool
            .execute(&ToolInput {
                tool_name: "retrieve_from_documents".to_string(),
                parameters: json!({"query": "revenue"}),
            })
            .await
            .unwrap();

        assert_eq!(output.data["collection"], "filings");
        let passages = output.data["passages"].as_array().unwrap();
        assert!(!passages.is_empty());
        assert!(passages[0]["text"].as_str().unwrap().contains("Revenue"));
    }
}
