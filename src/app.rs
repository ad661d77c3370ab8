//! Application context
//!
//! Owns the process-wide resources: the vector store client (opened once,
//! closed at shutdown), the audit log and the wired-up orchestrator.

use crate::agent::{Orchestrator, OrchestratorConfig};
use crate::audit::TurnAuditLog;
use crate::config::AgentConfig;
use crate::execution::ReactStepExecutor;
use crate::gemini::GeminiClient;
use crate::notify::TurnSinks;
use crate::planner::GeminiPlanner;
use crate::rag::{
    DocumentIngestor, Embedder, InMemoryVectorStore, QdrantStore, RecursiveTextSplitter,
    Retriever, VectorStore,
};
use crate::tools::create_default_registry;
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub struct AppContext {
    pub config: AgentConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub ingestor: Arc<DocumentIngestor>,
    pub store: Arc<dyn VectorStore>,
    pub audit_log: Arc<TurnAuditLog>,
}

impl AppContext {
    /// Connect the vector store and build the Gemini-backed collaborators.
    pub async fn open(config: AgentConfig) -> Result<Self> {
        let gemini = GeminiClient::new(config.gemini_api_key.clone())?
            .with_base_url(config.gemini_base_url.clone())
            .with_model(config.gemini_model.clone())
            .with_embedding_model(config.gemini_embedding_model.clone());

        let store: Arc<dyn VectorStore> = match &config.qdrant_url {
            Some(url) => {
                Arc::new(QdrantStore::connect(url.clone(), config.qdrant_api_key.clone()).await?)
            }
            None => {
                info!("QDRANT_URL not set; using the in-memory vector store");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let embedder: Arc<dyn Embedder> = Arc::new(gemini.clone());
        Self::assemble(config, gemini, embedder, store)
    }

    pub fn assemble(
        config: AgentConfig,
        gemini: GeminiClient,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let retriever = Arc::new(Retriever::new(
            embedder.clone(),
            store.clone(),
            config.rag_collection.clone(),
        ));
        let registry = Arc::new(create_default_registry(&config, Some(retriever))?);
        let tool_names = registry.list().into_iter().map(str::to_string).collect();

        let planner = Arc::new(GeminiPlanner::new(gemini.clone(), tool_names));
        let executor = Arc::new(ReactStepExecutor::new(
            gemini,
            registry,
            config.max_tool_rounds,
        ));
        let audit_log = Arc::new(TurnAuditLog::new());

        let orchestrator = Orchestrator::new(
            planner.clone(),
            executor,
            planner,
            TurnSinks::tracing(),
        )
        .with_config(OrchestratorConfig::from(&config))
        .with_audit_log(audit_log.clone());

        let ingestor = DocumentIngestor::new(RecursiveTextSplitter::default(), embedder, store.clone());

        info!(
            model = %config.gemini_model,
            collection = %config.rag_collection,
            max_iterations = config.max_iterations,
            "Application context ready"
        );

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            ingestor: Arc::new(ingestor),
            store,
            audit_log,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        info!("Application context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_and_close() {
        let context = AppContext::open(AgentConfig::default()).await.unwrap();
        assert_eq!(context.orchestrator.config().max_iterations, 50);

        let report = context
            .ingestor
            .ingest("financial-docs", b"", "empty.txt")
            .await;
        assert!(report.is_err());

        context.close().await.unwrap();
    }
}
