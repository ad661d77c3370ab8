//! Document ingestion and retrieval
//!
//! Ingestion is an entry point separate from the conversational turn. A
//! failed ingest is reported to its caller and never touches a running turn.
//!
//! ```text
//! bytes -> UTF-8 text -> RecursiveTextSplitter -> Embedder -> VectorStore
//! query -> Embedder -> VectorStore::query -> Vec<Passage>
//! ```

use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod memory;
pub mod qdrant;
pub mod splitter;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;
pub use splitter::RecursiveTextSplitter;

/// Stored chunk with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
}

/// Query hit, best first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Top `k` passages by similarity. Unknown collections yield no passages.
    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<Passage>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, same order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        GeminiClient::embed(self, texts).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub filename: String,
    pub chunks: usize,
}

pub struct DocumentIngestor {
    splitter: RecursiveTextSplitter,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl DocumentIngestor {
    pub fn new(
        splitter: RecursiveTextSplitter,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            splitter,
            embedder,
            store,
        }
    }

    /// Split, embed and store one document.
    pub async fn ingest(
        &self,
        collection: &str,
        bytes: &[u8],
        filename: &str,
    ) -> Result<IngestReport> {
        if collection.trim().is_empty() {
            return Err(OrchestrationError::IngestionError(
                "Collection name is empty".to_string(),
            ));
        }

        let text = extract_text(filename, bytes).await?;
        let chunks = self.splitter.split(&text);
        if chunks.is_empty() {
            return Err(OrchestrationError::IngestionError(format!(
                "No text chunks produced from '{}'",
                filename
            )));
        }

        let vectors = self.embedder.embed(&chunks).await.map_err(|e| {
            OrchestrationError::IngestionError(format!("Embedding '{}' failed: {}", filename, e))
        })?;

        if vectors.len() != chunks.len() {
            return Err(OrchestrationError::IngestionError(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, vector))| ChunkRecord {
                id: Uuid::new_v4(),
                vector,
                text,
                source: filename.to_string(),
                chunk_index,
            })
            .collect();
        let count = records.len();

        self.store.upsert(collection, records).await.map_err(|e| {
            warn!(filename, collection, error = %e, "Vector store upsert failed");
            OrchestrationError::IngestionError(format!("Storing '{}' failed: {}", filename, e))
        })?;

        info!(filename, collection, chunks = count, "Document ingested");

        Ok(IngestReport {
            collection: collection.to_string(),
            filename: filename.to_string(),
            chunks: count,
        })
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

fn is_pdf(filename: &str, bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC) || filename.to_lowercase().ends_with(".pdf")
}

/// PDF text layer when the upload is a PDF, UTF-8 text otherwise.
async fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    let text = if is_pdf(filename, bytes) {
        let owned = bytes.to_vec();
        // the parser is CPU-bound and may panic on malformed input
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
            .await
            .map_err(|e| {
                OrchestrationError::IngestionError(format!(
                    "PDF extraction for '{}' aborted: {}",
                    filename, e
                ))
            })?
            .map_err(|e| {
                OrchestrationError::IngestionError(format!(
                    "'{}' is not a readable PDF: {}",
                    filename, e
                ))
            })?
    } else {
        std::str::from_utf8(bytes)
            .map_err(|_| {
                OrchestrationError::IngestionError(format!(
                    "'{}' is neither a PDF nor UTF-8 text",
                    filename
                ))
            })?
            .to_string()
    };

    if text.trim().is_empty() {
        return Err(OrchestrationError::IngestionError(format!(
            "'{}' contains no text",
            filename
        )));
    }

    Ok(text)
}

/// Query side of a single collection
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            OrchestrationError::VectorStoreError("Embedder returned no query vector".to_string())
        })?;

        self.store.query(&self.collection, &vector, k).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::KeywordEmbedder;
    use super::*;

    fn ingestor(store: Arc<InMemoryVectorStore>) -> DocumentIngestor {
        DocumentIngestor::new(
            RecursiveTextSplitter::new(40, 10).unwrap(),
            Arc::new(KeywordEmbedder),
            store,
        )
    }

    #[tokio::test]
    async fn test_ingest_and_retrieve() {
        let store = Arc::new(InMemoryVectorStore::new());
        let report = ingestor(store.clone())
            .ingest(
                "filings",
                b"Revenue rose to $383B this year.\n\nDebt was refinanced at lower rates.\n\nDividend raised by 4%.",
                "report.txt",
            )
            .await
            .unwrap();

        assert_eq!(report.collection, "filings");
        assert_eq!(report.filename, "report.txt");
        assert_eq!(report.chunks, 3);

        let retriever = Retriever::new(Arc::new(KeywordEmbedder), store, "filings");
        let passages = retriever.query("debt levels", 2).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert!(passages[0].text.starts_with("Debt"));
        assert_eq!(passages[0].source, "report.txt");
        assert_eq!(passages[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = Arc::new(InMemoryVectorStore::new());
        ingestor(store.clone())
            .ingest("alpha", b"Margin expanded.", "a.txt")
            .await
            .unwrap();

        let retriever = Retriever::new(Arc::new(KeywordEmbedder), store, "beta");
        assert!(retriever.query("margin", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_pdf() {
        let store = Arc::new(InMemoryVectorStore::new());
        let pdf = testing::single_page_pdf("Dividend raised by 4 percent");

        let report = ingestor(store.clone())
            .ingest("filings", &pdf, "q3-filing.pdf")
            .await
            .unwrap();
        assert_eq!(report.filename, "q3-filing.pdf");
        assert!(report.chunks >= 1);

        let retriever = Retriever::new(Arc::new(KeywordEmbedder), store, "filings");
        let passages = retriever.query("dividend", 1).await.unwrap();
        assert!(passages[0].text.contains("Dividend raised"));
        assert_eq!(passages[0].source, "q3-filing.pdf");
    }

    #[tokio::test]
    async fn test_rejects_binary_and_empty() {
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = ingestor(store);

        let err = ingestor
            .ingest("docs", &[0x25, 0x50, 0xff, 0xfe], "scan.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::IngestionError(_)));

        let err = ingestor
            .ingest("docs", &[0x00, 0xff, 0xfe], "blob.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::IngestionError(_)));

        let err = ingestor.ingest("docs", b"  \n ", "blank.txt").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::IngestionError(_)));
    }
}
