//! In-process vector store (cosine similarity)

use crate::error::OrchestrationError;
use crate::rag::{ChunkRecord, Passage, VectorStore};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();

        let dimension = stored
            .first()
            .or(records.first())
            .map(|r| r.vector.len());
        for record in records {
            if let Some(dim) = dimension {
                if record.vector.len() != dim {
                    return Err(OrchestrationError::VectorStoreError(format!(
                        "Vector dimension {} does not match collection '{}' ({})",
                        record.vector.len(),
                        collection,
                        dim
                    )));
                }
            }

            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }

        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<Passage>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<Passage> = stored
            .iter()
            .map(|record| Passage {
                text: record.text.clone(),
                source: record.source.clone(),
                chunk_index: record.chunk_index,
                score: cosine_similarity(vector, &record.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn close(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }
}
