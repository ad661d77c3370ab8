//! Qdrant vector store over its REST API

use crate::error::OrchestrationError;
use crate::rag::{ChunkRecord, Passage, VectorStore};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    ready_collections: RwLock<HashSet<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Value,
}

impl QdrantStore {
    /// Build the client and check the server answers.
    pub async fn connect(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                OrchestrationError::VectorStoreError(format!("Failed to build HTTP client: {}", e))
            })?;

        let store = Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            ready_collections: RwLock::new(HashSet::new()),
        };

        let response = store.send(store.request(Method::GET, "/collections")).await?;
        if !response.status().is_success() {
            return Err(OrchestrationError::VectorStoreError(format!(
                "Qdrant at {} is not ready: {}",
                store.base_url,
                response.status()
            )));
        }

        info!(url = %store.base_url, "Connected to Qdrant");
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| OrchestrationError::VectorStoreError(format!("Qdrant request failed: {}", e)))
    }

    async fn fail(context: &str, response: reqwest::Response) -> OrchestrationError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        OrchestrationError::VectorStoreError(format!("{} ({}): {}", context, status, body))
    }

    /// Create the collection with cosine distance unless it already exists.
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        if self.ready_collections.read().await.contains(collection) {
            return Ok(());
        }

        let path = format!("/collections/{}", collection);
        let response = self.send(self.request(Method::GET, &path)).await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                debug!(collection, dimension, "Creating Qdrant collection");
                let response = self
                    .send(self.request(Method::PUT, &path).json(&json!({
                        "vectors": {"size": dimension, "distance": "Cosine"}
                    })))
                    .await?;
                if !response.status().is_success() {
                    return Err(Self::fail("Creating collection failed", response).await);
                }
            }
            _ => return Err(Self::fail("Reading collection failed", response).await),
        }

        self.ready_collections
            .write()
            .await
            .insert(collection.to_string());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>) -> Result<()> {
        let Some(dimension) = records.first().map(|r| r.vector.len()) else {
            return Ok(());
        };
        self.ensure_collection(collection, dimension).await?;

        let points: Vec<Value> = records
            .into_iter()
            .map(|record| {
                json!({
                    "id": record.id.to_string(),
                    "vector": record.vector,
                    "payload": {
                        "text": record.text,
                        "source": record.source,
                        "chunk_index": record.chunk_index,
                    }
                })
            })
            .collect();

        let path = format!("/collections/{}/points?wait=true", collection);
        let response = self
            .send(self.request(Method::PUT, &path).json(&json!({ "points": points })))
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail("Upserting points failed", response).await);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<Passage>> {
        let path = format!("/collections/{}/points/search", collection);
        let response = self
            .send(self.request(Method::POST, &path).json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            })))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::fail("Search failed", response).await);
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            OrchestrationError::VectorStoreError(format!("Invalid Qdrant search response: {}", e))
        })?;

        Ok(parsed
            .result
            .into_iter()
            .map(|point| Passage {
                text: point.payload["text"].as_str().unwrap_or_default().to_string(),
                source: point.payload["source"].as_str().unwrap_or_default().to_string(),
                chunk_index: point.payload["chunk_index"].as_u64().unwrap_or(0) as usize,
                score: point.score,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.ready_collections.write().await.clear();
        info!(url = %self.base_url, "Qdrant store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn ready_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"collections": []}})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_upsert_creates_collection() {
        let server = ready_server().await;
        Mock::given(method("GET"))
            .and(path("/collections/filings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/filings"))
            .and(body_partial_json(json!({"vectors": {"size": 2, "distance": "Cosine"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/filings/points"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"status": "completed"}})))
            .expect(2)
            .mount(&server)
            .await;

        let store = QdrantStore::connect(server.uri(), Some("secret".to_string()))
            .await
            .unwrap();
        let record = || ChunkRecord {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            text: "Revenue rose".to_string(),
            source: "10k.txt".to_string(),
            chunk_index: 0,
        };

        store.upsert("filings", vec![record()]).await.unwrap();
        store.upsert("filings", vec![record()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_maps_payloads() {
        let server = ready_server().await;
        Mock::given(method("POST"))
            .and(path("/collections/filings/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"id": "x", "score": 0.92, "payload": {"text": "Revenue rose", "source": "10k.txt", "chunk_index": 3}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/missing/points/search"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = QdrantStore::connect(server.uri(), None).await.unwrap();

        let hits = store.query("filings", &[0.1, 0.2], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Revenue rose");
        assert_eq!(hits[0].chunk_index, 3);

        assert!(store.query("missing", &[0.1, 0.2], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_fails_when_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = QdrantStore::connect(server.uri(), None).await.err().unwrap();
        assert!(matches!(err, OrchestrationError::VectorStoreError(_)));
    }
}
