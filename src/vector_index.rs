//! Per-user nearest-neighbor search boundary.
//!
//! Each user gets a namespace (one collection per user on a Chroma-style
//! server). Query scores are distances: smaller means more similar, and the
//! server returns hits already ranked ascending. Querying a namespace with
//! no entries yields an empty list, never an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        vector: &[f32],
    ) -> Result<(), ProviderError>;

    /// Up to `limit` nearest ids with distances, most similar first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredId>, ProviderError>;
}

/// HTTP client for a Chroma-compatible REST index. Collections are created
/// lazily per namespace and their ids memoized for the process lifetime.
pub struct HttpVectorIndex {
    api_url: String,
    client: reqwest::Client,
    collections: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    distances: Option<Vec<Vec<f32>>>,
}

impl HttpVectorIndex {
    pub fn new(api_url: String, timeout: Duration) -> Self {
        Self {
            api_url,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            collections: Mutex::new(HashMap::new()),
        }
    }

    async fn collection_id(&self, namespace: &str) -> Result<String, ProviderError> {
        {
            let collections = self.collections.lock().await;
            if let Some(id) = collections.get(namespace) {
                return Ok(id.clone());
            }
        }

        let url = format!("{}/api/v1/collections", self.api_url);
        let body = serde_json::json!({ "name": namespace, "get_or_create": true });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let parsed: CollectionResponse = response.json().await?;
        self.collections
            .lock()
            .await
            .insert(namespace.to_string(), parsed.id.clone());
        Ok(parsed.id)
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        vector: &[f32],
    ) -> Result<(), ProviderError> {
        let collection = self.collection_id(namespace).await?;
        let url = format!("{}/api/v1/collections/{}/upsert", self.api_url, collection);
        let body = serde_json::json!({
            "ids": [id],
            "embeddings": [vector],
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredId>, ProviderError> {
        let collection = self.collection_id(namespace).await?;
        let url = format!("{}/api/v1/collections/{}/query", self.api_url, collection);
        let body = serde_json::json!({
            "query_embeddings": [vector],
            "n_results": limit,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let parsed: QueryResponse = response.json().await?;
        let ids = match parsed.ids.into_iter().next() {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| ScoredId {
                id,
                score: distances.get(i).copied().unwrap_or(0.0),
            })
            .collect())
    }
}
