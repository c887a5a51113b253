//! Content-addressed blob storage boundary.
//!
//! Uploads return a stable CID; re-downloading a CID always yields the same
//! bytes. Downloading an unknown CID is a `NotFound`, not a transport fault.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StorageError;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Upload opaque bytes under a derived filename; returns the CID.
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String, StorageError>;

    /// Download the bytes stored under `cid`.
    async fn download(&self, cid: &str) -> Result<Vec<u8>, StorageError>;
}

/// HTTP client for a drive-style object store: blobs are posted as base64
/// JSON bodies and retrieved by CID.
#[derive(Clone)]
pub struct HttpContentStore {
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    path: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    cid: String,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    data: String,
}

impl HttpContentStore {
    pub fn new(api_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_url,
            api_key,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", key))
            }
            _ => req,
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<String, StorageError> {
        let url = format!("{}/objects", self.api_url);
        let request = UploadRequest {
            path,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        };

        let response = self
            .authorize(self.client.post(&url).json(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.cid)
    }

    async fn download(&self, cid: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!("{}/objects/{}", self.api_url, cid);

        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(cid.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        let parsed: DownloadResponse = response.json().await?;
        base64::engine::general_purpose::STANDARD
            .decode(parsed.data.as_bytes())
            .map_err(|e| StorageError::Malformed(format!("invalid base64 blob body: {}", e)))
    }
}
