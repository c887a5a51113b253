//! Hand-written fakes for the collaborator seams, shared across module
//! tests. Everything is in-memory and deterministic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::content_store::ContentStore;
use crate::error::{ProviderError, StorageError};
use crate::llm_client::{ChatMessage, ChatModel, EmbeddingModel};
use crate::tools::Replier;
use crate::vector_index::{ScoredId, VectorIndex};

/// Chat model that plays back a fixed script, one response per call, and
/// counts how often it was asked.
pub struct ScriptedChatModel {
    script: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new(script: Vec<&str>) -> Self {
        Self {
            script: script.into_iter().map(str::to_string).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .get(n)
            .cloned()
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Embedder producing a tiny vector derived from the text length. Stable per
/// input, cheap, and never fails.
pub struct FakeEmbedder;

impl FakeEmbedder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![text.len() as f32, 1.0, 0.0])
    }
}

/// In-memory blob store handing out sequential cids and counting downloads,
/// so tests can prove whether a read was served from cache.
pub struct FakeContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeContentStore {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn upload(&self, bytes: &[u8], _path: &str) -> Result<String, StorageError> {
        let cid = format!("cid-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.blobs
            .lock()
            .unwrap()
            .insert(cid.clone(), bytes.to_vec());
        Ok(cid)
    }

    async fn download(&self, cid: &str) -> Result<Vec<u8>, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(cid.to_string()))
    }
}

/// In-memory vector index. By default a query returns upserted ids in
/// insertion order; a test can pin an explicit ranking per namespace
/// instead. Upserts can be made to fail to exercise degraded saves.
pub struct FakeVectorIndex {
    upserted: Mutex<HashMap<String, Vec<String>>>,
    rankings: Mutex<HashMap<String, Vec<ScoredId>>>,
    fail_upserts: AtomicBool,
}

impl FakeVectorIndex {
    pub fn new() -> Self {
        Self {
            upserted: Mutex::new(HashMap::new()),
            rankings: Mutex::new(HashMap::new()),
            fail_upserts: AtomicBool::new(false),
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_ranking(&self, namespace: &str, ranking: Vec<(&str, f32)>) {
        self.rankings.lock().unwrap().insert(
            namespace.to_string(),
            ranking
                .into_iter()
                .map(|(id, score)| ScoredId {
                    id: id.to_string(),
                    score,
                })
                .collect(),
        );
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn upsert(
        &self,
        namespace: &str,
        id: &str,
        _vector: &[f32],
    ) -> Result<(), ProviderError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                body: "index unavailable".to_string(),
            });
        }
        let mut upserted = self.upserted.lock().unwrap();
        let ids = upserted.entry(namespace.to_string()).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredId>, ProviderError> {
        if let Some(ranking) = self.rankings.lock().unwrap().get(namespace) {
            return Ok(ranking.iter().take(limit).cloned().collect());
        }
        Ok(self
            .upserted
            .lock()
            .unwrap()
            .get(namespace)
            .map(|ids| {
                ids.iter()
                    .take(limit)
                    .enumerate()
                    .map(|(i, id)| ScoredId {
                        id: id.clone(),
                        score: i as f32 * 0.1,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Reply channel that records every delivered message; can fail on demand to
/// exercise tool-failure paths.
pub struct CapturingReplier {
    messages: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl CapturingReplier {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Replier for CapturingReplier {
    async fn reply(&self, text: &str) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("delivery channel down");
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
