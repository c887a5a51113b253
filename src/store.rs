//! NoteStore: the caching, persistence, and retrieval layer for notes.
//!
//! Note content lives only in the content-addressed store; what we keep
//! locally is a per-user index of metadata (cid, title, tags, created-at)
//! persisted as a single JSON document, plus a bounded per-user read cache.
//! The cache is write-through on save, LRU-evicting at capacity, and treats
//! entries older than the max age as stale (refetch even though present).
//!
//! Similarity search embeds the query, asks the vector index for the
//! nearest cids, and resolves each cid to full content through the same
//! cache-aware path, fanning out under the bounded limiter — which keeps
//! result slots in ranking order, so scores stay aligned with notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::content_store::ContentStore;
use crate::error::{ProviderError, StorageError};
use crate::limiter;
use crate::llm_client::EmbeddingModel;
use crate::vector_index::VectorIndex;
use std::sync::Arc;

/// A stored note. Immutable once written; identified externally by its CID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub tags: Vec<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The persisted index entry: everything except the content itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMeta {
    pub cid: String,
    pub title: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a save. `index_degraded` means the note is durably stored but
/// the embedding/upsert step failed, so similarity search may not find it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedNote {
    pub cid: String,
    pub index_degraded: bool,
}

/// One similarity hit, score as returned by the index (smaller = closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNote {
    pub cid: String,
    pub score: f32,
    pub note: Note,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
}

/// Cache and fan-out tuning. Defaults match the production constants.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub cache_capacity: usize,
    pub cache_max_age: Duration,
    pub fetch_concurrency: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_max_age: Duration::from_secs(3600),
            fetch_concurrency: 4,
        }
    }
}

// ─── Persistent index ────────────────────────────────────────────────────────

/// userId → ordered NoteMeta list, stored as one JSON document. Loaded at
/// startup, flushed after every mutation. Append-only.
pub struct PersistentIndex {
    path: PathBuf,
    users: HashMap<i64, Vec<NoteMeta>>,
}

impl PersistentIndex {
    /// Load the document, or start empty when the file does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let users = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            users,
        })
    }

    fn flush(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = serde_json::to_vec_pretty(&self.users)?;
        fs::write(&self.path, doc)
    }

    fn append(&mut self, user_id: i64, meta: NoteMeta) -> std::io::Result<()> {
        self.users.entry(user_id).or_default().push(meta);
        self.flush()
    }

    fn notes_for(&self, user_id: i64) -> &[NoteMeta] {
        self.users.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn contains(&self, user_id: i64, cid: &str) -> bool {
        self.notes_for(user_id).iter().any(|m| m.cid == cid)
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

struct CacheEntry {
    content: String,
    last_accessed: Instant,
}

#[derive(Default)]
struct UserCache {
    entries: HashMap<String, CacheEntry>,
}

// ─── NoteStore ───────────────────────────────────────────────────────────────

pub struct NoteStore {
    content: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingModel>,
    vectors: Arc<dyn VectorIndex>,
    index: Mutex<PersistentIndex>,
    cache: Mutex<HashMap<i64, UserCache>>,
    settings: StoreSettings,
}

fn namespace(user_id: i64) -> String {
    format!("user_{}", user_id)
}

impl NoteStore {
    pub fn new(
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingModel>,
        vectors: Arc<dyn VectorIndex>,
        index: PersistentIndex,
        settings: StoreSettings,
    ) -> Self {
        Self {
            content,
            embedder,
            vectors,
            index: Mutex::new(index),
            cache: Mutex::new(HashMap::new()),
            settings,
        }
    }

    /// Store a new note: upload the content, record its metadata, cache it
    /// write-through, then embed and upsert into the user's vector
    /// namespace. An embedding/upsert failure does not roll back the write —
    /// the note is already durable — but is surfaced as `index_degraded`.
    pub async fn add_note(
        &self,
        user_id: i64,
        title: String,
        content: String,
        tags: Vec<String>,
    ) -> Result<SavedNote, StorageError> {
        let note = Note {
            title,
            tags,
            content,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&note)
            .map_err(|e| StorageError::Malformed(format!("note serialization failed: {}", e)))?;
        let path = format!("{}/{}.json", user_id, note.created_at.timestamp_millis());

        let cid = self.content.upload(&bytes, &path).await?;

        let meta = NoteMeta {
            cid: cid.clone(),
            title: note.title.clone(),
            tags: note.tags.clone(),
            created_at: note.created_at,
        };
        self.index.lock().await.append(user_id, meta)?;

        self.cache_put(user_id, &cid, String::from_utf8_lossy(&bytes).into_owned())
            .await;

        let index_degraded = match self.index_note(user_id, &cid, &note).await {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    cid = %cid,
                    "note saved but semantic indexing failed: {}",
                    e
                );
                true
            }
        };

        tracing::info!(user_id, cid = %cid, index_degraded, "note stored");
        Ok(SavedNote { cid, index_degraded })
    }

    async fn index_note(
        &self,
        user_id: i64,
        cid: &str,
        note: &Note,
    ) -> Result<(), ProviderError> {
        let vector = self.embedder.embed(&note.content).await?;
        self.vectors.upsert(&namespace(user_id), cid, &vector).await
    }

    /// Fetch a note, cache-first. Returns `None` when the cid is not in this
    /// user's index, the content store has no such cid, or the download
    /// fails — a missing search result, never a turn-aborting error.
    pub async fn get_note(&self, user_id: i64, cid: &str) -> Option<Note> {
        if !self.index.lock().await.contains(user_id, cid) {
            return None;
        }

        let text = self.fetch_with_cache(user_id, cid).await?;
        match serde_json::from_str(&text) {
            Ok(note) => Some(note),
            Err(e) => {
                tracing::warn!(user_id, cid, "stored note is not valid JSON: {}", e);
                None
            }
        }
    }

    /// All of a user's note metadata, in insertion order.
    pub async fn list_notes(&self, user_id: i64) -> Vec<NoteMeta> {
        self.index.lock().await.notes_for(user_id).to_vec()
    }

    /// Metadata for notes carrying `tag` (exact-match membership).
    pub async fn list_notes_by_tag(&self, user_id: i64, tag: &str) -> Vec<NoteMeta> {
        self.index
            .lock()
            .await
            .notes_for(user_id)
            .iter()
            .filter(|m| m.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }

    /// Rank the user's notes by semantic similarity to `query`.
    ///
    /// Results follow the index ranking, not fetch-completion order; notes
    /// whose content cannot be resolved are dropped from the result set
    /// without failing the search.
    pub async fn search_similar(
        &self,
        user_id: i64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredNote>, ProviderError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .vectors
            .query(&namespace(user_id), &vector, limit)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let resolved = limiter::run_bounded(self.settings.fetch_concurrency, hits, |hit| {
            async move {
                let note = self
                    .get_note(user_id, &hit.id)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("note '{}' could not be resolved", hit.id))?;
                Ok(ScoredNote {
                    cid: hit.id,
                    score: hit.score,
                    note,
                })
            }
        })
        .await;

        Ok(resolved.into_iter().flatten().collect())
    }

    /// Drop one user's cache, or everyone's.
    pub async fn clear_cache(&self, user_id: Option<i64>) {
        let mut cache = self.cache.lock().await;
        match user_id {
            Some(user_id) => {
                cache.remove(&user_id);
            }
            None => cache.clear(),
        }
    }

    pub async fn cache_stats(&self, user_id: i64) -> Option<CacheStats> {
        self.cache.lock().await.get(&user_id).map(|c| CacheStats {
            entries: c.entries.len(),
        })
    }

    // Cache-first content read. A fresh hit bumps its access time; a stale
    // entry is refetched from the content store even though still present,
    // and the refetch refreshes it.
    async fn fetch_with_cache(&self, user_id: i64, cid: &str) -> Option<String> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(user) = cache.get_mut(&user_id) {
                if let Some(entry) = user.entries.get_mut(cid) {
                    if entry.last_accessed.elapsed() < self.settings.cache_max_age {
                        entry.last_accessed = Instant::now();
                        return Some(entry.content.clone());
                    }
                    tracing::debug!(user_id, cid, "cache entry stale, refetching");
                }
            }
        }

        let bytes = match self.content.download(cid).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(user_id, cid, "content store has no such cid");
                return None;
            }
            Err(e) => {
                tracing::warn!(user_id, cid, "content download failed: {}", e);
                return None;
            }
        };

        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.cache_put(user_id, cid, text.clone()).await;
        Some(text)
    }

    // Insert or refresh a cache entry, evicting the least recently accessed
    // entry when a new cid would push the user over capacity.
    async fn cache_put(&self, user_id: i64, cid: &str, content: String) {
        let mut cache = self.cache.lock().await;
        let user = cache.entry(user_id).or_default();

        if !user.entries.contains_key(cid) && user.entries.len() >= self.settings.cache_capacity
        {
            let oldest = user
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(user_id, evicted = %oldest, "cache at capacity, evicting");
                user.entries.remove(&oldest);
            }
        }

        user.entries.insert(
            cid.to_string(),
            CacheEntry {
                content,
                last_accessed: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    async fn backdate_cache_entry(&self, user_id: i64, cid: &str, age: Duration) {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache
            .get_mut(&user_id)
            .and_then(|u| u.entries.get_mut(cid))
        {
            entry.last_accessed = Instant::now() - age;
        }
    }
}
