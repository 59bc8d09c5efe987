//! The live knowledge base shared by request handlers.
//!
//! Readers take an `Arc<KnowledgeBase>` snapshot and keep it for the whole
//! query, so a concurrent upload never changes records or embeddings under
//! them. Writers are serialized by a mutex and publish a new snapshot only
//! after the records were persisted and re-embedded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use askdoc_core::embedding::EmbeddingProvider;
use askdoc_core::models::{Chunk, ChunkDraft};
use askdoc_core::store::{self, DocumentStore, KnowledgeBase};
use askdoc_core::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// [`DocumentStore`] backed by one pretty-printed JSON file.
///
/// Saves go through a sibling `.tmp` file and a rename, so a crash mid-write
/// leaves the previous content in place.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Value>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(format!("{}: {}", self.path.display(), e))),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::CorruptStore(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, value: &Value) -> Result<()> {
        write_json_atomic(&self.path, value).await
    }
}

/// Write `value` as pretty JSON via a temp file and rename, creating parent
/// directories as needed.
pub(crate) async fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(Error::storage)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(Error::storage)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::storage(format!("{}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::storage(format!("{}: {}", path.display(), e)))
}

/// Counts from one source replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replaced {
    pub removed: usize,
    pub added: usize,
}

/// Shared handle over the published [`KnowledgeBase`] snapshot.
pub struct KnowledgeBaseHandle {
    current: ArcSwap<KnowledgeBase>,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    write_lock: Mutex<()>,
}

impl KnowledgeBaseHandle {
    /// Load the persisted records and embed them.
    ///
    /// Malformed data is logged and the handle starts empty; the next
    /// mutation overwrites it. Embedding failures are returned.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let outcome = store::load(store.as_ref(), embedder.as_ref()).await?;
        if let Some(reason) = &outcome.corruption {
            tracing::error!(%reason, "knowledge base is malformed, starting empty");
        }
        tracing::info!(
            chunks = outcome.knowledge_base.len(),
            model = embedder.model_name(),
            "knowledge base ready"
        );

        Ok(Self {
            current: ArcSwap::from_pointee(outcome.knowledge_base),
            store,
            embedder,
            write_lock: Mutex::new(()),
        })
    }

    /// The currently published knowledge base.
    pub fn snapshot(&self) -> Arc<KnowledgeBase> {
        self.current.load_full()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Swap every chunk of `source` for `drafts`. New ids continue from the
    /// largest id present before the swap.
    pub async fn replace_source(&self, source: &str, drafts: Vec<ChunkDraft>) -> Result<Replaced> {
        self.mutate(|records| {
            let first_id = store::next_id(records);
            let removed = store::remove_by_source(records, source);
            let added = store::append_chunks(records, source, drafts, first_id);
            Replaced { removed, added }
        })
        .await
    }

    /// Remove every chunk of `source`. Returns how many were removed.
    pub async fn remove_source(&self, source: &str) -> Result<usize> {
        self.mutate(|records| store::remove_by_source(records, source))
            .await
    }

    /// Persist and republish an earlier snapshot, discarding every change
    /// made since it was taken.
    pub async fn restore(&self, previous: Arc<KnowledgeBase>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        store::persist(self.store.as_ref(), previous.chunks()).await?;
        tracing::info!(chunks = previous.len(), "knowledge base restored");
        self.current.store(previous);
        Ok(())
    }

    async fn mutate<T>(&self, edit: impl FnOnce(&mut Vec<Chunk>) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let before = self.snapshot();
        let mut records = before.chunks().to_vec();
        let out = edit(&mut records);

        store::persist(self.store.as_ref(), &records).await?;
        match store::load(self.store.as_ref(), self.embedder.as_ref()).await {
            Ok(outcome) => {
                tracing::info!(chunks = outcome.knowledge_base.len(), "knowledge base updated");
                self.current.store(Arc::new(outcome.knowledge_base));
                Ok(out)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rebuild failed, restoring previous records");
                if let Err(restore) = store::persist(self.store.as_ref(), before.chunks()).await {
                    tracing::error!(error = %restore, "failed to restore previous records");
                }
                Err(e)
            }
        }
    }
}
