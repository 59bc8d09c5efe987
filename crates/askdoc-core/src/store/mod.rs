//! Knowledge base and its persistence boundary.
//!
//! The [`DocumentStore`] trait abstracts where the chunk records live (a
//! JSON file in the application, memory in tests). [`KnowledgeBase`] is
//! the in-memory view the retriever works on: the ordered chunk records
//! plus an index-aligned [`EmbeddingMatrix`] that is always derived,
//! never stored.
//!
//! # Lifecycle
//!
//! Every mutation follows the same path: copy the records, edit them with
//! [`remove_by_source`] / [`append_chunks`], [`persist`] them, then
//! [`load`] to re-read and re-embed. The application publishes the fresh
//! [`KnowledgeBase`] only once the whole sequence has succeeded.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::embedding::{check_dims, EmbeddingMatrix, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkDraft};

/// Durable load/save of the raw chunk collection.
///
/// Implementations store an opaque JSON value; shape validation happens in
/// [`parse_records`] so every backend tolerates and reports the same
/// malformed inputs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the persisted value. `Ok(None)` means nothing has been saved
    /// yet; content that is not valid JSON is [`Error::CorruptStore`].
    async fn load(&self) -> Result<Option<Value>>;

    /// Overwrite the persisted value.
    async fn save(&self, value: &Value) -> Result<()>;
}

/// Validate a persisted value and decode it into chunk records.
///
/// Accepts an array of records, or an array whose first element is itself
/// the array of records (a legacy wrapper). Every record must be an object
/// with a non-empty `text`.
pub fn parse_records(value: Value) -> Result<Vec<Chunk>> {
    let items = match value {
        Value::Array(mut items) => match items.first_mut() {
            Some(Value::Array(inner)) => std::mem::take(inner),
            _ => items,
        },
        other => {
            return Err(Error::CorruptStore(format!(
                "expected an array of records, found {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let chunk: Chunk = serde_json::from_value(item)
                .map_err(|e| Error::CorruptStore(format!("record {}: {}", i, e)))?;
            if chunk.text.trim().is_empty() {
                return Err(Error::CorruptStore(format!("record {} has empty text", i)));
            }
            Ok(chunk)
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Chunk records plus their aligned unit-vector embeddings.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    chunks: Vec<Chunk>,
    embeddings: Option<EmbeddingMatrix>,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Embed every chunk in one batch and build the aligned matrix.
    ///
    /// An empty chunk list yields a knowledge base with no matrix and makes
    /// no provider call.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        if chunks.is_empty() {
            return Ok(Self::empty());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::provider(
                embedder.model_name(),
                format!(
                    "returned {} embeddings for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            ));
        }

        check_dims(embedder, &vectors)?;

        let matrix = EmbeddingMatrix::from_rows(vectors)?;
        Ok(Self {
            chunks,
            embeddings: Some(matrix),
        })
    }

    /// Assemble a knowledge base from precomputed vectors. Rows are
    /// normalized; the row count must match the chunk count.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.is_empty() {
            return Ok(Self::empty());
        }
        if vectors.len() != chunks.len() {
            return Err(Error::validation(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        Ok(Self {
            chunks,
            embeddings: Some(EmbeddingMatrix::from_rows(vectors)?),
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn embeddings(&self) -> Option<&EmbeddingMatrix> {
        self.embeddings.as_ref()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks belonging to `source`.
    pub fn count_source(&self, source: &str) -> usize {
        self.chunks.iter().filter(|c| c.source == source).count()
    }
}

/// Result of [`load`]: the rebuilt knowledge base, and the reason the
/// persisted data was discarded if it was malformed.
#[derive(Debug)]
pub struct LoadOutcome {
    pub knowledge_base: KnowledgeBase,
    pub corruption: Option<String>,
}

/// Read the persisted records and rebuild the embedding matrix.
///
/// Malformed data is reported in [`LoadOutcome::corruption`] and treated
/// as an empty knowledge base. Storage and embedding failures propagate.
pub async fn load(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
) -> Result<LoadOutcome> {
    let parsed = match store.load().await {
        Ok(None) => Ok(Vec::new()),
        Ok(Some(value)) => parse_records(value),
        Err(e @ Error::CorruptStore(_)) => Err(e),
        Err(e) => return Err(e),
    };
    let (chunks, corruption) = match parsed {
        Ok(chunks) => (chunks, None),
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed knowledge base");
            (Vec::new(), Some(e.to_string()))
        }
    };

    let knowledge_base = KnowledgeBase::build(chunks, embedder).await?;
    tracing::debug!(chunks = knowledge_base.len(), "knowledge base loaded");

    Ok(LoadOutcome {
        knowledge_base,
        corruption,
    })
}

/// Serialize the chunk sequence and overwrite the store's content.
pub async fn persist(store: &dyn DocumentStore, chunks: &[Chunk]) -> Result<()> {
    let value = serde_json::to_value(chunks).map_err(Error::storage)?;
    store.save(&value).await
}

/// Remove every chunk whose source is `source`, keeping the order of the
/// rest. Returns the number removed.
pub fn remove_by_source(chunks: &mut Vec<Chunk>, source: &str) -> usize {
    let before = chunks.len();
    chunks.retain(|c| c.source != source);
    before - chunks.len()
}

/// The id the next appended chunk receives: one past the largest id present.
pub fn next_id(chunks: &[Chunk]) -> u64 {
    chunks.iter().map(|c| c.id + 1).max().unwrap_or(0)
}

/// Append drafts for `source` with consecutive ids starting at `first_id`.
/// Returns the number appended.
pub fn append_chunks(
    chunks: &mut Vec<Chunk>,
    source: &str,
    drafts: Vec<ChunkDraft>,
    first_id: u64,
) -> usize {
    let count = drafts.len();
    chunks.extend(drafts.into_iter().zip(first_id..).map(|(draft, id)| Chunk {
        id,
        source: source.to_string(),
        text: draft.text,
        page_info: draft.page_info,
    }));
    count
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDocumentStore;
    use super::*;
    use crate::testing::KeywordEmbedder;
    use serde_json::json;

    fn chunk(id: u64, source: &str, text: &str) -> Chunk {
        Chunk {
            id,
            source: source.to_string(),
            text: text.to_string(),
            page_info: None,
        }
    }

    fn draft(text: &str) -> ChunkDraft {
        ChunkDraft {
            text: text.to_string(),
            page_info: Some("Page 1".to_string()),
        }
    }

    #[test]
    fn test_parse_plain_array() {
        let chunks = parse_records(json!([
            {"id": 0, "source": "a.pdf", "text": "hello"},
            {"id": 1, "source": "a.pdf", "text": "world", "page_info": "Page 2"}
        ]))
        .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].page_info.as_deref(), Some("Page 2"));
    }

    #[test]
    fn test_parse_unwraps_nested_array() {
        let chunks = parse_records(json!([[{"text": "only text"}]])).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].source, "");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for bad in [
            json!({"text": "not an array"}),
            json!(["just a string"]),
            json!([{"source": "missing text"}]),
            json!([{"text": "   "}]),
            json!([{"text": "ok"}, 42]),
        ] {
            let err = parse_records(bad.clone()).unwrap_err();
            assert!(matches!(err, Error::CorruptStore(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_remove_by_source_keeps_order() {
        let mut chunks = vec![
            chunk(0, "a.pdf", "one"),
            chunk(1, "b.pdf", "two"),
            chunk(2, "a.pdf", "three"),
            chunk(3, "c.pdf", "four"),
        ];
        assert_eq!(remove_by_source(&mut chunks, "a.pdf"), 2);
        let ids: Vec<u64> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(remove_by_source(&mut chunks, "missing.pdf"), 0);
    }

    #[test]
    fn test_append_assigns_consecutive_ids() {
        let mut chunks = vec![chunk(0, "a.pdf", "one"), chunk(7, "a.pdf", "two")];
        let first = next_id(&chunks);
        assert_eq!(first, 8);
        let added = append_chunks(&mut chunks, "b.pdf", vec![draft("x"), draft("y")], first);
        assert_eq!(added, 2);
        assert_eq!(chunks[2].id, 8);
        assert_eq!(chunks[3].id, 9);
        assert_eq!(chunks[3].source, "b.pdf");
        assert_eq!(chunks[3].page_info.as_deref(), Some("Page 1"));
    }

    #[test]
    fn test_next_id_empty() {
        assert_eq!(next_id(&[]), 0);
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let store = MemoryDocumentStore::new();
        let outcome = load(&store, &KeywordEmbedder::new()).await.unwrap();
        assert!(outcome.knowledge_base.is_empty());
        assert!(outcome.knowledge_base.embeddings().is_none());
        assert!(outcome.corruption.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_reports_and_empties() {
        let store = MemoryDocumentStore::with_value(json!({"broken": true}));
        let outcome = load(&store, &KeywordEmbedder::new()).await.unwrap();
        assert!(outcome.knowledge_base.is_empty());
        assert!(outcome.corruption.is_some());
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let store = MemoryDocumentStore::new();
        let embedder = KeywordEmbedder::new();
        let chunks = vec![
            chunk(0, "a.pdf", "Working hours are 9:30 AM to 6:30 PM."),
            chunk(1, "b.pdf", "Our office is located in Bangalore."),
        ];

        persist(&store, &chunks).await.unwrap();
        let kb = load(&store, &embedder).await.unwrap().knowledge_base;

        assert_eq!(kb.chunks(), chunks.as_slice());
        let matrix = kb.embeddings().unwrap();
        assert_eq!(matrix.len(), 2);
        for i in 0..matrix.len() {
            let row = matrix.row(i);
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_build_rejects_count_mismatch() {
        let result = KnowledgeBase::from_parts(vec![chunk(0, "a", "text")], vec![]);
        assert!(result.is_err());
    }

    /// Declares more dimensions than the vectors it returns.
    struct MisreportingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MisreportingEmbedder {
        fn model_name(&self) -> &str {
            "misreporting"
        }

        fn dims(&self) -> usize {
            KeywordEmbedder::new().dims() + 1
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            KeywordEmbedder::new().embed(texts).await
        }
    }

    #[tokio::test]
    async fn test_build_rejects_wrong_dimension() {
        let err = KnowledgeBase::build(vec![chunk(0, "a", "working hours")], &MisreportingEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }), "{}", err);
    }
}
