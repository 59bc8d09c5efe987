//! Core data models shared by ingestion, storage, and retrieval.

use serde::{Deserialize, Serialize};

/// A contiguous word window of one source document, the unit of retrieval.
///
/// This is also the persisted record shape: the knowledge base file is an
/// ordered JSON array of these. `id` and `source` default when absent so
/// that hand-edited or legacy files still load; `text` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<String>,
}

/// A chunk produced by the chunker, before it is assigned an id and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub text: String,
    pub page_info: Option<String>,
}

/// Administrative record of one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLogEntry {
    pub filename: String,
    pub original_filename: String,
    pub chunks: usize,
    pub file_size: u64,
    pub uploaded_at: String,
    pub pages_processed: usize,
}
