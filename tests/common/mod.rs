#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use askdoc::config::Config;
use askdoc::extract::TextExtractor;
use askdoc::ingest::Ingestor;
use askdoc::knowledge::{JsonFileStore, KnowledgeBaseHandle};
use askdoc::server::AppState;
use askdoc::upload_log::UploadLog;
use askdoc_core::generation::GenerationProvider;
use askdoc_core::testing::KeywordEmbedder;
use askdoc_core::{Error, Result};
use tempfile::TempDir;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub const HANDBOOK: &str = "[Page 1] Working hours are 9:30 AM to 6:30 PM, Monday to Friday.";
pub const BENEFITS: &str = "[Page 1] The leave policy grants 18 days of annual leave. \
    [Page 2] Expense reimbursement is processed monthly.";

/// Extractor that treats the uploaded bytes as a key into canned texts.
///
/// Unknown keys extract to nothing, like a scanned PDF with no text layer.
pub struct CannedExtractor {
    texts: HashMap<Vec<u8>, String>,
}

impl CannedExtractor {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            texts: entries
                .iter()
                .map(|(key, text)| (key.as_bytes().to_vec(), text.to_string()))
                .collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(&[("handbook", HANDBOOK), ("benefits", BENEFITS)])
    }
}

impl TextExtractor for CannedExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        if bytes.starts_with(b"corrupt") {
            return Err(Error::Extraction("invalid PDF header".to_string()));
        }
        Ok(self.texts.get(bytes).cloned().unwrap_or_default())
    }
}

/// Config rooted in a temp directory with small chunks and an admin token.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.server.admin_token = Some(ADMIN_TOKEN.to_string());
    config.storage.knowledge_base = dir.path().join("data").join("knowledge_base.json");
    config.storage.upload_log = dir.path().join("data").join("upload_logs.json");
    config.storage.upload_dir = dir.path().join("data").join("uploads");
    config.chunking.min_words = 0;
    config.upload.max_bytes = 4096;
    config
}

/// Application state over a JSON store in `dir`, the keyword embedder and
/// the canned extractor.
pub async fn test_state(
    dir: &TempDir,
    generator: Option<Arc<dyn GenerationProvider>>,
) -> AppState {
    let config = test_config(dir);
    state_with(config, generator).await
}

pub async fn state_with(config: Config, generator: Option<Arc<dyn GenerationProvider>>) -> AppState {
    let store = Arc::new(JsonFileStore::new(&config.storage.knowledge_base));
    let knowledge = Arc::new(
        KnowledgeBaseHandle::open(store, Arc::new(KeywordEmbedder::new()))
            .await
            .unwrap(),
    );
    let log = Arc::new(UploadLog::new(
        &config.storage.upload_log,
        &config.storage.upload_dir,
    ));
    let ingestor = Arc::new(Ingestor::new(
        knowledge.clone(),
        log.clone(),
        Arc::new(CannedExtractor::standard()),
        config.chunking.options(),
        config.upload.max_bytes,
    ));
    AppState::new(config, knowledge, ingestor, log, generator)
}

/// Multipart body with a single `file` field.
pub fn multipart_body(boundary: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
