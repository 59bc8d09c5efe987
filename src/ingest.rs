//! Document ingestion and deletion.
//!
//! Upload flow: validate → extract → chunk → write a uniquely named
//! `.partial` file → (under the commit lock) move it into place → replace
//! the source's chunks in the knowledge base → record in the upload log.
//!
//! The commit steps run one upload or delete at a time. If any of them
//! fails the earlier ones are undone: the displaced file is put back and
//! the previous knowledge base snapshot is restored, so the stored file,
//! the chunks and the log entry always describe the same upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use askdoc_core::chunk::{chunk_document, count_pages, ChunkOptions};
use askdoc_core::models::UploadLogEntry;
use askdoc_core::{Error, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::extract::TextExtractor;
use crate::knowledge::KnowledgeBaseHandle;
use crate::upload_log::{timestamp_now, UploadLog};

/// Outcome of a successful upload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub filename: String,
    pub chunks_added: usize,
    pub pages_processed: usize,
}

/// Outcome of a delete. Deleting an unknown filename is not an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeleteReport {
    pub filename: String,
    pub chunks_removed: usize,
    pub file_removed: bool,
}

pub struct Ingestor {
    knowledge: Arc<KnowledgeBaseHandle>,
    log: Arc<UploadLog>,
    extractor: Arc<dyn TextExtractor>,
    chunking: ChunkOptions,
    max_bytes: u64,
    upload_dir: PathBuf,
    commit_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(
        knowledge: Arc<KnowledgeBaseHandle>,
        log: Arc<UploadLog>,
        extractor: Arc<dyn TextExtractor>,
        chunking: ChunkOptions,
        max_bytes: u64,
    ) -> Self {
        let upload_dir = log.upload_dir().to_path_buf();
        Self {
            knowledge,
            log,
            extractor,
            chunking,
            max_bytes,
            upload_dir,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Ingest one uploaded PDF under its sanitized name.
    pub async fn ingest(&self, original_filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        if !original_filename.to_lowercase().ends_with(".pdf") {
            return Err(Error::validation("Only PDF files are allowed"));
        }
        if bytes.is_empty() {
            return Err(Error::validation("Uploaded file is empty"));
        }
        let file_size = bytes.len() as u64;
        if file_size > self.max_bytes {
            return Err(Error::validation(format!(
                "File too large. Maximum size is {}",
                describe_size(self.max_bytes)
            )));
        }
        let filename = secure_filename(original_filename)
            .filter(|name| name.to_lowercase().ends_with(".pdf"))
            .ok_or_else(|| Error::validation("Invalid filename"))?;

        let extractor = self.extractor.clone();
        let (bytes, extracted) = tokio::task::spawn_blocking(move || {
            let extracted = extractor.extract(&bytes);
            (bytes, extracted)
        })
        .await
        .map_err(|e| Error::Extraction(format!("extractor task failed: {}", e)))?;
        let text = extracted?;
        if text.trim().is_empty() {
            return Err(Error::Extraction(
                "No text could be extracted from the PDF".to_string(),
            ));
        }

        let drafts = chunk_document(&text, &self.chunking);
        if drafts.is_empty() {
            return Err(Error::validation(
                "PDF content too short to create meaningful chunks",
            ));
        }
        let pages_processed = count_pages(&text);

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| Error::storage(format!("{}: {}", self.upload_dir.display(), e)))?;
        let token = Uuid::new_v4().simple().to_string();
        let partial = self.upload_dir.join(format!(".{}.{}.partial", filename, token));
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| Error::storage(format!("{}: {}", partial.display(), e)))?;

        let _commit = self.commit_lock.lock().await;
        let previous = self.knowledge.snapshot();
        let placed = match self.place_file(&filename, &partial, &token).await {
            Ok(placed) => placed,
            Err(e) => {
                discard(&partial).await;
                return Err(e);
            }
        };

        let replaced = match self.knowledge.replace_source(&filename, drafts).await {
            Ok(replaced) => replaced,
            Err(e) => {
                placed.undo().await;
                return Err(e);
            }
        };

        let entry = UploadLogEntry {
            filename: filename.clone(),
            original_filename: original_filename.to_string(),
            chunks: replaced.added,
            file_size,
            uploaded_at: timestamp_now(),
            pages_processed,
        };
        if let Err(e) = self.log.record(entry).await {
            tracing::warn!(filename = %filename, error = %e, "upload log write failed, rolling back");
            if let Err(restore) = self.knowledge.restore(previous).await {
                tracing::error!(error = %restore, "failed to restore knowledge base");
            }
            placed.undo().await;
            return Err(e);
        }
        placed.commit().await;

        tracing::info!(
            filename = %filename,
            chunks = replaced.added,
            replaced = replaced.removed,
            pages = pages_processed,
            "document ingested"
        );

        Ok(IngestReport {
            filename,
            chunks_added: replaced.added,
            pages_processed,
        })
    }

    /// Move the partial upload to its final name, setting aside any file
    /// already stored there so the move can be undone.
    async fn place_file(&self, filename: &str, partial: &Path, token: &str) -> Result<PlacedFile> {
        let target = self.upload_dir.join(filename);
        let backup = self.upload_dir.join(format!(".{}.{}.previous", filename, token));
        let backup = match tokio::fs::rename(&target, &backup).await {
            Ok(()) => Some(backup),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::storage(format!("{}: {}", target.display(), e))),
        };
        let placed = PlacedFile { target, backup };
        if let Err(e) = tokio::fs::rename(partial, &placed.target).await {
            let err = Error::storage(format!("{}: {}", placed.target.display(), e));
            placed.undo().await;
            return Err(err);
        }
        Ok(placed)
    }

    /// Remove a document's chunks, its log entry and its stored file.
    pub async fn delete(&self, filename: &str) -> Result<DeleteReport> {
        if secure_filename(filename).as_deref() != Some(filename) {
            return Err(Error::validation(format!("Invalid filename: {}", filename)));
        }

        let _commit = self.commit_lock.lock().await;
        let chunks_removed = self.knowledge.remove_source(filename).await?;
        self.log.remove(filename).await?;

        let path = self.upload_dir.join(filename);
        let file_removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::storage(format!("{}: {}", path.display(), e))),
        };

        tracing::info!(filename, chunks_removed, file_removed, "document deleted");
        Ok(DeleteReport {
            filename: filename.to_string(),
            chunks_removed,
            file_removed,
        })
    }
}

/// A stored upload plus the file it displaced, if any.
struct PlacedFile {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl PlacedFile {
    async fn commit(self) {
        if let Some(backup) = &self.backup {
            discard(backup).await;
        }
    }

    /// Put back whatever was stored under the target name before.
    async fn undo(self) {
        let restored = match &self.backup {
            Some(backup) => tokio::fs::rename(backup, &self.target).await,
            None => match tokio::fs::remove_file(&self.target).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = restored {
            tracing::error!(path = %self.target.display(), error = %e, "failed to restore stored upload");
        }
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary upload file");
    }
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Keeps the final path segment, turns whitespace into `_`, drops anything
/// outside `[A-Za-z0-9._-]` and strips leading dots and underscores.
/// Returns `None` when nothing usable is left.
pub fn secure_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn describe_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdoc_core::embedding::EmbeddingProvider;
    use askdoc_core::store::memory::MemoryDocumentStore;
    use askdoc_core::testing::KeywordEmbedder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn stored_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    struct StaticExtractor(&'static str);

    impl TextExtractor for StaticExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    const HANDBOOK: &str = "[Page 1] Working hours are 9:30 AM to 6:30 PM, Monday to Friday. \
        [Page 2] Leave requests go through the portal.";

    struct Fixture {
        _dir: tempfile::TempDir,
        ingestor: Ingestor,
        knowledge: Arc<KnowledgeBaseHandle>,
        log: Arc<UploadLog>,
    }

    /// Echoes the uploaded bytes back as the page text.
    struct EchoExtractor;

    impl TextExtractor for EchoExtractor {
        fn extract(&self, bytes: &[u8]) -> Result<String> {
            Ok(format!(
                "[Page 1] {} working hours are flexible",
                String::from_utf8_lossy(bytes)
            ))
        }
    }

    /// Keyword embedder with a per-call delay that can be switched to failing.
    #[derive(Default)]
    struct SlowEmbedder {
        inner: KeywordEmbedder,
        delay_ms: u64,
        broken: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.broken.load(Ordering::SeqCst) {
                return Err(Error::provider("slow", "down"));
            }
            self.inner.embed(texts).await
        }
    }

    async fn fixture(extractor: impl TextExtractor + 'static) -> Fixture {
        fixture_with(extractor, Arc::new(KeywordEmbedder::new())).await
    }

    async fn fixture_with(
        extractor: impl TextExtractor + 'static,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = Arc::new(
            KnowledgeBaseHandle::open(Arc::new(MemoryDocumentStore::new()), embedder)
                .await
                .unwrap(),
        );
        let log = Arc::new(UploadLog::new(
            dir.path().join("upload_logs.json"),
            dir.path().join("uploads"),
        ));
        let chunking = ChunkOptions {
            size: 8,
            overlap: 0,
            min_words: 0,
        };
        let ingestor = Ingestor::new(
            knowledge.clone(),
            log.clone(),
            Arc::new(extractor),
            chunking,
            1024,
        );
        Fixture {
            _dir: dir,
            ingestor,
            knowledge,
            log,
        }
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("policy.pdf").as_deref(), Some("policy.pdf"));
        assert_eq!(
            secure_filename("My Handbook 2024.pdf").as_deref(),
            Some("My_Handbook_2024.pdf")
        );
        assert_eq!(secure_filename("../../etc/passwd.pdf").as_deref(), Some("passwd.pdf"));
        assert_eq!(secure_filename("C:\\docs\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(secure_filename(".hidden.pdf").as_deref(), Some("hidden.pdf"));
        assert_eq!(secure_filename("///"), None);
        assert_eq!(secure_filename("éé"), None);
    }

    #[tokio::test]
    async fn test_ingest_writes_file_chunks_and_log() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        let report = f.ingestor.ingest("Handbook.pdf", b"%PDF".to_vec()).await.unwrap();

        assert_eq!(report.filename, "Handbook.pdf");
        assert_eq!(report.pages_processed, 2);
        assert!(report.chunks_added >= 2);
        assert!(f.ingestor.upload_dir().join("Handbook.pdf").exists());
        assert_eq!(stored_files(f.ingestor.upload_dir()), vec!["Handbook.pdf"]);

        let kb = f.knowledge.snapshot();
        assert_eq!(kb.count_source("Handbook.pdf"), report.chunks_added);
        assert_eq!(kb.chunks()[0].page_info.as_deref(), Some("Page 1"));

        let entries = f.log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunks, report.chunks_added);
        assert_eq!(entries[0].file_size, 4);
    }

    #[tokio::test]
    async fn test_reupload_replaces_chunks() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        let first = f.ingestor.ingest("a.pdf", b"%PDF".to_vec()).await.unwrap();
        let second = f.ingestor.ingest("a.pdf", b"%PDF".to_vec()).await.unwrap();

        let kb = f.knowledge.snapshot();
        assert_eq!(kb.len(), second.chunks_added);
        assert!(kb.chunks().iter().all(|c| c.id >= first.chunks_added as u64));
        assert_eq!(f.log.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_uploads() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        for (name, bytes) in [
            ("notes.txt", b"%PDF".to_vec()),
            ("empty.pdf", Vec::new()),
            ("big.pdf", vec![0u8; 2048]),
            ("/.pdf/__.pdf", b"%PDF".to_vec()),
        ] {
            let err = f.ingestor.ingest(name, bytes).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{}: {}", name, err);
        }
        assert!(f.knowledge.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_blank_extraction_leaves_nothing() {
        let f = fixture(StaticExtractor("  \n ")).await;
        let err = f.ingestor.ingest("scan.pdf", b"%PDF".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(!f.ingestor.upload_dir().join("scan.pdf").exists());
        assert!(f.log.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        let added = f.ingestor.ingest("a.pdf", b"%PDF".to_vec()).await.unwrap();

        let report = f.ingestor.delete("a.pdf").await.unwrap();
        assert_eq!(report.chunks_removed, added.chunks_added);
        assert!(report.file_removed);
        assert!(f.knowledge.snapshot().is_empty());
        assert!(f.log.entries().await.unwrap().is_empty());

        let again = f.ingestor.delete("a.pdf").await.unwrap();
        assert_eq!(again.chunks_removed, 0);
        assert!(!again.file_removed);
    }

    #[tokio::test]
    async fn test_delete_rejects_path_traversal() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        let err = f.ingestor.delete("../config.toml").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_same_name_uploads_stay_consistent() {
        let embedder = Arc::new(SlowEmbedder {
            delay_ms: 100,
            ..Default::default()
        });
        let f = fixture_with(EchoExtractor, embedder).await;

        let (first, second) = tokio::join!(
            f.ingestor.ingest("a.pdf", b"AAAA".to_vec()),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                f.ingestor.ingest("a.pdf", b"BBBBBB".to_vec()).await
            }
        );
        first.unwrap();
        second.unwrap();

        let dir = f.ingestor.upload_dir();
        assert_eq!(stored_files(dir), vec!["a.pdf"]);
        let stored = std::fs::read_to_string(dir.join("a.pdf")).unwrap();

        let kb = f.knowledge.snapshot();
        assert_eq!(kb.len(), 1);
        assert!(kb.chunks()[0].text.contains(&stored), "{}", kb.chunks()[0].text);

        let entries = f.log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_size, stored.len() as u64);
    }

    #[tokio::test]
    async fn test_failed_reupload_keeps_previous_upload() {
        let embedder = Arc::new(SlowEmbedder::default());
        let f = fixture_with(EchoExtractor, embedder.clone()).await;
        f.ingestor.ingest("a.pdf", b"AAAA".to_vec()).await.unwrap();

        embedder.broken.store(true, Ordering::SeqCst);
        let err = f.ingestor.ingest("a.pdf", b"BBBB".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));

        let dir = f.ingestor.upload_dir();
        assert_eq!(stored_files(dir), vec!["a.pdf"]);
        assert_eq!(std::fs::read_to_string(dir.join("a.pdf")).unwrap(), "AAAA");
        assert!(f.knowledge.snapshot().chunks()[0].text.contains("AAAA"));
    }

    #[tokio::test]
    async fn test_log_failure_rolls_back_upload() {
        let f = fixture(StaticExtractor(HANDBOOK)).await;
        f.ingestor.ingest("a.pdf", b"%PDF".to_vec()).await.unwrap();
        let before = f.knowledge.snapshot().chunks().to_vec();

        // A directory where the log file should be makes every log write fail.
        let log_path = f._dir.path().join("upload_logs.json");
        std::fs::remove_file(&log_path).unwrap();
        std::fs::create_dir(&log_path).unwrap();

        let err = f.ingestor.ingest("b.pdf", b"%PDF-b".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)), "{}", err);

        assert_eq!(f.knowledge.snapshot().chunks(), &before[..]);
        assert_eq!(stored_files(f.ingestor.upload_dir()), vec!["a.pdf"]);
    }
}
