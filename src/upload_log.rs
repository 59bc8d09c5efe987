//! Administrative record of uploaded documents.
//!
//! The log is a JSON array of [`UploadLogEntry`] kept next to the knowledge
//! base in its own file. Ingestion writes the entry last and rolls the
//! upload back when that write fails.

use std::path::{Path, PathBuf};

use askdoc_core::models::UploadLogEntry;
use askdoc_core::{Error, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::knowledge::write_json_atomic;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One log entry as returned by the listing, with the state of its file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadListing {
    #[serde(flatten)]
    pub entry: UploadLogEntry,
    pub file_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
}

/// Totals over the upload log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadStats {
    pub total_files: usize,
    pub total_chunks: usize,
    /// Size of the files still on disk.
    pub total_size_mb: f64,
    pub last_upload: Option<String>,
}

pub struct UploadLog {
    path: PathBuf,
    upload_dir: PathBuf,
    lock: Mutex<()>,
}

impl UploadLog {
    pub fn new(path: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            upload_dir: upload_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// All entries in upload order. A missing or unreadable log is empty.
    pub async fn entries(&self) -> Result<Vec<UploadLogEntry>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(format!("{}: {}", self.path.display(), e))),
        };
        match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring malformed upload log");
                Ok(Vec::new())
            }
        }
    }

    /// Append `entry`, dropping any earlier entry with the same filename.
    pub async fn record(&self, entry: UploadLogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.entries().await?;
        entries.retain(|e| e.filename != entry.filename);
        entries.push(entry);
        write_json_atomic(&self.path, &entries).await
    }

    /// Drop every entry for `filename`. Returns whether one existed.
    pub async fn remove(&self, filename: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|e| e.filename != filename);
        if entries.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.path, &entries).await?;
        Ok(true)
    }

    pub async fn listing(&self) -> Result<Vec<UploadListing>> {
        let mut out = Vec::new();
        for entry in self.entries().await? {
            let size = self.file_size(&entry.filename).await;
            out.push(UploadListing {
                entry,
                file_exists: size.is_some(),
                file_size_mb: size.map(to_mb),
            });
        }
        Ok(out)
    }

    pub async fn stats(&self) -> Result<UploadStats> {
        let entries = self.entries().await?;
        let mut total_bytes = 0;
        for entry in &entries {
            total_bytes += self.file_size(&entry.filename).await.unwrap_or(0);
        }
        Ok(UploadStats {
            total_files: entries.len(),
            total_chunks: entries.iter().map(|e| e.chunks).sum(),
            total_size_mb: to_mb(total_bytes),
            last_upload: entries.last().map(|e| e.uploaded_at.clone()),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    async fn file_size(&self, filename: &str) -> Option<u64> {
        let meta = tokio::fs::metadata(self.upload_dir.join(filename)).await.ok()?;
        meta.is_file().then(|| meta.len())
    }
}

/// Local time in the log's timestamp format.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}
