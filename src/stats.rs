//! Knowledge base and upload overview for `askdoc stats`.
//!
//! Reads the chunk records without embedding them, so it works with the
//! embedding backend offline.

use std::collections::BTreeMap;

use anyhow::Result;
use askdoc_core::models::Chunk;
use askdoc_core::store::{parse_records, DocumentStore};

use crate::config::Config;
use crate::knowledge::JsonFileStore;
use crate::upload_log::UploadLog;

/// Chunk count per source, ordered by source name.
pub fn chunks_per_source(chunks: &[Chunk]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for chunk in chunks {
        *counts.entry(chunk.source.as_str()).or_insert(0) += 1;
    }
    counts
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = JsonFileStore::new(&config.storage.knowledge_base);
    let (chunks, problem) = match store.load().await {
        Ok(None) => (Vec::new(), None),
        Ok(Some(value)) => match parse_records(value) {
            Ok(chunks) => (chunks, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        },
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let log = UploadLog::new(&config.storage.upload_log, &config.storage.upload_dir);
    let uploads = log.stats().await?;

    println!("askdoc Knowledge Base Stats");
    println!("===========================");
    println!();
    println!("  Store:       {}", store.path().display());
    if let Some(problem) = &problem {
        println!("  Status:      unreadable ({})", problem);
    }
    println!("  Chunks:      {}", chunks.len());
    println!("  Embedding:   {}", config.embedding.provider);
    println!();
    println!("  Files:       {}", uploads.total_files);
    println!("  Size:        {:.2} MB", uploads.total_size_mb);
    println!(
        "  Last upload: {}",
        uploads.last_upload.as_deref().unwrap_or("never")
    );

    let per_source = chunks_per_source(&chunks);
    if !per_source.is_empty() {
        println!();
        println!("  {:<40} {:>8}", "SOURCE", "CHUNKS");
        for (source, count) in per_source {
            let source = if source.is_empty() { "(unknown)" } else { source };
            println!("  {:<40} {:>8}", source, count);
        }
    }

    Ok(())
}
