//! Text extraction from uploaded documents.
//!
//! Extractors are synchronous and may be slow on large files; the
//! ingestion pipeline runs them on the blocking thread pool. The output
//! starts every page with a `[Page N]` marker so the chunker can label
//! chunks with their pages.

use askdoc_core::chunk::page_marker;
use askdoc_core::{Error, Result};

/// Bytes in, marked-up text out.
pub trait TextExtractor: Send + Sync {
    /// Extract the document's text. Pages with no text are skipped but
    /// keep their number.
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// PDF extraction via `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| Error::Extraction(e.to_string()))?;
        Ok(join_pages(pages.iter().map(String::as_str)))
    }
}

/// Prefix each non-blank page with its marker and join with newlines.
pub fn join_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("{} {}", page_marker(i + 1), text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
