//! Word-window text chunker.
//!
//! Splits extracted document text into windows of `size` words, advancing
//! the window start by `size - overlap` words each step. Non-overlapping
//! chunking is the special case `overlap = 0`.
//!
//! # Algorithm
//!
//! 1. Split the text on whitespace.
//! 2. Emit the window `[start, start + size)` (clamped to the word count).
//! 3. Drop the window if it has fewer than `min_words` words.
//! 4. Stop once a window reaches the last word; otherwise advance by
//!    `size - overlap`.
//!
//! Stopping at the last word means a tail that is already fully covered
//! by the previous window is never emitted a second time.
//!
//! # Page markers
//!
//! The extractor prefixes each page with a `[Page N]` marker. Markers stay
//! in the chunk text (they are words like any other), and
//! [`chunk_document`] uses them to label each window with the pages it
//! spans.
//!
//! # Example
//!
//! ```rust
//! use askdoc_core::chunk::{chunk_text, ChunkOptions};
//!
//! let opts = ChunkOptions { size: 3, overlap: 0, min_words: 0 };
//! let chunks = chunk_text("one two three four five", &opts);
//! assert_eq!(chunks, vec!["one two three", "four five"]);
//! ```

use std::ops::Range;

use crate::models::ChunkDraft;

/// Window size, overlap, and minimum-length policy for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Words per window.
    pub size: usize,
    /// Words shared by consecutive windows. Must be smaller than `size`.
    pub overlap: usize,
    /// Windows with fewer words than this are dropped. `0` keeps every window.
    pub min_words: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            size: 250,
            overlap: 0,
            min_words: 31,
        }
    }
}

impl ChunkOptions {
    fn step(&self) -> usize {
        self.size.saturating_sub(self.overlap).max(1)
    }
}

/// Compute the word ranges of every emitted window for a text of
/// `word_count` words.
///
/// # Guarantees
///
/// - Ranges are non-empty and ordered by start.
/// - With `overlap = 0` the ranges are disjoint and consecutive.
/// - With `min_words = 0` the ranges cover every word.
pub fn chunk_spans(word_count: usize, opts: &ChunkOptions) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if opts.size == 0 || word_count == 0 {
        return spans;
    }

    let step = opts.step();
    let mut start = 0;
    while start < word_count {
        let end = (start + opts.size).min(word_count);
        if end - start >= opts.min_words {
            spans.push(start..end);
        }
        if end == word_count {
            break;
        }
        start += step;
    }
    spans
}

/// Split text into word windows.
///
/// Empty text yields no chunks; text shorter than `size` yields a single
/// chunk holding every word, unless it falls below `min_words`.
pub fn chunk_text(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    chunk_spans(words.len(), opts)
        .into_iter()
        .map(|span| words[span].join(" "))
        .collect()
}

/// Split text into word windows labelled with the pages they cover.
pub fn chunk_document(text: &str, opts: &ChunkOptions) -> Vec<ChunkDraft> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let pages = word_pages(&words);

    chunk_spans(words.len(), opts)
        .into_iter()
        .map(|span| {
            let page_info = describe_pages(&pages[span.clone()]);
            ChunkDraft {
                text: words[span].join(" "),
                page_info,
            }
        })
        .collect()
}

/// Format the marker the extractor places before page `number` (1-based).
pub fn page_marker(number: usize) -> String {
    format!("[Page {}]", number)
}

/// Count the page markers in extracted text.
pub fn count_pages(text: &str) -> usize {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .windows(2)
        .filter(|pair| parse_marker(pair[0], pair[1]).is_some())
        .count()
}

fn parse_marker(first: &str, second: &str) -> Option<u32> {
    if first != "[Page" {
        return None;
    }
    second.strip_suffix(']')?.parse().ok()
}

/// Page number in effect at each word, carried forward from the last marker.
fn word_pages(words: &[&str]) -> Vec<Option<u32>> {
    let mut current = None;
    let mut pages = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        if let Some(next) = words.get(i + 1) {
            if let Some(n) = parse_marker(word, next) {
                current = Some(n);
            }
        }
        pages.push(current);
    }
    pages
}

fn describe_pages(pages: &[Option<u32>]) -> Option<String> {
    let first = pages.iter().flatten().min()?;
    let last = pages.iter().flatten().max()?;
    if first == last {
        Some(format!("Page {}", first))
    } else {
        Some(format!("Pages {}-{}", first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn opts(size: usize, overlap: usize, min_words: usize) -> ChunkOptions {
        ChunkOptions {
            size,
            overlap,
            min_words,
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkOptions::default()).is_empty());
        assert!(chunk_text("   \n\t ", &opts(5, 0, 0)).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("alpha beta   gamma\ndelta", &opts(10, 0, 0));
        assert_eq!(chunks, vec!["alpha beta gamma delta"]);
    }

    #[test]
    fn test_short_text_below_minimum_dropped() {
        let chunks = chunk_text(&words(20), &ChunkOptions::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_non_overlapping_spans_are_consecutive() {
        for n in [1, 7, 10, 11, 99, 250, 251] {
            let spans = chunk_spans(n, &opts(10, 0, 0));
            let mut expected_start = 0;
            for span in &spans {
                assert_eq!(span.start, expected_start, "gap before {:?}", span);
                expected_start = span.end;
            }
            assert_eq!(expected_start, n, "words not covered for n={}", n);
        }
    }

    #[test]
    fn test_overlapping_windows_cover_all_words() {
        for (size, overlap) in [(5, 2), (10, 9), (4, 1), (3, 0)] {
            for n in [1, 4, 5, 6, 17, 40] {
                let spans = chunk_spans(n, &opts(size, overlap, 0));
                let mut covered = vec![false; n];
                for span in &spans {
                    assert!(span.len() <= size);
                    for i in span.clone() {
                        covered[i] = true;
                    }
                }
                assert!(covered.iter().all(|c| *c), "size={} overlap={} n={}", size, overlap, n);
                assert_eq!(spans.last().map(|s| s.end), Some(n));
            }
        }
    }

    #[test]
    fn test_overlap_shares_words() {
        let chunks = chunk_text("a b c d e f g", &opts(4, 2, 0));
        assert_eq!(chunks, vec!["a b c d", "c d e f", "e f g"]);
    }

    #[test]
    fn test_min_words_drops_short_tail() {
        let text = words(70);
        let kept = chunk_text(&text, &opts(30, 0, 11));
        assert_eq!(kept.len(), 2);
        let all = chunk_text(&text, &opts(30, 0, 0));
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].split_whitespace().count(), 10);
    }

    #[test]
    fn test_default_policy_drops_windows_of_thirty_words() {
        let text = words(280);
        let chunks = chunk_text(&text, &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        let chunks = chunk_text(&words(281), &ChunkOptions::default());
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_page_info_from_markers() {
        let text = format!(
            "{} alpha beta gamma\n{} delta epsilon",
            page_marker(1),
            page_marker(2)
        );
        let drafts = chunk_document(&text, &opts(4, 0, 0));
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].page_info.as_deref(), Some("Page 1"));
        assert_eq!(drafts[1].page_info.as_deref(), Some("Pages 1-2"));
        assert_eq!(drafts[2].page_info.as_deref(), Some("Page 2"));
        assert!(drafts[0].text.starts_with("[Page 1]"));
    }

    #[test]
    fn test_page_info_absent_without_markers() {
        let drafts = chunk_document("plain text without markers", &opts(10, 0, 0));
        assert_eq!(drafts[0].page_info, None);
    }

    #[test]
    fn test_count_pages() {
        let text = "[Page 1] one\n[Page 2] two\n[Page 3] three";
        assert_eq!(count_pages(text), 3);
        assert_eq!(count_pages("no markers [Page here"), 0);
    }

    #[test]
    fn test_deterministic() {
        let text = words(500);
        let a = chunk_text(&text, &opts(50, 10, 5));
        let b = chunk_text(&text, &opts(50, 10, 5));
        assert_eq!(a, b);
    }
}
