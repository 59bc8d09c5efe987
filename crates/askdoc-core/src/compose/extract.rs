//! Sentence splitting and extractive answer selection.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

// `. ! ?` followed by whitespace or end of text. Abbreviations over-split.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("invalid sentence regex"));

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("invalid word regex"));

static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Page \d+\]\s*").expect("invalid page marker regex"));

/// Characters kept by the prefix fallback.
pub const PREFIX_CHARS: usize = 300;

/// Remove the `[Page N]` markers the extractor inserts.
pub fn strip_page_markers(text: &str) -> String {
    PAGE_MARKER.replace_all(text, "").into_owned()
}

/// Split text into trimmed, non-empty sentences without their terminal
/// punctuation.
pub fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercased `\w+` tokens of `text`.
pub fn keywords(text: &str) -> HashSet<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Pick the sentences of `text` that share the most keywords with `query`.
///
/// Sentences are scored by how many distinct query keywords appear among
/// their words. The best `max_sentences` (ties keep text order) are joined
/// with `". "` and closed with `"."`. When no sentence shares a keyword,
/// the first [`PREFIX_CHARS`] characters are returned with `"..."`.
pub fn select_sentences(query: &str, text: &str, max_sentences: usize) -> String {
    let query_keywords = keywords(query);

    let mut scored: Vec<(&str, usize)> = split_sentences(text)
        .into_iter()
        .filter_map(|sentence| {
            let words = keywords(sentence);
            let score = query_keywords.iter().filter(|k| words.contains(*k)).count();
            (score > 0).then_some((sentence, score))
        })
        .collect();

    if scored.is_empty() {
        return prefix(text);
    }

    // Stable: equal scores keep their order in the text.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let top: Vec<&str> = scored
        .into_iter()
        .take(max_sentences.max(1))
        .map(|(s, _)| s)
        .collect();
    format!("{}.", top.join(". "))
}

fn prefix(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(PREFIX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
