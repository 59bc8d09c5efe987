//! Deterministic in-process providers for tests.
//!
//! [`KeywordEmbedder`] maps text onto a small fixed vocabulary, one
//! dimension per keyword group, so similarity is predictable: two texts
//! that mention the same keywords score 1.0, texts with disjoint keywords
//! score 0.0. [`ScriptedGenerator`] returns canned completions and records
//! the prompts it was given.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::generation::GenerationProvider;

const VOCABULARY: &[&[&str]] = &[
    &["work", "working", "workday"],
    &["hour", "hours", "timing", "timings"],
    &["office", "offices"],
    &["location", "locations", "located"],
    &["leave", "leaves", "vacation"],
    &["remote", "wfh"],
    &["culture", "values"],
    &["dress", "attire"],
    &["communication", "email", "slack"],
    &["safety", "health"],
    &["policy", "policies", "rules", "guidelines"],
    &["salary", "payroll", "pay"],
    &["holiday", "holidays"],
    &["expense", "expenses", "reimbursement"],
];

/// Bag-of-keywords embedder over [`VOCABULARY`].
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An embedder whose every call fails with a provider error.
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of `embed` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Embed one text without going through the async trait.
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; VOCABULARY.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if let Some(dim) = VOCABULARY.iter().position(|g| g.contains(&word.as_str())) {
                v[dim] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::provider("keyword-test", "embedding backend unavailable"));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Generator that replays scripted replies in order and records prompts.
///
/// Once the script is exhausted the last reply repeats. An `Err` entry makes
/// that call fail.
pub struct ScriptedGenerator {
    name: String,
    replies: Mutex<Vec<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(name: &str, replies: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `reply`.
    pub fn answering(reply: &str) -> Self {
        Self::new("scripted", vec![Ok(reply.to_string())])
    }

    /// Always fails.
    pub fn failing(name: &str) -> Self {
        Self::new(name, vec![Err("generator unavailable".to_string())])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        let mut replies = self.replies.lock();
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies
                .first()
                .cloned()
                .unwrap_or_else(|| Err("no scripted reply".to_string()))
        };
        reply.map_err(|message| Error::provider(self.name.clone(), message))
    }
}
