//! Generation provider trait.
//!
//! Concrete backends (Ollama, OpenAI-compatible chat) and the failover
//! wrapper live in the `askdoc` application crate.

use async_trait::async_trait;

use crate::error::Result;

/// A text-completion backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider label used in logs and errors (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Complete `prompt` and return the raw model output.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
