//! Concrete generation providers.
//!
//! - **[`OllamaGenerator`]**: `POST /api/generate` on a local Ollama (non-streaming).
//! - **[`OpenAIGenerator`]**: `POST /v1/chat/completions` on an OpenAI-compatible API.
//! - **[`FailoverGenerator`]**: primary + optional secondary, each call under a deadline.
//!
//! # Failover
//!
//! A primary call that errors, exceeds `generation.timeout_secs`, or
//! returns only whitespace is retried once against the secondary. If the
//! secondary fails as well, the secondary's error is returned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use askdoc_core::generation::GenerationProvider;
use askdoc_core::Error;
use async_trait::async_trait;

use crate::config::{GenerationConfig, GeneratorConfig};

type CoreResult<T> = askdoc_core::Result<T>;

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> CoreResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    "ollama",
                    format!("connection error (is Ollama running at {}?): {}", self.url, e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider("ollama", format!("API error {}: {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::provider("ollama", e))?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("ollama", "invalid response: missing response field"))
    }
}

// ============ OpenAI ============

/// Chat-completions client. Reads `OPENAI_API_KEY`; `url` overrides the
/// API base for compatible servers.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> CoreResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider("openai", format!("API error {}: {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::provider("openai", e))?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("openai", "invalid response: missing message content"))
    }
}

// ============ Failover ============

/// Primary generator with one bounded retry against a secondary.
pub struct FailoverGenerator {
    primary: Arc<dyn GenerationProvider>,
    secondary: Option<Arc<dyn GenerationProvider>>,
    timeout: Duration,
}

impl FailoverGenerator {
    pub fn new(
        primary: Arc<dyn GenerationProvider>,
        secondary: Option<Arc<dyn GenerationProvider>>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            timeout,
        }
    }

    async fn call(&self, provider: &dyn GenerationProvider, prompt: &str) -> CoreResult<String> {
        let output = tokio::time::timeout(self.timeout, provider.generate(prompt))
            .await
            .map_err(|_| {
                Error::provider(
                    provider.name(),
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                )
            })??;
        if output.trim().is_empty() {
            return Err(Error::provider(provider.name(), "empty completion"));
        }
        Ok(output)
    }
}

#[async_trait]
impl GenerationProvider for FailoverGenerator {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn generate(&self, prompt: &str) -> CoreResult<String> {
        let primary_err = match self.call(self.primary.as_ref(), prompt).await {
            Ok(output) => return Ok(output),
            Err(e) => e,
        };

        let secondary = match &self.secondary {
            Some(s) => s,
            None => return Err(primary_err),
        };

        tracing::warn!(
            primary = self.primary.name(),
            secondary = secondary.name(),
            error = %primary_err,
            "generation failed, retrying with secondary provider"
        );
        let output = self.call(secondary.as_ref(), prompt).await?;
        tracing::info!(secondary = secondary.name(), "secondary generation succeeded");
        Ok(output)
    }
}

fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Build the failover chain from config. `None` when no primary is configured.
pub fn create_provider(config: &GenerationConfig) -> Result<Option<Arc<dyn GenerationProvider>>> {
    let primary = match &config.primary {
        Some(p) => create_generator(p)?,
        None => return Ok(None),
    };
    let secondary = config.fallback.as_ref().map(create_generator).transpose()?;

    Ok(Some(Arc::new(FailoverGenerator::new(
        primary,
        secondary,
        Duration::from_secs(config.timeout_secs),
    ))))
}
