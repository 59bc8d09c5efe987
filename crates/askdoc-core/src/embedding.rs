//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the [`EmbeddingMatrix`] that holds one unit vector per
//! knowledge-base chunk, and the pure helpers used for similarity.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the `askdoc`
//! application crate.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for embedding providers.
///
/// Implementations must be deterministic for identical input and should
/// return unit-length vectors of a fixed dimension. Callers normalize
/// anyway, so a provider that returns raw vectors still ranks correctly.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text and normalize it to unit length.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()]).await?;
    check_dims(provider, &vectors)?;
    let mut vector = vectors
        .pop()
        .ok_or_else(|| Error::provider(provider.model_name(), "empty embedding response"))?;
    normalize(&mut vector);
    Ok(vector)
}

/// Fail unless every vector has the dimension the provider declares.
pub fn check_dims(provider: &dyn EmbeddingProvider, vectors: &[Vec<f32>]) -> Result<()> {
    let expected = provider.dims();
    match vectors.iter().position(|v| v.len() != expected) {
        None => Ok(()),
        Some(i) => Err(Error::provider(
            provider.model_name(),
            format!(
                "embedding {} has {} dimensions, expected {}",
                i,
                vectors[i].len(),
                expected
            ),
        )),
    }
}

/// Dense row-major matrix of unit vectors, one row per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dims: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Build a matrix from provider output, normalizing every row.
    ///
    /// Fails if the rows do not all share one non-zero dimension.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dims = rows.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(Error::provider("embedding", "zero-dimensional embeddings"));
        }

        let mut data = Vec::with_capacity(rows.len() * dims);
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() != dims {
                return Err(Error::provider(
                    "embedding",
                    format!("row {} has {} dimensions, expected {}", i, row.len(), dims),
                ));
            }
            normalize(&mut row);
            data.extend_from_slice(&row);
        }

        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len() / self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dims..(index + 1) * self.dims]
    }

    /// Dot product of `query` with every row. Rows and query are unit
    /// vectors, so these are cosine similarities.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        self.data
            .chunks_exact(self.dims)
            .map(|row| dot(row, query))
            .collect()
    }
}

/// Dot product. Returns `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
