//! Embedding provider interface.
//!
//! The store calls [`EmbeddingProvider::embed`] once per build with every chunk
//! text, and once per query with a single-item batch.

use std::path::PathBuf;

use crate::config::Number;
use crate::error::EmbeddingError;

/// Which model to load and where to cache downloaded files.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Local model directory or Hugging Face repository id
    pub model_id: String,
    /// Hub cache directory; `None` uses the hub default
    pub cache_dir: Option<PathBuf>,
}

/// Maps text to fixed-dimension vectors.
pub trait EmbeddingProvider {
    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embeds `texts`, returning one vector per text in input order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>, EmbeddingError>;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>, EmbeddingError> {
        (**self).embed(texts)
    }
}

/// Verifies a provider's output has `expected_count` vectors of `dimension`.
pub fn check_batch(
    vectors: &[Vec<Number>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}
