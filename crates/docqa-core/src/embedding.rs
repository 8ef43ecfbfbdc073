//! Embedding and answer-generation provider traits, plus vector utilities.
//!
//! Defines the [`EmbeddingProvider`] and [`AnswerGenerator`] traits that the
//! ingestion and query pipelines are built against, and pure helper
//! functions for vector serialization and similarity computation.
//!
//! Concrete HTTP implementations (Ollama) live in the `docqa` app crate.
//! Both traits report failures with the shared taxonomy: transport problems
//! are [`Error::Connection`] and malformed or non-success responses are
//! [`Error::Generation`].

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into a fixed-length embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Synthesizes an answer to a question from a block of retrieved context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate_answer(&self, question: &str, context: &str) -> Result<String>;
}

/// Reject empty vectors returned by a provider.
pub fn ensure_non_empty(vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(Error::Generation(
            "embedding service returned an empty vector".to_string(),
        ));
    }
    Ok(vector)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use docqa_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Degenerate inputs score `0.0`: empty
/// vectors, vectors of different lengths, or a zero-norm vector on either
/// side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
