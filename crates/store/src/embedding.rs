//! Embedding-service boundary and test doubles.
//!
//! The production embedder lives outside this workspace; the engine only
//! ever sees this trait. Failure here is never fatal — retrieval falls
//! back to keyword and then importance ordering.

use async_trait::async_trait;
use counterforce_core::error::EmbeddingError;

/// Black-box embedding-generation service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic embedder for tests: hashes character trigrams into a
/// fixed-size bag. Similar strings get similar vectors, identical strings
/// get identical vectors, and no network is involved.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        if chars.is_empty() {
            return Ok(vector);
        }
        for window in chars.windows(3.min(chars.len())) {
            let mut hash: u64 = 1469598103934665603; // FNV offset basis
            for c in window {
                hash ^= *c as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vector[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        // L2-normalize so cosine similarity behaves
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// An embedder that always fails. Exercises the fallback chain in tests.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("embedding service disabled".into()))
    }
}
