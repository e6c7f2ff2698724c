use crate::embedding::{Embedder, EmbeddingError, EmbeddingResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Signed feature hashing over lowercase word and bigram tokens
///
/// Deterministic and offline: the same text always maps to the same unit
/// vector, and texts sharing vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous form of [`Embedder::embed`]
    pub fn embed_sync(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        if words.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0f32; self.dimensions];
        let bigrams = words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1]));

        for token in words.iter().cloned().chain(bigrams) {
            let digest = Sha256::digest(token.as_bytes());
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}
