//! Deterministic feature-hashing embedder
//!
//! Projects character trigrams and word unigrams into a fixed-dimension
//! signed bucket space (the hashing trick). Identical texts map to identical
//! vectors, overlapping texts to nearby ones. Stable across runs and
//! platforms; no model files, no I/O.

use super::{normalize, Embedder, EmbeddingError, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};

/// Trigram features carry less weight than whole words.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder. See the module docs for the projection scheme.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(EMBEDDING_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dimensions as u64) as usize;
        // One spare hash bit decides the sign, spreading collisions.
        let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let truncated: String = trimmed.chars().take(MAX_TEXT_LENGTH).collect();
        let lowered = truncated.to_lowercase();

        let mut vector = vec![0.0f32; self.dimensions];
        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            self.accumulate(&mut vector, word, 1.0);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() < 3 {
                continue;
            }
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// 64-bit FNV-1a. Not a stdlib hasher on purpose: the projection must stay
/// identical across compiler versions so stored vectors remain comparable.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed("the tavern serves honey mead").unwrap();
        let b = embedder.embed("the tavern serves honey mead").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unit_normalized() {
        let embedder = HashingEmbedder::new();
        let v = embedder.embed("a memory about the river crossing").unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = HashingEmbedder::new();
        let base = embedder.embed("the old oak tree by the river").unwrap();
        let near = embedder.embed("an oak tree near the river bank").unwrap();
        let far = embedder.embed("quarterly tax ledgers of the merchant guild").unwrap();

        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_rejected() {
        let embedder = HashingEmbedder::new();
        assert!(matches!(
            embedder.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_dimensions() {
        let embedder = HashingEmbedder::with_dimensions(64);
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("hello world").unwrap().len(), 64);
    }
}
