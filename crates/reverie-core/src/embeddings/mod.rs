//! Embeddings - the vector side of memory
//!
//! The engine treats embedding generation as an external concern behind the
//! [`Embedder`] trait: the vector store accepts raw vectors and the memory
//! manager dispatches `embed` calls to a blocking worker. Two
//! implementations ship here:
//!
//! - [`HashingEmbedder`] (always available): deterministic feature hashing
//!   over character trigrams and word unigrams. No model downloads, stable
//!   across runs, good enough for ranking exact and near-duplicate content.
//! - `LocalEmbedder` (feature `local-embeddings`): fastembed/ONNX inference
//!   with real semantic vectors.

mod hashing;

#[cfg(feature = "local-embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-embeddings")))]
mod local;

pub use hashing::HashingEmbedder;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default vector dimensionality shared by both embedders.
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Longest text passed to an embedder; longer inputs are truncated.
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("embedding generation failed: {0}")]
    Failed(String),
    /// Invalid input (empty, unsupported)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// Produces a fixed-dimension vector for a piece of text.
///
/// Implementations may block (model inference); callers dispatch to a
/// blocking worker. Vectors must be unit-normalized so cosine similarity
/// reduces to a dot product.
pub trait Embedder: Send + Sync {
    /// Vector dimensionality, constant for the lifetime of the embedder.
    fn dimensions(&self) -> usize;

    /// Embed `text` into a unit-normalized vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity between two vectors. Mismatched lengths score 0.
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
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
