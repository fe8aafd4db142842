//! Local semantic embeddings via fastembed (ONNX inference)
//!
//! Uses nomic-embed-text-v1.5 (768d) truncated to 256 dimensions via
//! Matryoshka representation learning: the first N dims are the N-dim
//! representation, so truncation costs ~2% quality for 3x less storage.

use std::sync::{Mutex, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{normalize, Embedder, EmbeddingError, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};

/// Global model handle; fastembed initialization is expensive and the model
/// is internally mutable, hence the Mutex.
static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Cache directory for downloaded model files.
/// Honors REVERIE_EMBED_CACHE, falling back to the platform cache dir.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("REVERIE_EMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }
    if let Some(dirs) = directories::ProjectDirs::from("rs", "reverie", "reverie") {
        return dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("failed to create embedding cache dir {:?}: {}", cache, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize nomic-embed-text-v1.5: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// fastembed-backed embedder producing Matryoshka-truncated vectors.
pub struct LocalEmbedder {
    _unused: (),
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Eagerly initialize the model (downloads on first use).
    pub fn init(&self) -> Result<(), EmbeddingError> {
        model().map(|_| ())
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let truncated: String = trimmed.chars().take(MAX_TEXT_LENGTH).collect();

        let mut guard = model()?;
        let mut vectors = guard
            .embed(vec![truncated], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
        let mut vector = vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Failed("model returned no vector".to_string()))?;

        vector.truncate(EMBEDDING_DIMENSIONS);
        normalize(&mut vector);
        Ok(vector)
    }
}
