//! Engine-wide error type
//!
//! Module-local error enums (embeddings, vector store, directory, config)
//! stay close to their code; this is the surface the orchestrator maps onto
//! wire error codes.

use crate::directory::DirectoryError;
use crate::embeddings::EmbeddingError;
use crate::vector::VectorStoreError;

/// Engine error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The persona id is not in the registry
    #[error("unknown persona: {0}")]
    InvalidPersona(String),
    /// The memory id does not exist
    #[error("memory not found: {0}")]
    MemoryNotFound(String),
    /// Embedding failed after bounded retries
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(#[source] EmbeddingError),
    /// A prune is already running for this persona
    #[error("prune already in progress for persona: {0}")]
    PruneInProgress(String),
    /// Vector store failure
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
    /// Persona registry failure
    #[error("persona directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, CoreError>;
