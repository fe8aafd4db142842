//! # Reverie Core
//!
//! Persona memory engine for conversational runtimes:
//!
//! - **Importance scoring**: six bounded signals (content salience,
//!   engagement, topic match, temporal rarity, relationship, recency)
//!   blended into one retention value per memory
//! - **Semantic retrieval**: per-persona vector collections with visibility
//!   rules enforced at the engine boundary
//! - **Time-aware decay**: a background worker that ages importance under
//!   configurable modes, protecting what is important or recently read
//! - **Safety-checked pruning**: capacity eviction where protective filters
//!   always override the ranking
//! - **Conversation scoring**: the 0-100 continue score that decides whether
//!   an exchange keeps going and feeds the importance scorer
//!
//! The JSON-RPC surface, session routing, and LLM glue live in the
//! `reverie-server` crate; this crate is the engine they call into.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod conversation;
pub mod directory;
pub mod embeddings;
pub mod error;
pub mod memory;
pub mod persona;
pub mod scoring;
pub mod vector;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::{
    ConfigError, ConversationConfig, LlmConfig, MemoryConfig, MemoryWeights, PersonaConfig,
    RuntimeConfig, ServerConfig,
};

// Persona model
pub use conversation::{ConversationContext, Priority};
pub use persona::{InteractionState, Persona, Relationship};

// Persona registry
pub use directory::{DirectoryError, MemoryDirectory, PersonaDirectory, SqlitePersonaDirectory};

// Embeddings
pub use embeddings::{
    cosine_similarity, normalize, Embedder, EmbeddingError, HashingEmbedder, EMBEDDING_DIMENSIONS,
};
#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;

// Memory engine
pub use memory::decay::{DecayConfig, DecayHandle, DecayMetrics, DecayMode, DecayStats, DecayWorker};
pub use memory::manager::MemoryManager;
pub use memory::pruning::{
    MemoryPruner, PruneRecommendation, PruneState, PrunerStats, PruningConfig, PruningMetrics,
    PruningStrategy,
};
pub use memory::{
    MaintenanceLocks, Memory, MemoryDraft, MemorySource, MemoryStats, RetrievedMemory, Visibility,
};

// Scoring
pub use scoring::conversation::{ConversationScorer, TurnScore};
pub use scoring::importance::{ImportanceScorer, ImportanceSignals};

// Vector store
pub use vector::{MemoryFilter, QueryMatch, VectorStore, VectorStoreError};

// Errors
pub use error::{CoreError, Result};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
