/// Embedding & indexing
///
/// - EmbeddingProvider trait for abstraction over embedding backends
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - VectorIndex: exact cosine search over one persisted snapshot
mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{
    BuildOutcome, IndexSnapshot, IndexState, IndexStatus, SearchHit, VectorIndex,
    VectorIndexError,
};
