//! Consulta Vector - Embedding and similarity search clients
//!
//! Provides the embedding abstraction (Hugging Face feature extraction)
//! and the vector store abstraction (Supabase `match_documents` RPC).

use async_trait::async_trait;
use consulta_core::{Document, MatchQuery, Result};

pub mod embedding;
pub mod supabase_store;

pub use embedding::{EmbeddingClient, HuggingFaceEmbedding};
pub use supabase_store::SupabaseStore;

/// Trait for vector store similarity search
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the documents closest to the query embedding, best first.
    ///
    /// Implementations return at most `query.match_count` documents and
    /// never reorder what the store sent back.
    async fn match_documents(&self, query: &MatchQuery) -> Result<Vec<Document>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
