//! ============================================================================
//! Provider Module - Capability seams for external collaborators
//! ============================================================================
//! The engine talks to three potentially slow, remote-equivalent services
//! through object-safe async traits:
//! - EmbeddingProvider: text -> fixed-dimension vector
//! - VectorStore: cosine similarity search + full index rebuild
//! - LanguageModel: single-shot prompt -> text generation
//!
//! Concrete adapters:
//! - OpenAiEmbeddings / OpenAiChat: OpenAI-compatible HTTP APIs
//! - QdrantStore: Qdrant collection with a member_id payload filter
//! - InMemoryStore: brute-force cosine scan, used by tests and small corpora
//! ============================================================================

mod in_memory;
mod openai;
mod qdrant;

pub use in_memory::InMemoryStore;
pub use openai::{OpenAiChat, OpenAiEmbeddings, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
pub use qdrant::{QdrantStore, COLLECTION_NAME};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Search restriction for a similarity query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the given member's messages
    Member(String),
    /// The entire corpus
    All,
}

/// One similarity hit. Carries the stored vector so the retrieval engine
/// can compute the centroid of a result set without a second round-trip.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message_id: Uuid,
    /// Cosine similarity against the query vector
    pub score: f32,
    pub vector: Vec<f32>,
}

/// An entry handed to the store on rebuild
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub message_id: Uuid,
    pub member_id: String,
    pub vector: Vec<f32>,
}

/// Computes embedding vectors for message and question text.
/// Deterministic for identical text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, in input order. Implementations with a batch
    /// endpoint should override this; the default calls `embed` per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Cosine-similarity vector index over the message corpus
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-k cosine search within the given scope, best first
    async fn search(&self, query: &[f32], scope: &SearchScope, k: usize) -> Result<Vec<SearchHit>>;

    /// Replace the whole index with a freshly built one. Implementations
    /// must not expose a partially rebuilt index to concurrent searches.
    async fn rebuild(&self, entries: Vec<IndexEntry>) -> Result<()>;
}

/// Free-form text generation, single-shot and stateless
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Cosine similarity between two vectors of equal dimension
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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
