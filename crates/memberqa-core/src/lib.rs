//! ============================================================================
//! MEMBERQA-CORE: Retrieval-grounded member question answering
//! ============================================================================
//! This crate implements the full answering pipeline:
//! - Member resolution from free text (literal + fuzzy name matching)
//! - Multi-stage semantic retrieval (scoped, global fallback, centroid
//!   expansion) producing a ranked, deduplicated context set
//! - The deterministic answer policy (explicit / inferred / none) with
//!   enforced disclaimer normalization
//! - Capability traits for embeddings, vector search, and generation,
//!   plus OpenAI-compatible, Qdrant, and in-memory adapters
//! ============================================================================

pub mod config;
pub mod engine;
pub mod index;
pub mod ingest;
pub mod policy;
pub mod providers;
pub mod resolver;
pub mod retrieval;
pub mod types;

// Re-export the surface most callers need
pub use config::QaConfig;
pub use engine::QaEngine;
pub use index::{CorpusSnapshot, SnapshotHandle};
pub use policy::{AnswerPolicy, INFERRED_PREFIX, NO_INFO_FALLBACK};
pub use providers::{
    EmbeddingProvider, IndexEntry, InMemoryStore, LanguageModel, OpenAiChat, OpenAiEmbeddings,
    QdrantStore, SearchHit, SearchScope, VectorStore,
};
pub use resolver::MemberResolver;
pub use retrieval::RetrievalEngine;
pub use types::{
    AnswerClass, AnswerEnvelope, CandidateSource, ContextSet, Member, Message, QaError,
    RetrievalCandidate,
};
