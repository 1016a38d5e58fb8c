//! ============================================================================
//! QA Engine - Question answering pipeline over member message history
//! ============================================================================
//! Wires the pipeline together: resolve the member, embed the question,
//! run the staged retrieval, and hand the ranked context to the answer
//! policy. `answer` always returns a well-formed envelope; the only hard
//! failures live in construction and rebuild (empty corpus, bad config,
//! failed indexing), where the engine cannot function at all.
//! ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::QaConfig;
use crate::index::{CorpusSnapshot, SnapshotHandle};
use crate::policy::AnswerPolicy;
use crate::providers::{EmbeddingProvider, IndexEntry, LanguageModel, VectorStore};
use crate::resolver::MemberResolver;
use crate::retrieval::RetrievalEngine;
use crate::types::{AnswerEnvelope, ContextSet, Message, QaError};

/// The single entry point callers interact with
pub struct QaEngine {
    config: QaConfig,
    resolver: MemberResolver,
    retrieval: RetrievalEngine,
    policy: AnswerPolicy,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    snapshots: SnapshotHandle,
    generation: AtomicU64,
    /// Serializes rebuilds; queries are unaffected and keep reading the
    /// last published snapshot
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl QaEngine {
    /// Build the engine from an ingested corpus and the three capability
    /// implementations. Embeds and indexes the whole corpus before
    /// returning, so a successfully constructed engine is ready to answer.
    pub async fn new(
        messages: Vec<Message>,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        config: QaConfig,
    ) -> Result<Self, QaError> {
        config.validate()?;

        let snapshot = CorpusSnapshot::build(messages, 0)?;
        index_snapshot(embeddings.as_ref(), store.as_ref(), &snapshot).await?;

        info!(
            messages = snapshot.message_count(),
            members = snapshot.members().len(),
            "QA engine ready"
        );

        Ok(Self {
            resolver: MemberResolver::new(config.fuzzy_threshold, config.fuzzy_margin),
            retrieval: RetrievalEngine::new(store.clone(), config.clone()),
            policy: AnswerPolicy::new(llm, config.provider_timeout),
            embeddings,
            store,
            snapshots: SnapshotHandle::new(snapshot),
            generation: AtomicU64::new(0),
            rebuild_lock: tokio::sync::Mutex::new(()),
            config,
        })
    }

    /// Answer a natural-language question about a member.
    ///
    /// Never fails for ordinary "no information" situations; every
    /// degradation path ends in a NONE-class envelope.
    pub async fn answer(&self, question: &str) -> AnswerEnvelope {
        let snapshot = self.snapshots.load().await;

        let member = self.resolver.resolve(question, snapshot.members());
        let member_id = member.map(|m| m.id.clone());
        debug!(
            member = member.map(|m| m.name.as_str()).unwrap_or("<none>"),
            "Answering question"
        );

        // Anchor the query to the member's name so scoped phrasing helps
        // the similarity search, mirroring how the messages were written
        let query_text = match member {
            Some(m) => format!("{}: {}", m.name, question),
            None => question.to_string(),
        };

        let context = match self.embed_question(&query_text).await {
            Some(vector) => {
                self.retrieval
                    .retrieve(&vector, member_id.as_deref(), &snapshot)
                    .await
            }
            // Embedding failed or timed out: nothing to search with,
            // degrade to an empty context
            None => ContextSet::default(),
        };

        self.policy.decide(question, &context, member_id).await
    }

    /// Rebuild the corpus and vector index from a fresh message set.
    ///
    /// Builds the new generation completely, then publishes it with one
    /// swap. Queries running concurrently keep the previous snapshot.
    pub async fn rebuild(&self, messages: Vec<Message>) -> Result<(), QaError> {
        let _exclusive = self.rebuild_lock.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Rebuilding corpus");

        let snapshot = CorpusSnapshot::build(messages, generation)?;
        index_snapshot(self.embeddings.as_ref(), self.store.as_ref(), &snapshot).await?;
        self.snapshots.publish(snapshot).await;
        Ok(())
    }

    /// The last published snapshot, for callers that report corpus stats
    pub async fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.snapshots.load().await
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    async fn embed_question(&self, text: &str) -> Option<Vec<f32>> {
        match timeout(self.config.provider_timeout, self.embeddings.embed(text)).await {
            Ok(Ok(vector)) => Some(vector),
            Ok(Err(e)) => {
                warn!("Question embedding failed, degrading to empty context: {}", e);
                None
            }
            Err(_) => {
                warn!("Question embedding timed out, degrading to empty context");
                None
            }
        }
    }
}

/// Embed every message of a snapshot and rebuild the vector index.
/// Deterministic iteration order keeps indexing reproducible.
async fn index_snapshot(
    embeddings: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    snapshot: &CorpusSnapshot,
) -> Result<(), QaError> {
    let mut messages: Vec<&Message> = snapshot.messages().collect();
    messages.sort_by_key(|m| m.id);

    let texts: Vec<String> = messages.iter().map(|m| m.text.clone()).collect();
    let vectors = embeddings.embed_batch(&texts).await?;
    if vectors.len() != messages.len() {
        return Err(QaError::Config(format!(
            "embedding provider returned {} vectors for {} messages",
            vectors.len(),
            messages.len()
        )));
    }

    let entries: Vec<IndexEntry> = messages
        .iter()
        .zip(vectors)
        .map(|(message, vector)| IndexEntry {
            message_id: message.id,
            member_id: message.member_id.clone(),
            vector,
        })
        .collect();

    store.rebuild(entries).await?;
    debug!(generation = snapshot.generation(), "Vector index rebuilt");
    Ok(())
}
