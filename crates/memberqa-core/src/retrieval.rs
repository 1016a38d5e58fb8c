//! ============================================================================
//! Retrieval Engine - Multi-stage semantic search over the message corpus
//! ============================================================================
//! Stages, in order:
//! 1. Scoped search over the resolved member's messages
//! 2. Global fallback fill when scoped results come up short
//! 3. Centroid expansion: re-query with the mean vector of the result set
//!    to surface topically adjacent messages the question's phrasing misses
//! 4. Dedup by message id (most specific source, highest score survives)
//! 5. Final ranking: source tier, score descending, recency, message id
//!
//! Slow or failing searches degrade to a smaller (possibly empty) context
//! set; retrieval never fails a question outright.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QaConfig;
use crate::index::CorpusSnapshot;
use crate::providers::{SearchHit, SearchScope, VectorStore};
use crate::types::{CandidateSource, ContextSet, RetrievalCandidate};

/// One deduplicated hit, before message resolution
struct MergedHit {
    score: f32,
    source: CandidateSource,
    vector: Vec<f32>,
}

/// Executes the staged similarity search
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    config: QaConfig,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn VectorStore>, config: QaConfig) -> Self {
        Self { store, config }
    }

    /// Retrieve the ranked context for a question.
    ///
    /// Deterministic for identical corpus state and inputs. An empty result
    /// is a normal outcome, not an error.
    pub async fn retrieve(
        &self,
        question_vector: &[f32],
        member_id: Option<&str>,
        snapshot: &CorpusSnapshot,
    ) -> ContextSet {
        let k = self.config.top_k;
        let mut merged: HashMap<Uuid, MergedHit> = HashMap::new();

        // Stage 1: scoped search, only when a member was resolved
        let scope = match member_id {
            Some(id) => {
                let scope = SearchScope::Member(id.to_string());
                let hits = self.search_stage(question_vector, &scope, k).await;
                merge_hits(&mut merged, hits, CandidateSource::Scoped);
                scope
            }
            None => SearchScope::All,
        };

        // Stage 2: global fill when scoped results fall short of k. With no
        // resolved member this is the primary search, not a fallback, so the
        // switch does not gate it.
        if merged.len() < k && (self.config.global_fallback || member_id.is_none()) {
            let hits = self.search_stage(question_vector, &SearchScope::All, k).await;
            merge_hits(&mut merged, hits, CandidateSource::Global);
        }

        // Stage 3: centroid expansion within the original scope
        if self.config.centroid_expansion && !merged.is_empty() {
            let centroid = centroid_of(merged.values().map(|h| h.vector.as_slice()));
            if let Some(centroid) = centroid {
                let hits = self.search_stage(&centroid, &scope, k).await;
                merge_hits(&mut merged, hits, CandidateSource::Centroid);
            }
        }

        // Stages 4/5: dedup already folded into the merge; rank and truncate
        let mut candidates: Vec<RetrievalCandidate> = merged
            .into_iter()
            .filter_map(|(id, hit)| {
                let message = match snapshot.message(&id) {
                    Some(m) => m.clone(),
                    None => {
                        warn!(%id, "Search hit references a message missing from the snapshot");
                        return None;
                    }
                };
                Some(RetrievalCandidate {
                    message,
                    score: hit.score,
                    source: hit.source,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.source
                .priority()
                .cmp(&b.source.priority())
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| b.message.timestamp.cmp(&a.message.timestamp))
                .then_with(|| a.message.id.cmp(&b.message.id))
        });
        candidates.truncate(k);

        debug!(
            count = candidates.len(),
            member = member_id.unwrap_or("<global>"),
            "Retrieval complete"
        );
        ContextSet::new(candidates)
    }

    /// Run one similarity search, dropping hits below the similarity floor.
    /// Timeouts and store errors degrade to an empty stage result.
    async fn search_stage(&self, query: &[f32], scope: &SearchScope, k: usize) -> Vec<SearchHit> {
        let result = timeout(
            self.config.provider_timeout,
            self.store.search(query, scope, k),
        )
        .await;

        let hits = match result {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(?scope, "Vector search failed, degrading to empty stage: {}", e);
                return Vec::new();
            }
            Err(_) => {
                warn!(?scope, "Vector search timed out, degrading to empty stage");
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter(|hit| hit.score >= self.config.similarity_floor)
            .collect()
    }
}

/// Fold stage hits into the deduplicated result map. On a repeat id the
/// more specific source wins and the higher of the two scores survives,
/// so the result is the same whatever order stages merge in.
fn merge_hits(merged: &mut HashMap<Uuid, MergedHit>, hits: Vec<SearchHit>, source: CandidateSource) {
    for hit in hits {
        match merged.get_mut(&hit.message_id) {
            Some(existing) => {
                if source.priority() < existing.source.priority() {
                    existing.source = source;
                    existing.score = existing.score.max(hit.score);
                } else if source == existing.source && hit.score > existing.score {
                    existing.score = hit.score;
                }
            }
            None => {
                merged.insert(
                    hit.message_id,
                    MergedHit {
                        score: hit.score,
                        source,
                        vector: hit.vector,
                    },
                );
            }
        }
    }
}

/// Mean vector of the given set; `None` when the set is empty or the
/// dimensions disagree
fn centroid_of<'a>(vectors: impl Iterator<Item = &'a [f32]>) -> Option<Vec<f32>> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;

    for vector in vectors {
        if sum.is_empty() {
            sum = vector.to_vec();
        } else {
            if sum.len() != vector.len() {
                return None;
            }
            for (acc, v) in sum.iter_mut().zip(vector.iter()) {
                *acc += v;
            }
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    for v in sum.iter_mut() {
        *v /= count as f32;
    }
    Some(sum)
}
