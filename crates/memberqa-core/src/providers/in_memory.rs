//! ============================================================================
//! In-Memory Vector Store - Brute-force cosine scan
//! ============================================================================
//! Good enough for tests and small corpora. Rebuilds swap the whole entry
//! list behind an RwLock, so searches either see the old index or the new
//! one, never a mix.
//! ============================================================================

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{cosine_similarity, IndexEntry, SearchHit, SearchScope, VectorStore};

/// Brute-force in-memory vector index
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Arc<Vec<IndexEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(&self, query: &[f32], scope: &SearchScope, k: usize) -> Result<Vec<SearchHit>> {
        let entries = self.entries.read().await.clone();

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|entry| match scope {
                SearchScope::Member(member_id) => entry.member_id == *member_id,
                SearchScope::All => true,
            })
            .map(|entry| SearchHit {
                message_id: entry.message_id,
                score: cosine_similarity(query, &entry.vector),
                vector: entry.vector.clone(),
            })
            .collect();

        // Deterministic: score descending, message id as the tie-break
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        hits.truncate(k);

        debug!(hits = hits.len(), ?scope, "In-memory search complete");
        Ok(hits)
    }

    async fn rebuild(&self, new_entries: Vec<IndexEntry>) -> Result<()> {
        let count = new_entries.len();
        let mut guard = self.entries.write().await;
        *guard = Arc::new(new_entries);
        debug!(count, "In-memory index rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(member: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            message_id: Uuid::new_v4(),
            member_id: member.to_string(),
            vector,
        }
    }

    #[tokio::test]
    async fn test_scoped_search_filters_by_member() {
        let store = InMemoryStore::new();
        store
            .rebuild(vec![
                entry("layla", vec![1.0, 0.0]),
                entry("thiago", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0], &SearchScope::Member("layla".into()), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let all = store.search(&[1.0, 0.0], &SearchScope::All, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_results_ordered_by_similarity() {
        let store = InMemoryStore::new();
        let close = entry("m", vec![1.0, 0.1]);
        let far = entry("m", vec![0.1, 1.0]);
        store.rebuild(vec![far, close.clone()]).await.unwrap();

        let hits = store.search(&[1.0, 0.0], &SearchScope::All, 10).await.unwrap();
        assert_eq!(hits[0].message_id, close.message_id);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_index() {
        let store = InMemoryStore::new();
        store.rebuild(vec![entry("m", vec![1.0])]).await.unwrap();
        store.rebuild(vec![]).await.unwrap();
        assert!(store.is_empty().await);
    }
}
