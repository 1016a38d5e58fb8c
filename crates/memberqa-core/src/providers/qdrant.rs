//! ============================================================================
//! Qdrant Vector Store - Production similarity index
//! ============================================================================
//! One cosine collection of message vectors, with the owning member id kept
//! in the payload so scoped searches are a server-side filter.
//! ============================================================================

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, points_selector::PointsSelectorOneOf,
    vectors_output::VectorsOptions,
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{IndexEntry, SearchHit, SearchScope, VectorStore};

/// Collection name for message vectors
pub const COLLECTION_NAME: &str = "member_messages";

/// Upsert batch size during rebuild
const REBUILD_BATCH_SIZE: usize = 64;

/// Vector store backed by a Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant and ensure the collection exists
    pub async fn new(url: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        let store = Self { client, dimension };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(COLLECTION_NAME)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if !exists {
            info!("Creating collection: {}", COLLECTION_NAME);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| anyhow!("Failed to create collection: {}", e))?;
        } else {
            debug!("Collection {} already exists", COLLECTION_NAME);
        }

        Ok(())
    }

    fn scope_filter(scope: &SearchScope) -> Option<Filter> {
        match scope {
            SearchScope::Member(member_id) => Some(Filter::must([Condition::matches(
                "member_id",
                member_id.clone(),
            )])),
            SearchScope::All => None,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(&self, query: &[f32], scope: &SearchScope, k: usize) -> Result<Vec<SearchHit>> {
        debug!(?scope, k, "Searching Qdrant");

        let mut builder = SearchPointsBuilder::new(COLLECTION_NAME, query.to_vec(), k as u64)
            .with_payload(true)
            .with_vectors(true);
        if let Some(filter) = Self::scope_filter(scope) {
            builder = builder.filter(filter);
        }

        let search_result = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| anyhow!("Failed to search points: {}", e))?;

        let hits: Vec<SearchHit> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let message_id = extract_uuid(point.id?)?;
                let vector = match point.vectors?.vectors_options? {
                    VectorsOptions::Vector(v) => v.data,
                    VectorsOptions::Vectors(_) => return None,
                };
                Some(SearchHit {
                    message_id,
                    score: point.score,
                    vector,
                })
            })
            .collect();

        debug!(hits = hits.len(), "Qdrant search complete");
        Ok(hits)
    }

    async fn rebuild(&self, entries: Vec<IndexEntry>) -> Result<()> {
        info!("Rebuilding Qdrant index with {} entries", entries.len());

        self.ensure_collection().await?;

        // Empty filter matches every point; clears leftovers from the
        // previous generation before the fresh upsert.
        self.client
            .delete_points(
                DeletePointsBuilder::new(COLLECTION_NAME)
                    .points(PointsSelectorOneOf::Filter(Filter::default())),
            )
            .await
            .map_err(|e| anyhow!("Failed to clear collection: {}", e))?;

        for batch in entries.chunks(REBUILD_BATCH_SIZE) {
            let points: Vec<PointStruct> = batch
                .iter()
                .map(|entry| {
                    let payload: HashMap<String, Value> = [(
                        "member_id".to_string(),
                        Value::from(entry.member_id.clone()),
                    )]
                    .into_iter()
                    .collect();
                    PointStruct::new(entry.message_id.to_string(), entry.vector.clone(), payload)
                })
                .collect();

            self.client
                .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, points))
                .await
                .map_err(|e| anyhow!("Failed to upsert batch: {}", e))?;
        }

        info!("Qdrant index rebuild complete");
        Ok(())
    }
}

fn extract_uuid(point_id: qdrant_client::qdrant::PointId) -> Option<Uuid> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok(),
        PointIdOptions::Num(_) => None,
    }
}
