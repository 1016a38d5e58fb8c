//! ============================================================================
//! Corpus Snapshot - Immutable corpus generation with atomic publish
//! ============================================================================
//! The corpus is read-only during query processing. Rebuilds construct a
//! complete new snapshot off to the side and publish it with a single swap,
//! so concurrent questions always see the last fully built generation and
//! never a half-built index.
//! ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Member, Message, QaError};

/// One fully built, immutable generation of the corpus
#[derive(Debug)]
pub struct CorpusSnapshot {
    messages: HashMap<Uuid, Message>,
    /// Roster in deterministic (name-sorted) order
    members: Vec<Member>,
    /// Monotonic generation counter, for logging
    generation: u64,
}

impl CorpusSnapshot {
    /// Validate the corpus invariants and build a snapshot.
    ///
    /// An empty corpus is a startup-level failure: the engine cannot answer
    /// anything without messages to ground on. Duplicate ids, empty texts,
    /// and future timestamps are rejected as ingestion bugs.
    pub fn build(messages: Vec<Message>, generation: u64) -> Result<Self, QaError> {
        if messages.is_empty() {
            return Err(QaError::EmptyCorpus);
        }

        let now = Utc::now();
        let mut by_id = HashMap::with_capacity(messages.len());
        // BTreeMap keeps the roster order deterministic across rebuilds
        let mut roster: BTreeMap<String, Member> = BTreeMap::new();

        for message in messages {
            if message.text.trim().is_empty() {
                return Err(QaError::InvalidMessage {
                    id: message.id,
                    reason: "empty text".into(),
                });
            }
            if message.timestamp > now {
                return Err(QaError::InvalidMessage {
                    id: message.id,
                    reason: format!("timestamp {} is in the future", message.timestamp),
                });
            }

            roster
                .entry(message.member_name.clone())
                .or_insert_with(|| Member {
                    id: message.member_id.clone(),
                    name: message.member_name.clone(),
                    aliases: Vec::new(),
                });

            let id = message.id;
            if by_id.insert(id, message).is_some() {
                return Err(QaError::InvalidMessage {
                    id,
                    reason: "duplicate message id".into(),
                });
            }
        }

        let members: Vec<Member> = roster.into_values().collect();
        debug!(
            messages = by_id.len(),
            members = members.len(),
            generation,
            "Built corpus snapshot"
        );

        Ok(Self {
            messages: by_id,
            members,
            generation,
        })
    }

    pub fn message(&self, id: &Uuid) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shared handle readers load snapshots from.
///
/// Readers clone the inner `Arc` and keep using their generation even while
/// a rebuild publishes the next one.
pub struct SnapshotHandle {
    current: RwLock<Arc<CorpusSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: CorpusSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Get the last published generation
    pub async fn load(&self) -> Arc<CorpusSnapshot> {
        self.current.read().await.clone()
    }

    /// Atomically publish a new generation
    pub async fn publish(&self, snapshot: CorpusSnapshot) {
        let generation = snapshot.generation();
        let mut guard = self.current.write().await;
        *guard = Arc::new(snapshot);
        info!(generation, "Published corpus snapshot");
    }
}
