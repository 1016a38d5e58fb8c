//! ============================================================================
//! Core Types for MemberQA
//! ============================================================================
//! Defines the corpus records, per-query retrieval values, and the answer
//! envelope returned to callers. Corpus records are immutable after
//! ingestion; retrieval values live only for the duration of one question.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message from a member's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier across the whole corpus
    pub id: Uuid,
    /// Identifier of the member who wrote the message
    pub member_id: String,
    /// Display name of the member at ingestion time
    pub member_name: String,
    /// When the message was written
    pub timestamp: DateTime<Utc>,
    /// Message body (non-empty)
    pub text: String,
}

/// A known member of the corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Stable member identifier
    pub id: String,
    /// Canonical display name
    pub name: String,
    /// Alternate spellings or nicknames, if any
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Which retrieval stage produced a candidate.
/// Ordering doubles as ranking priority: scoped evidence beats global
/// fill-ins, which beat centroid-expansion finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Found by searching only the resolved member's messages
    Scoped,
    /// Found by the unrestricted fallback search
    Global,
    /// Found by re-querying with the centroid of earlier results
    Centroid,
}

impl CandidateSource {
    /// Rank position of this source tier (lower ranks first)
    pub fn priority(self) -> u8 {
        match self {
            CandidateSource::Scoped => 0,
            CandidateSource::Global => 1,
            CandidateSource::Centroid => 2,
        }
    }
}

/// A message surfaced by one retrieval stage, before dedup/ranking
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub message: Message,
    /// Cosine similarity against the stage's query vector
    pub score: f32,
    pub source: CandidateSource,
}

/// The ranked, deduplicated context handed to the answer policy.
///
/// Ordering is deterministic for identical corpus state and inputs:
/// source tier, then score descending, then recency, then message id.
#[derive(Debug, Clone, Default)]
pub struct ContextSet {
    candidates: Vec<RetrievalCandidate>,
}

impl ContextSet {
    pub fn new(candidates: Vec<RetrievalCandidate>) -> Self {
        Self { candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievalCandidate> {
        self.candidates.iter()
    }

    /// Message ids in final ranking order
    pub fn message_ids(&self) -> Vec<Uuid> {
        self.candidates.iter().map(|c| c.message.id).collect()
    }
}

/// Classification of the final answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerClass {
    /// The fact was directly stated in the retrieved context
    Explicit,
    /// The answer is a reasonable inference from the context
    Inferred,
    /// No relevant information was found
    None,
}

/// The response returned for every question.
///
/// Callers always receive a well-formed envelope; "no information" is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub answer_text: String,
    pub class: AnswerClass,
    /// Member the question was resolved to, when one was detected
    pub member_id_used: Option<String>,
    /// Ids of the context messages the answer was grounded on
    pub context_ids_used: Vec<Uuid>,
}

/// Errors surfaced by the engine.
///
/// Only corpus/configuration problems reach callers as hard failures;
/// per-question degradation (ambiguous member, slow search, failed
/// generation) is absorbed into the envelope instead.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("corpus is empty; the engine cannot answer anything")]
    EmptyCorpus,

    #[error("invalid message {id}: {reason}")]
    InvalidMessage { id: Uuid, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}
