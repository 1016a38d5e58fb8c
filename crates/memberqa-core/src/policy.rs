//! ============================================================================
//! Answer Policy - Grounded-vs-fallback decision over retrieved context
//! ============================================================================
//! Three terminal classes: EXPLICIT (fact directly stated), INFERRED
//! (reasonable inference, disclaimer enforced), NONE (fixed fallback
//! sentence). The prompt constrains the model's free-form output with
//! response markers, but the markers are advisory: classification and the
//! disclaimer prefix are enforced here after the call returns, never
//! trusted to the model. An empty context set short-circuits to NONE
//! without any model call, and a failed or timed-out generation degrades
//! to NONE instead of surfacing an error.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::providers::LanguageModel;
use crate::types::{AnswerClass, AnswerEnvelope, ContextSet};

/// Fixed sentence returned whenever no grounded answer exists
pub const NO_INFO_FALLBACK: &str = "I don't have any information about the question you asked.";

/// Fixed disclaimer prefixed to every inferred answer
pub const INFERRED_PREFIX: &str =
    "I don't have the exact information for this, but based on the available context, ";

/// Marker the prompt asks the model to lead explicit answers with
const EXPLICIT_MARKER: &str = "ANSWER:";
/// Marker for inference-based answers
const INFERRED_MARKER: &str = "INFERRED:";
/// Marker for "nothing relevant in the context"
const NO_INFO_MARKER: &str = "NO_INFO";

/// Decides the answer class and normalizes the model output
pub struct AnswerPolicy {
    llm: Arc<dyn LanguageModel>,
    call_timeout: Duration,
}

impl AnswerPolicy {
    pub fn new(llm: Arc<dyn LanguageModel>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Turn question + ranked context into the final envelope.
    ///
    /// Never returns an error: generation failures degrade to the NONE
    /// fallback sentence.
    pub async fn decide(
        &self,
        question: &str,
        context: &ContextSet,
        member_id_used: Option<String>,
    ) -> AnswerEnvelope {
        if context.is_empty() {
            // Nothing to ground on; skip the model call entirely
            debug!("Empty context set, short-circuiting to NONE");
            return AnswerEnvelope {
                answer_text: NO_INFO_FALLBACK.to_string(),
                class: AnswerClass::None,
                member_id_used,
                context_ids_used: Vec::new(),
            };
        }

        let prompt = build_prompt(question, context);
        let raw = match timeout(self.call_timeout, self.llm.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Generation failed, degrading to NONE: {}", e);
                return self.none_envelope(member_id_used);
            }
            Err(_) => {
                warn!("Generation timed out, degrading to NONE");
                return self.none_envelope(member_id_used);
            }
        };

        let (class, answer_text) = classify(&raw);
        debug!(?class, "Classified model response");

        let context_ids_used = match class {
            AnswerClass::None => Vec::new(),
            _ => context.message_ids(),
        };

        AnswerEnvelope {
            answer_text,
            class,
            member_id_used,
            context_ids_used,
        }
    }

    fn none_envelope(&self, member_id_used: Option<String>) -> AnswerEnvelope {
        AnswerEnvelope {
            answer_text: NO_INFO_FALLBACK.to_string(),
            class: AnswerClass::None,
            member_id_used,
            context_ids_used: Vec::new(),
        }
    }
}

/// Deterministic prompt: snippets in ContextSet order, never re-sorted
/// here, with the explicit -> inferred -> none hierarchy spelled out.
fn build_prompt(question: &str, context: &ContextSet) -> String {
    let mut snippets = String::new();
    for candidate in context.iter() {
        let stamp = candidate.message.timestamp.format("%Y-%m-%d %H:%M UTC");
        snippets.push_str(&format!("[{}] {}\n", stamp, candidate.message.text));
    }

    format!(
        "You are a careful assistant that answers questions about members, \
         using only the time-stamped messages below as evidence.\n\n\
         Context:\n{}\n\
         Question:\n{}\n\n\
         Follow these rules in order:\n\
         1. If the answer is directly stated in the context, reply on one line:\n\
         {} <concise factual answer>\n\
         2. Otherwise, if the context supports a reasonable inference, reply:\n\
         {} <your best inference>\n\
         3. Otherwise reply with exactly:\n\
         {}\n",
        snippets, question, EXPLICIT_MARKER, INFERRED_MARKER, NO_INFO_MARKER
    )
}

/// Map the model's free text onto exactly one class and normalize the text.
///
/// Markers are preferred; when the model drops them, heuristics on the
/// disclaimer/fallback phrasing keep the output in one of the three shapes.
fn classify(raw: &str) -> (AnswerClass, String) {
    let trimmed = raw.trim();

    if trimmed.is_empty() || trimmed.starts_with(NO_INFO_MARKER) {
        return (AnswerClass::None, NO_INFO_FALLBACK.to_string());
    }

    if let Some(rest) = trimmed.strip_prefix(EXPLICIT_MARKER) {
        let body = strip_disclaimers(rest.trim());
        if body.is_empty() {
            return (AnswerClass::None, NO_INFO_FALLBACK.to_string());
        }
        return (AnswerClass::Explicit, body);
    }

    if let Some(rest) = trimmed.strip_prefix(INFERRED_MARKER) {
        return inferred(rest);
    }

    // No marker: fall back to phrasing heuristics
    let lower = trimmed.to_lowercase();
    if lower.contains("don't have any information")
        || lower.contains("no relevant information")
        || lower == "no_info"
    {
        return (AnswerClass::None, NO_INFO_FALLBACK.to_string());
    }
    if lower.starts_with("i don't have the exact information") {
        return inferred(trimmed);
    }

    (AnswerClass::Explicit, trimmed.to_string())
}

/// Build a normalized inferred answer with exactly one disclaimer prefix
fn inferred(body: &str) -> (AnswerClass, String) {
    let stripped = strip_disclaimers(body.trim());
    if stripped.is_empty() {
        return (AnswerClass::None, NO_INFO_FALLBACK.to_string());
    }
    (AnswerClass::Inferred, format!("{}{}", INFERRED_PREFIX, stripped))
}

/// Remove any number of leading disclaimer prefixes the model produced
/// itself, so normalization never stacks duplicates
fn strip_disclaimers(text: &str) -> String {
    let prefix = INFERRED_PREFIX.trim_end();
    let mut rest = text.trim();
    while rest.len() >= prefix.len()
        && rest.is_char_boundary(prefix.len())
        && rest[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        rest = rest[prefix.len()..].trim_start();
    }
    rest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateSource, Message, RetrievalCandidate};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct ScriptedModel {
        response: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow!("simulated generation failure")),
            }
        }
    }

    fn context_with(texts: &[&str]) -> ContextSet {
        let candidates = texts
            .iter()
            .enumerate()
            .map(|(i, text)| RetrievalCandidate {
                message: Message {
                    id: Uuid::new_v4(),
                    member_id: "layla".to_string(),
                    member_name: "Layla".to_string(),
                    timestamp: Utc::now() - ChronoDuration::hours(i as i64 + 1),
                    text: text.to_string(),
                },
                score: 0.9,
                source: CandidateSource::Scoped,
            })
            .collect();
        ContextSet::new(candidates)
    }

    fn policy(model: Arc<ScriptedModel>) -> AnswerPolicy {
        AnswerPolicy::new(model, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_context_short_circuits() {
        let model = Arc::new(ScriptedModel::replying("ANSWER: should not be called"));
        let envelope = policy(model.clone())
            .decide("Where is Layla?", &ContextSet::default(), None)
            .await;

        assert_eq!(envelope.class, AnswerClass::None);
        assert_eq!(envelope.answer_text, NO_INFO_FALLBACK);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_to_none() {
        let model = Arc::new(ScriptedModel::failing());
        let context = context_with(&["I need a car service in London"]);
        let envelope = policy(model.clone())
            .decide("When is Layla going to London?", &context, Some("layla".into()))
            .await;

        assert_eq!(envelope.class, AnswerClass::None);
        assert_eq!(envelope.answer_text, NO_INFO_FALLBACK);
        assert_eq!(envelope.member_id_used.as_deref(), Some("layla"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_explicit_answer_passes_through() {
        let model = Arc::new(ScriptedModel::replying("ANSWER: Layla lives in London."));
        let context = context_with(&["I live in London now"]);
        let envelope = policy(model)
            .decide("Where does Layla live?", &context, Some("layla".into()))
            .await;

        assert_eq!(envelope.class, AnswerClass::Explicit);
        assert_eq!(envelope.answer_text, "Layla lives in London.");
        assert_eq!(envelope.context_ids_used.len(), 1);
    }

    #[tokio::test]
    async fn test_inferred_answer_gets_disclaimer() {
        let model = Arc::new(ScriptedModel::replying(
            "INFERRED: Layla is likely planning a trip soon.",
        ));
        let context = context_with(&["I need a car service and chauffeur in London"]);
        let envelope = policy(model)
            .decide("When is Layla planning to go to London?", &context, Some("layla".into()))
            .await;

        assert_eq!(envelope.class, AnswerClass::Inferred);
        assert!(envelope.answer_text.starts_with(INFERRED_PREFIX));
        assert!(envelope.answer_text.ends_with("planning a trip soon."));
    }

    #[tokio::test]
    async fn test_duplicate_disclaimers_collapse_to_one() {
        let doubled = format!(
            "INFERRED: {}{}she may travel next month.",
            INFERRED_PREFIX, INFERRED_PREFIX
        );
        let model = Arc::new(ScriptedModel::replying(&doubled));
        let context = context_with(&["talking about travel"]);
        let envelope = policy(model).decide("Question?", &context, None).await;

        assert_eq!(envelope.class, AnswerClass::Inferred);
        assert_eq!(
            envelope.answer_text,
            format!("{}she may travel next month.", INFERRED_PREFIX)
        );
    }

    #[tokio::test]
    async fn test_no_info_marker_maps_to_fallback() {
        let model = Arc::new(ScriptedModel::replying("NO_INFO"));
        let context = context_with(&["unrelated message"]);
        let envelope = policy(model).decide("Question?", &context, None).await;

        assert_eq!(envelope.class, AnswerClass::None);
        assert_eq!(envelope.answer_text, NO_INFO_FALLBACK);
        assert!(envelope.context_ids_used.is_empty());
    }

    #[tokio::test]
    async fn test_unmarked_disclaimer_phrasing_classified_inferred() {
        let model = Arc::new(ScriptedModel::replying(
            "I don't have the exact information for this, but based on the available context, \
             she is arranging transport in London.",
        ));
        let context = context_with(&["car service in London"]);
        let envelope = policy(model).decide("Question?", &context, None).await;

        assert_eq!(envelope.class, AnswerClass::Inferred);
        assert!(envelope.answer_text.starts_with(INFERRED_PREFIX));
        // Exactly one prefix
        assert_eq!(envelope.answer_text.matches("I don't have the exact").count(), 1);
    }

    #[test]
    fn test_prompt_preserves_context_order() {
        let context = context_with(&["first snippet", "second snippet"]);
        let prompt = build_prompt("a question", &context);
        let first = prompt.find("first snippet").unwrap();
        let second = prompt.find("second snippet").unwrap();
        assert!(first < second);
        assert!(prompt.contains("ANSWER:"));
        assert!(prompt.contains("NO_INFO"));
    }
}
