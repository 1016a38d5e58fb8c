//! ============================================================================
//! Member Resolver - Detects which member a question is about
//! ============================================================================
//! Two passes over the known member roster:
//! 1. Literal: word-bounded substring match of normalized names/aliases,
//!    longest match wins. A full name beats a first-name-only hit.
//! 2. Fuzzy: Jaro-Winkler between question tokens/phrases and names, gated
//!    by a threshold and a margin over the runner-up member so similarly
//!    named members never get misattributed on a near-tie.
//! Ambiguity at any point resolves to "no member": misattribution is worse
//! than admitting uncertainty, and an unresolved question falls back to a
//! global search anyway.
//! ============================================================================

use strsim::jaro_winkler;
use tracing::debug;

use crate::types::Member;

/// Fuzzy tokens shorter than this are skipped as noise
const MIN_FUZZY_TOKEN_LEN: usize = 3;

/// Resolves free-text questions to member identities
pub struct MemberResolver {
    fuzzy_threshold: f64,
    fuzzy_margin: f64,
}

impl MemberResolver {
    pub fn new(fuzzy_threshold: f64, fuzzy_margin: f64) -> Self {
        Self {
            fuzzy_threshold,
            fuzzy_margin,
        }
    }

    /// Resolve the member a question refers to, if any.
    ///
    /// Returns `None` when no name is mentioned or the mention is too
    /// ambiguous to attribute safely.
    pub fn resolve<'a>(&self, question: &str, members: &'a [Member]) -> Option<&'a Member> {
        let normalized_q = normalize(question);
        if normalized_q.is_empty() || members.is_empty() {
            return None;
        }

        if let Some(member) = self.literal_pass(&normalized_q, members) {
            debug!(member = %member.name, "Resolved member via literal match");
            return Some(member);
        }

        if let Some(member) = self.fuzzy_pass(&normalized_q, members) {
            debug!(member = %member.name, "Resolved member via fuzzy match");
            return Some(member);
        }

        debug!("No member detected; treating question as global");
        None
    }

    /// Contiguous substring matching over names, aliases, and name parts.
    /// Longest match wins; equal-length hits on distinct members are
    /// ambiguous and fall through to the fuzzy pass.
    fn literal_pass<'a>(&self, normalized_q: &str, members: &'a [Member]) -> Option<&'a Member> {
        let padded_q = format!(" {} ", normalized_q);

        let mut best: Option<(&Member, usize)> = None;
        let mut ambiguous = false;

        for member in members {
            for variant in name_variants(member) {
                if variant.is_empty() {
                    continue;
                }
                if !padded_q.contains(&format!(" {} ", variant)) {
                    continue;
                }
                match best {
                    Some((winner, len)) if variant.len() == len => {
                        // Same-length hit on another member is a tie
                        if !std::ptr::eq(winner, member) {
                            ambiguous = true;
                        }
                    }
                    Some((_, len)) if variant.len() > len => {
                        best = Some((member, variant.len()));
                        ambiguous = false;
                    }
                    None => {
                        best = Some((member, variant.len()));
                    }
                    _ => {}
                }
            }
        }

        if ambiguous {
            debug!("Literal pass ambiguous between equally long name matches");
            return None;
        }
        best.map(|(member, _)| member)
    }

    /// Score each member against question tokens and adjacent-token
    /// phrases; accept only a clear winner.
    fn fuzzy_pass<'a>(&self, normalized_q: &str, members: &'a [Member]) -> Option<&'a Member> {
        let tokens: Vec<&str> = normalized_q
            .split_whitespace()
            .filter(|t| t.len() >= MIN_FUZZY_TOKEN_LEN)
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let mut phrases: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        for pair in tokens.windows(2) {
            phrases.push(format!("{} {}", pair[0], pair[1]));
        }

        let mut best: Option<(&Member, f64)> = None;
        let mut second_best = 0.0f64;

        for member in members {
            let mut member_score = 0.0f64;
            for variant in name_variants(member) {
                for phrase in &phrases {
                    let score = jaro_winkler(&variant, phrase);
                    if score > member_score {
                        member_score = score;
                    }
                }
            }

            match best {
                Some((_, best_score)) if member_score > best_score => {
                    second_best = best_score;
                    best = Some((member, member_score));
                }
                Some((_, best_score)) => {
                    if member_score > second_best && member_score < best_score {
                        second_best = member_score;
                    } else if (member_score - best_score).abs() < f64::EPSILON {
                        // Exact tie with the leader
                        second_best = member_score;
                    }
                }
                None => {
                    best = Some((member, member_score));
                }
            }
        }

        let (member, score) = best?;
        if score < self.fuzzy_threshold {
            debug!(score, "Best fuzzy match below threshold");
            return None;
        }
        if score - second_best < self.fuzzy_margin {
            debug!(
                score,
                second_best, "Fuzzy match too close to runner-up; refusing to guess"
            );
            return None;
        }
        Some(member)
    }
}

/// Normalized name, aliases, and individual name parts for one member
fn name_variants(member: &Member) -> Vec<String> {
    let mut variants = Vec::new();
    let full = normalize(&member.name);
    for part in full.split_whitespace() {
        variants.push(part.to_string());
    }
    if !full.is_empty() {
        variants.push(full);
    }
    for alias in &member.aliases {
        let alias = normalize(alias);
        if !alias.is_empty() {
            variants.push(alias);
        }
    }
    variants
}

/// Normalize text for name matching: fold curly quotes, lowercase, strip
/// possessive suffixes, and keep only letters, digits, and spaces.
fn normalize(text: &str) -> String {
    let folded = text
        .replace(['\u{2019}', '\u{2018}', '`'], "'")
        .to_lowercase();

    let mut cleaned = String::with_capacity(folded.len());
    for token in folded.split_whitespace() {
        // Drop punctuation (keeping apostrophes) before looking for the
        // possessive suffix, so "Sophia's?" still reads as "sophia's"
        let token: String = token
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'')
            .collect();
        let token = token.strip_suffix("'s").unwrap_or(&token);
        let token: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        if !token.is_empty() {
            if !cleaned.is_empty() {
                cleaned.push(' ');
            }
            cleaned.push_str(&token);
        }
    }
    cleaned
}
