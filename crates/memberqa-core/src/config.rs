//! ============================================================================
//! Configuration for the MemberQA engine
//! ============================================================================
//! Retrieval and answer-policy tunables, with environment overrides.
//! The fuzzy threshold/margin and the similarity floor are policy constants
//! meant to be tuned against a labeled set of member-attribution questions,
//! so they are configuration rather than hard-coded values.
//! ============================================================================

use std::time::Duration;

use crate::types::QaError;

/// Default number of context snippets handed to the answer policy.
/// Single-digit on purpose: precision over recall.
pub const DEFAULT_TOP_K: usize = 5;

/// Default minimum cosine similarity for a candidate to count as relevant
pub const DEFAULT_SIMILARITY_FLOOR: f32 = 0.25;

/// Default Jaro-Winkler acceptance threshold for fuzzy name matches
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.84;

/// Default lead the best fuzzy match must hold over the runner-up member
pub const DEFAULT_FUZZY_MARGIN: f64 = 0.05;

/// Default timeout for any single provider call (embed, search, generate)
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct QaConfig {
    /// Number of context snippets to retain after ranking
    pub top_k: usize,
    /// Candidates scoring below this cosine similarity are discarded
    pub similarity_floor: f32,
    /// Minimum Jaro-Winkler score for the fuzzy resolver pass
    pub fuzzy_threshold: f64,
    /// Required lead over the second-best member in the fuzzy pass
    pub fuzzy_margin: f64,
    /// Fill with an unrestricted search when scoped results fall short
    pub global_fallback: bool,
    /// Re-query with the centroid of found results for enrichment
    pub centroid_expansion: bool,
    /// Timeout applied to every embed/search/generate call
    pub provider_timeout: Duration,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fuzzy_margin: DEFAULT_FUZZY_MARGIN,
            global_fallback: true,
            centroid_expansion: true,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl QaConfig {
    /// Build a config from defaults plus `MEMBERQA_*` environment overrides.
    ///
    /// Unset variables keep their defaults; malformed values are a
    /// configuration error (the one class allowed to fail loudly).
    pub fn from_env() -> Result<Self, QaError> {
        let mut config = Self::default();

        if let Some(v) = read_env("MEMBERQA_TOP_K")? {
            config.top_k = parse_env("MEMBERQA_TOP_K", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_SIMILARITY_FLOOR")? {
            config.similarity_floor = parse_env("MEMBERQA_SIMILARITY_FLOOR", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_FUZZY_THRESHOLD")? {
            config.fuzzy_threshold = parse_env("MEMBERQA_FUZZY_THRESHOLD", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_FUZZY_MARGIN")? {
            config.fuzzy_margin = parse_env("MEMBERQA_FUZZY_MARGIN", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_GLOBAL_FALLBACK")? {
            config.global_fallback = parse_env("MEMBERQA_GLOBAL_FALLBACK", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_CENTROID_EXPANSION")? {
            config.centroid_expansion = parse_env("MEMBERQA_CENTROID_EXPANSION", &v)?;
        }
        if let Some(v) = read_env("MEMBERQA_PROVIDER_TIMEOUT_SECS")? {
            let secs: u64 = parse_env("MEMBERQA_PROVIDER_TIMEOUT_SECS", &v)?;
            config.provider_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), QaError> {
        if self.top_k == 0 {
            return Err(QaError::Config("top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_floor) {
            return Err(QaError::Config(
                "similarity_floor must be within [0.0, 1.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(QaError::Config(
                "fuzzy_threshold must be within [0.0, 1.0]".into(),
            ));
        }
        if self.fuzzy_margin < 0.0 || self.fuzzy_margin > 1.0 {
            return Err(QaError::Config(
                "fuzzy_margin must be within [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Result<Option<String>, QaError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(QaError::Config(format!("{}: {}", key, e))),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, QaError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QaError::Config(format!("{}: invalid value '{}': {}", key, value, e)))
}
