//! Company name matching
//!
//! Resolves a free-text query to dataset entities through exact, word-subset
//! and fuzzy matching, ranks the candidates and refuses to auto-pick between
//! near-tied ones.

use crate::config::ConfigurationError;
use crate::normalizer;
use crate::similarity::{LevenshteinSimilarity, Similarity};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Unit of identity the matcher resolves to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyEntity {
    pub canonical_name: String,
    pub normalized_name: String,
    /// Raw names observed for this entity
    pub aliases: BTreeSet<String>,
    /// Normalized forms of `aliases`
    pub normalized_aliases: BTreeSet<String>,
}

impl CompanyEntity {
    /// Entity whose only alias is its own name
    pub fn new(canonical_name: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        let normalized_name = normalizer::normalize(&canonical_name);
        let mut entity = Self {
            canonical_name: canonical_name.clone(),
            normalized_name,
            aliases: BTreeSet::new(),
            normalized_aliases: BTreeSet::new(),
        };
        entity.add_alias(&canonical_name);
        entity
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.add_alias(alias);
        self
    }

    pub(crate) fn add_alias(&mut self, alias: &str) {
        let normalized = normalizer::normalize(alias);
        self.aliases.insert(alias.to_string());
        if !normalized.is_empty() {
            self.normalized_aliases.insert(normalized);
        }
    }

    fn words(&self) -> Vec<&str> {
        self.normalized_name.split_whitespace().collect()
    }
}

/// How a candidate was matched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    WordSubset,
    Fuzzy,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::WordSubset => write!(f, "word match"),
            MatchKind::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Ranked match candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub entity: CompanyEntity,
    pub confidence: f64,
    pub kind: MatchKind,
}

/// Result of resolving a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MatchOutcome {
    Unique(MatchCandidate),
    /// Near-tied candidates, best first. Always two or more.
    Ambiguous(Vec<MatchCandidate>),
    NoMatch,
}

/// Matcher tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates below this confidence are discarded
    pub min_confidence: f64,
    /// Runner-up within this distance of the leader makes the result ambiguous
    pub ambiguity_window: f64,
    /// Confidence of a word-subset match covering every entity word
    pub word_subset_ceiling: f64,
    /// Share of the uncovered fraction taken off a word-subset match
    pub extra_word_penalty: f64,
    /// Multiplier applied when the last query word only prefixes an entity word
    pub prefix_discount: f64,
    pub min_prefix_len: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            ambiguity_window: 0.05,
            word_subset_ceiling: 0.95,
            extra_word_penalty: 0.5,
            prefix_discount: 0.9,
            min_prefix_len: 3,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("matcher.min_confidence", self.min_confidence),
            ("matcher.ambiguity_window", self.ambiguity_window),
            ("matcher.word_subset_ceiling", self.word_subset_ceiling),
            ("matcher.extra_word_penalty", self.extra_word_penalty),
            ("matcher.prefix_discount", self.prefix_discount),
        ] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(ConfigurationError::WeightOutOfRange {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if self.word_subset_ceiling >= 1.0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "matcher.word_subset_ceiling".to_string(),
                reason: "must stay below an exact match".to_string(),
            });
        }
        Ok(())
    }
}

// Tolerance for comparing confidences
const EPSILON: f64 = 1e-9;

/// Name matcher
#[derive(Clone)]
pub struct Matcher {
    config: MatcherConfig,
    similarity: Arc<dyn Similarity>,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("config", &self.config)
            .field("similarity", &self.similarity.name())
            .finish()
    }
}

impl Matcher {
    /// Matcher with default configuration and Levenshtein similarity
    pub fn new() -> Self {
        Self::with_config(MatcherConfig::default())
    }

    pub fn with_config(config: MatcherConfig) -> Self {
        Self {
            config,
            similarity: Arc::new(LevenshteinSimilarity),
        }
    }

    /// Swap the fuzzy backend
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Score every entity against the query and return those clearing the
    /// confidence floor, best first.
    pub fn rank(&self, query: &str, entities: &[CompanyEntity]) -> Vec<MatchCandidate> {
        let normalized_query = normalizer::normalize(query);
        if normalized_query.is_empty() {
            return Vec::new();
        }
        let query_words: Vec<&str> = unique_words(&normalized_query);

        let mut candidates: Vec<MatchCandidate> = entities
            .iter()
            .filter(|e| !e.normalized_name.is_empty())
            .filter_map(|entity| {
                let (confidence, kind) =
                    self.score_entity(&normalized_query, &query_words, entity)?;
                if confidence + EPSILON < self.config.min_confidence {
                    return None;
                }
                Some(MatchCandidate {
                    entity: entity.clone(),
                    confidence: confidence.clamp(0.0, 1.0),
                    kind,
                })
            })
            .collect();

        candidates.sort_by(compare_candidates);
        debug!(
            query = %normalized_query,
            candidates = candidates.len(),
            "ranked match candidates"
        );
        candidates
    }

    /// Resolve a query to a single entity, an ambiguous set, or nothing
    pub fn resolve(&self, query: &str, entities: &[CompanyEntity]) -> MatchOutcome {
        let ranked = self.rank(query, entities);
        resolve_ranked(ranked, self.config.ambiguity_window)
    }

    /// Top `limit` candidates for type-ahead suggestions
    pub fn suggest(&self, query: &str, entities: &[CompanyEntity], limit: usize) -> Vec<MatchCandidate> {
        let mut ranked = self.rank(query, entities);
        ranked.truncate(limit);
        ranked
    }

    /// Score one entity by the first match kind that applies
    fn score_entity(
        &self,
        normalized_query: &str,
        query_words: &[&str],
        entity: &CompanyEntity,
    ) -> Option<(f64, MatchKind)> {
        if entity.normalized_name == normalized_query
            || entity.normalized_aliases.contains(normalized_query)
        {
            return Some((1.0, MatchKind::Exact));
        }

        if let Some(confidence) = self.word_subset_confidence(query_words, entity) {
            return Some((confidence, MatchKind::WordSubset));
        }

        let fuzzy = std::iter::once(entity.normalized_name.as_str())
            .chain(entity.normalized_aliases.iter().map(String::as_str))
            .map(|name| self.similarity.similarity(normalized_query, name))
            .fold(0.0_f64, f64::max);
        // Exact equality was ruled out above
        let fuzzy = fuzzy.min(1.0 - EPSILON);
        Some((fuzzy, MatchKind::Fuzzy))
    }

    /// Confidence when every query word appears among the entity's words.
    ///
    /// Scales with the share of distinct entity words the query covers, so a
    /// short query scores lower against long names and repeating or prefixing
    /// an already covered word adds nothing.
    fn word_subset_confidence(&self, query_words: &[&str], entity: &CompanyEntity) -> Option<f64> {
        let entity_words = entity.words();
        if query_words.is_empty() || entity_words.is_empty() {
            return None;
        }

        let distinct_entity_words: HashSet<&str> = entity_words.iter().copied().collect();
        let mut covered: HashSet<&str> = HashSet::new();
        let mut used_prefix = false;
        let last = query_words.len() - 1;
        for (i, word) in query_words.iter().enumerate() {
            if distinct_entity_words.contains(word) {
                covered.insert(*word);
                continue;
            }
            if i != last || word.chars().count() < self.config.min_prefix_len {
                return None;
            }
            let mut prefixed = entity_words.iter().filter(|ew| ew.starts_with(word));
            let first = prefixed.next()?;
            // Credit a word not yet covered when the prefix fits several
            let target = std::iter::once(first)
                .chain(prefixed)
                .find(|ew| !covered.contains(*ew))
                .unwrap_or(first);
            covered.insert(*target);
            used_prefix = true;
        }

        let coverage = covered.len() as f64 / distinct_entity_words.len() as f64;
        let mut confidence = self.config.word_subset_ceiling
            * (1.0 - (1.0 - coverage) * self.config.extra_word_penalty);
        if used_prefix {
            confidence *= self.config.prefix_discount;
        }
        Some(confidence)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the ambiguity policy to an already ranked candidate list.
///
/// An exact leader only ties with other exact candidates; otherwise every
/// candidate within `window` of the leader is surfaced when there is more
/// than one.
pub fn resolve_ranked(mut ranked: Vec<MatchCandidate>, window: f64) -> MatchOutcome {
    if ranked.is_empty() {
        return MatchOutcome::NoMatch;
    }

    let leader_confidence = ranked[0].confidence;
    let leader_exact = ranked[0].kind == MatchKind::Exact;
    let tied = ranked
        .iter()
        .skip(1)
        .take_while(|c| {
            let within = leader_confidence - c.confidence <= window + EPSILON;
            within && (!leader_exact || c.kind == MatchKind::Exact)
        })
        .count();

    if tied == 0 {
        return MatchOutcome::Unique(ranked.swap_remove(0));
    }
    ranked.truncate(tied + 1);
    MatchOutcome::Ambiguous(ranked)
}

/// Confidence desc, then shorter normalized name, then lexicographic
fn compare_candidates(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.entity.normalized_name.len().cmp(&b.entity.normalized_name.len()))
        .then_with(|| a.entity.normalized_name.cmp(&b.entity.normalized_name))
        .then_with(|| a.entity.canonical_name.cmp(&b.entity.canonical_name))
}

fn unique_words(normalized: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    normalized
        .split_whitespace()
        .filter(|w| seen.insert(*w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::TokenSortSimilarity;

    fn entities(names: &[&str]) -> Vec<CompanyEntity> {
        names.iter().map(|n| CompanyEntity::new(*n)).collect()
    }

    fn candidate(name: &str, confidence: f64, kind: MatchKind) -> MatchCandidate {
        MatchCandidate {
            entity: CompanyEntity::new(name),
            confidence,
            kind,
        }
    }

    #[test]
    fn test_exact_match() {
        let matcher = Matcher::new();
        let list = entities(&["Royal Dutch Shell plc", "Shell Energy Trading"]);
        match matcher.resolve("royal dutch shell, PLC.", &list) {
            MatchOutcome::Unique(c) => {
                assert_eq!(c.kind, MatchKind::Exact);
                assert_eq!(c.confidence, 1.0);
                assert_eq!(c.entity.canonical_name, "Royal Dutch Shell plc");
            }
            other => panic!("expected unique match, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_match_is_exact() {
        let matcher = Matcher::new();
        let list = vec![CompanyEntity::new("Petróleo Brasileiro S.A.").with_alias("Petrobras")];
        let ranked = matcher.rank("PETROBRAS", &list);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].kind, MatchKind::Exact);
    }

    #[test]
    fn test_exact_outranks_fuzzy() {
        let matcher = Matcher::new();
        let list = entities(&["Glencore", "Glencor Mining"]);
        let ranked = matcher.rank("glencore", &list);
        assert_eq!(ranked[0].entity.normalized_name, "glencore");
        assert_eq!(ranked[0].kind, MatchKind::Exact);
        assert!(ranked.iter().skip(1).all(|c| c.confidence < 1.0));
    }

    #[test]
    fn test_word_subset_scales_down_with_extra_words() {
        let matcher = Matcher::new();
        let list = entities(&["Shell Trading", "Shell River Power", "Shell River Power Trading"]);
        let ranked = matcher.rank("shell", &list);
        let conf = |name: &str| {
            ranked
                .iter()
                .find(|c| c.entity.normalized_name == name)
                .map(|c| c.confidence)
        };
        let two = conf("shell trading").unwrap();
        let three = conf("shell river power").unwrap();
        assert!(two > three);
        // four words falls under the floor
        assert!(conf("shell river power trading").is_none());
        assert!(ranked.iter().all(|c| c.kind == MatchKind::WordSubset));
    }

    #[test]
    fn test_shell_plc_beats_long_group_name() {
        let matcher = Matcher::new();
        let list = entities(&["Shell plc", "Shell River Holdings Group"]);
        let ranked = matcher.rank("Shell", &list);
        assert_eq!(ranked[0].entity.canonical_name, "Shell plc");
        assert!(ranked
            .iter()
            .filter(|c| c.entity.canonical_name == "Shell River Holdings Group")
            .all(|c| c.confidence < ranked[0].confidence));
    }

    #[test]
    fn test_word_subset_order_independent() {
        let matcher = Matcher::new();
        let list = entities(&["Royal Dutch Shell"]);
        let ranked = matcher.rank("Shell Royal Dutch", &list);
        assert_eq!(ranked[0].kind, MatchKind::WordSubset);
        assert!((ranked[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_on_last_word() {
        let matcher = Matcher::new();
        let list = entities(&["Adani Enterprises"]);
        let ranked = matcher.rank("adani enter", &list);
        assert_eq!(ranked[0].kind, MatchKind::WordSubset);
        assert!(ranked[0].confidence < 0.95);

        // too short to count as a prefix
        let ranked = matcher.rank("adani en", &list);
        assert!(ranked.iter().all(|c| c.kind != MatchKind::WordSubset));
    }

    #[test]
    fn test_prefix_of_covered_word_adds_no_coverage() {
        let matcher = Matcher::new();
        let list = entities(&["Shell Energy"]);
        let single = matcher.rank("shell", &list);
        let padded = matcher.rank("shell she", &list);
        assert_eq!(single[0].kind, MatchKind::WordSubset);
        assert!((single[0].confidence - 0.7125).abs() < 1e-9);
        // "she" only prefixes the already covered "shell"
        assert!(padded.iter().all(|c| c.confidence <= single[0].confidence));

        let completed = matcher.rank("shell ener", &list);
        assert!((completed[0].confidence - 0.855).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_typo() {
        let matcher = Matcher::new();
        let list = entities(&["Glencore", "Vale"]);
        let ranked = matcher.rank("Glencoer", &list);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].kind, MatchKind::Fuzzy);
        assert!(ranked[0].confidence >= 0.6 && ranked[0].confidence < 1.0);
    }

    #[test]
    fn test_no_match() {
        let matcher = Matcher::new();
        let list = entities(&["Shell plc", "Glencore", "Vale S.A."]);
        assert!(matches!(
            matcher.resolve("Zzzznotacompany123", &list),
            MatchOutcome::NoMatch
        ));
    }

    #[test]
    fn test_empty_query_never_matches() {
        let matcher = Matcher::new();
        let list = entities(&["Shell plc"]);
        assert!(matcher.rank("   ", &list).is_empty());
        assert!(matcher.rank("--", &list).is_empty());
    }

    #[test]
    fn test_ambiguous_near_tie() {
        let ranked = vec![
            candidate("Shell plc", 0.95, MatchKind::WordSubset),
            candidate("Shell Energy Trading", 0.92, MatchKind::WordSubset),
            candidate("Shellfish Co", 0.70, MatchKind::Fuzzy),
        ];
        match resolve_ranked(ranked, 0.05) {
            MatchOutcome::Ambiguous(c) => {
                let names: Vec<&str> =
                    c.iter().map(|c| c.entity.canonical_name.as_str()).collect();
                assert_eq!(names, vec!["Shell plc", "Shell Energy Trading"]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_clear_leader_is_unique() {
        let ranked = vec![
            candidate("Shell plc", 0.95, MatchKind::WordSubset),
            candidate("Shell Energy Trading", 0.85, MatchKind::WordSubset),
        ];
        assert!(matches!(resolve_ranked(ranked, 0.05), MatchOutcome::Unique(_)));
    }

    #[test]
    fn test_exact_leader_not_ambiguous_with_subset() {
        let ranked = vec![
            candidate("Royal Dutch Shell", 1.0, MatchKind::Exact),
            candidate("Shell Royal Dutch", 0.95, MatchKind::WordSubset),
        ];
        assert!(matches!(resolve_ranked(ranked, 0.05), MatchOutcome::Unique(_)));

        let ranked = vec![
            candidate("Vale", 1.0, MatchKind::Exact),
            candidate("Vale Base Metals", 1.0, MatchKind::Exact),
        ];
        assert!(matches!(resolve_ranked(ranked, 0.05), MatchOutcome::Ambiguous(_)));
    }

    #[test]
    fn test_resolve_ambiguous_end_to_end() {
        let matcher = Matcher::new();
        let list = entities(&["Shell Energy", "Shell Trading", "BP"]);
        match matcher.resolve("shell", &list) {
            MatchOutcome::Ambiguous(c) => assert_eq!(c.len(), 2),
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_ranking_tie_breaks() {
        let matcher = Matcher::new();
        let list = entities(&["Shell Zeta", "Shell Beta", "Shell Alpha Beta"]);
        let ranked = matcher.rank("shell", &list);
        let names: Vec<&str> = ranked.iter().map(|c| c.entity.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["shell beta", "shell zeta", "shell alpha beta"]);
    }

    #[test]
    fn test_suggest_limit() {
        let matcher = Matcher::new();
        let list = entities(&["Shell Energy", "Shell Trading", "Shell Gas"]);
        assert_eq!(matcher.suggest("shell", &list, 2).len(), 2);
    }

    #[test]
    fn test_swappable_similarity() {
        let matcher = Matcher::new().with_similarity(Arc::new(TokenSortSimilarity));
        let list = entities(&["Dutch Royal Petroleum"]);
        // word subset fails on the typo, token sort still scores it high
        let ranked = matcher.rank("royal dutch petroleom", &list);
        assert_eq!(ranked[0].kind, MatchKind::Fuzzy);
        assert!(ranked[0].confidence > 0.9);
    }

    #[test]
    fn test_config_validation() {
        assert!(MatcherConfig::default().validate().is_ok());
        let config = MatcherConfig {
            min_confidence: 1.5,
            ..MatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::WeightOutOfRange { .. })
        ));
    }
}
