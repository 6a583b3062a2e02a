//! Sanctions cross-check
//!
//! Screens a company against the debarment and sanctions lists carried by a
//! dataset snapshot. A hit annotates the assessment and tightens the
//! recommendation. It never changes the score or the tier.

use crate::config::ConfigurationError;
use crate::matcher::{CompanyEntity, MatchCandidate, MatchKind, Matcher, MatcherConfig};
use crate::normalizer;
use crate::similarity::Similarity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Sanctions list source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SanctionsList {
    /// World Bank listing of ineligible firms and individuals
    WorldBank,
    Custom(String),
}

impl SanctionsList {
    pub fn name(&self) -> &str {
        match self {
            SanctionsList::WorldBank => "World Bank Debarment",
            SanctionsList::Custom(name) => name,
        }
    }
}

impl fmt::Display for SanctionsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One listed name as loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanctionsEntry {
    pub list: SanctionsList,
    pub name: String,
}

impl SanctionsEntry {
    pub fn new(list: SanctionsList, name: impl Into<String>) -> Self {
        Self {
            list,
            name: name.into(),
        }
    }
}

/// Read-only index of sanctioned firms, grouped by normalized name
#[derive(Debug, Clone, Default)]
pub struct SanctionsRegister {
    entries: Vec<SanctionsEntry>,
    entities: Vec<CompanyEntity>,
    /// normalized name -> lists naming the firm
    lists: BTreeMap<String, BTreeSet<SanctionsList>>,
}

impl SanctionsRegister {
    /// Entries whose name normalizes to nothing are dropped
    pub fn build(entries: Vec<SanctionsEntry>) -> Self {
        let mut groups: BTreeMap<String, (CompanyEntity, BTreeSet<SanctionsList>)> = BTreeMap::new();
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries {
            let normalized = normalizer::normalize(&entry.name);
            if normalized.is_empty() {
                debug!(name = %entry.name, "skipped blank sanctions entry");
                continue;
            }
            let group = groups
                .entry(normalized)
                .or_insert_with(|| (CompanyEntity::new(entry.name.as_str()), BTreeSet::new()));
            group.0.add_alias(&entry.name);
            group.1.insert(entry.list.clone());
            kept.push(entry);
        }

        let mut entities = Vec::with_capacity(groups.len());
        let mut lists = BTreeMap::new();
        for (key, (entity, sources)) in groups {
            entities.push(entity);
            lists.insert(key, sources);
        }

        Self {
            entries: kept,
            entities,
            lists,
        }
    }

    /// Listed firms sorted by normalized name
    pub fn entities(&self) -> &[CompanyEntity] {
        &self.entities
    }

    /// Entries in load order
    pub fn entries(&self) -> &[SanctionsEntry] {
        &self.entries
    }

    pub fn lists_for(&self, entity: &CompanyEntity) -> Vec<SanctionsList> {
        self.lists
            .get(&entity.normalized_name)
            .map(|lists| lists.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Screening tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SanctionsConfig {
    /// Matches below this confidence are not reported
    pub min_confidence: f64,
}

impl Default for SanctionsConfig {
    fn default() -> Self {
        Self { min_confidence: 0.85 }
    }
}

impl SanctionsConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let value = self.min_confidence;
        if !(value.is_finite() && value > 0.0 && value <= 1.0) {
            return Err(ConfigurationError::WeightOutOfRange {
                name: "sanctions.min_confidence".to_string(),
                value,
            });
        }
        Ok(())
    }
}

/// Sanctions listing found for a screened name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanctionsHit {
    /// Name that produced the match: the query or the matched company
    pub screened_name: String,
    pub matched_name: String,
    pub lists: Vec<SanctionsList>,
    pub match_kind: MatchKind,
    pub confidence: f64,
}

impl fmt::Display for SanctionsHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lists: Vec<&str> = self.lists.iter().map(SanctionsList::name).collect();
        write!(
            f,
            "{} listed on {} ({} match, {:.0}%)",
            self.matched_name,
            lists.join(", "),
            self.match_kind,
            self.confidence * 100.0
        )
    }
}

/// Screens names against a [`SanctionsRegister`]
#[derive(Debug, Clone)]
pub struct SanctionsScreener {
    matcher: Matcher,
}

impl SanctionsScreener {
    /// Screener with default matching and the default confidence floor
    pub fn new() -> Self {
        Self::with_config(&SanctionsConfig::default(), &MatcherConfig::default())
    }

    /// Reuse the company matcher's tuning with the sanctions confidence floor
    pub fn with_config(config: &SanctionsConfig, matcher: &MatcherConfig) -> Self {
        let matcher_config = MatcherConfig {
            min_confidence: config.min_confidence,
            ..matcher.clone()
        };
        Self {
            matcher: Matcher::with_config(matcher_config),
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.matcher = self.matcher.with_similarity(similarity);
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.matcher.config().min_confidence
    }

    /// Best listing across every screened name, if any clears the floor.
    /// Earlier names win ties.
    pub fn screen(&self, names: &[&str], register: &SanctionsRegister) -> Option<SanctionsHit> {
        if register.is_empty() {
            return None;
        }

        let mut best: Option<(&str, MatchCandidate)> = None;
        for name in names {
            let Some(top) = self.matcher.rank(name, register.entities()).into_iter().next() else {
                continue;
            };
            let better = match &best {
                Some((_, current)) => {
                    top.confidence.partial_cmp(&current.confidence) == Some(Ordering::Greater)
                }
                None => true,
            };
            if better {
                best = Some((*name, top));
            }
        }

        let (screened_name, candidate) = best?;
        let hit = SanctionsHit {
            screened_name: screened_name.to_string(),
            lists: register.lists_for(&candidate.entity),
            matched_name: candidate.entity.canonical_name,
            match_kind: candidate.kind,
            confidence: candidate.confidence,
        };
        info!(
            screened = %hit.screened_name,
            matched = %hit.matched_name,
            confidence = hit.confidence,
            "sanctions listing found"
        );
        Some(hit)
    }
}

impl Default for SanctionsScreener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_register() -> SanctionsRegister {
        SanctionsRegister::build(vec![
            SanctionsEntry::new(SanctionsList::WorldBank, "Acme Construction Ltd"),
            SanctionsEntry::new(SanctionsList::WorldBank, "ACME CONSTRUCTION LIMITED"),
            SanctionsEntry::new(SanctionsList::Custom("Internal Watch".into()), "Acme Construction"),
            SanctionsEntry::new(SanctionsList::WorldBank, "Nordic Dredging ASA"),
            SanctionsEntry::new(SanctionsList::WorldBank, "  "),
        ])
    }

    #[test]
    fn test_register_groups_names_and_lists() {
        let register = create_test_register();
        assert_eq!(register.len(), 2);
        assert_eq!(register.entries().len(), 4);

        let acme = &register.entities()[0];
        assert_eq!(acme.normalized_name, "acme construction");
        assert_eq!(acme.aliases.len(), 3);
        assert_eq!(
            register.lists_for(acme),
            vec![
                SanctionsList::WorldBank,
                SanctionsList::Custom("Internal Watch".into())
            ]
        );
    }

    #[test]
    fn test_exact_listing() {
        let screener = SanctionsScreener::new();
        let hit = screener
            .screen(&["Acme Construction Inc."], &create_test_register())
            .unwrap();
        assert_eq!(hit.match_kind, MatchKind::Exact);
        assert_eq!(hit.confidence, 1.0);
        assert_eq!(hit.matched_name, "Acme Construction Ltd");
        assert!(hit.lists.contains(&SanctionsList::WorldBank));
    }

    #[test]
    fn test_fuzzy_listing_above_floor() {
        let screener = SanctionsScreener::new();
        let hit = screener
            .screen(&["Nordik Dredging"], &create_test_register())
            .unwrap();
        assert_eq!(hit.match_kind, MatchKind::Fuzzy);
        assert!(hit.confidence >= 0.85);
    }

    #[test]
    fn test_partial_name_not_a_hit() {
        let screener = SanctionsScreener::new();
        // one of two words is below the sanctions floor
        assert!(screener.screen(&["Acme"], &create_test_register()).is_none());
        assert!(screener.screen(&["Vale"], &create_test_register()).is_none());
    }

    #[test]
    fn test_second_name_screened() {
        let screener = SanctionsScreener::new();
        let hit = screener
            .screen(&["acme constr", "Acme Construction"], &create_test_register())
            .unwrap();
        assert_eq!(hit.screened_name, "Acme Construction");
        assert_eq!(hit.match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_empty_register() {
        let screener = SanctionsScreener::new();
        assert!(screener
            .screen(&["Acme Construction"], &SanctionsRegister::default())
            .is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(SanctionsConfig::default().validate().is_ok());
        for value in [0.0, 1.2, f64::NAN] {
            let config = SanctionsConfig { min_confidence: value };
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::WeightOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_display_names_lists() {
        let hit = SanctionsScreener::new()
            .screen(&["Nordic Dredging"], &create_test_register())
            .unwrap();
        assert_eq!(
            hit.to_string(),
            "Nordic Dredging ASA listed on World Bank Debarment (exact match, 100%)"
        );
    }
}
