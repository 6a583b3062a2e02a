//! # ESG Exclusion Risk
//!
//! Screens a company name against a snapshot of institutional-investor
//! exclusion records and turns the matches into an explainable risk
//! assessment.
//!
//! ## Pipeline
//!
//! - **Normalizer**: canonical form of company names (case, punctuation, legal suffixes)
//! - **Matcher**: exact, word-subset and fuzzy matching with an ambiguity guard
//! - **Aggregator**: distinct investors, countries, categories and decision dates
//! - **Risk Scorer**: weighted consensus, severity, recency and scope factors
//! - **Recommendation Mapper**: tiered engagement playbook
//! - **Sanctions Screener**: cross-check against debarment lists, reported
//!   alongside the score without changing it
//!
//! Assessments are a pure function of the query, the dataset snapshot, the
//! configuration and the evaluation date.

pub mod aggregator;
pub mod config;
pub mod dataset;
pub mod matcher;
pub mod normalizer;
pub mod recommendation;
pub mod record;
pub mod sanctions;
pub mod scoring;
pub mod similarity;

pub use aggregator::{aggregate, Aggregation, AggregationSummary, DataIntegrityWarning, IntegrityWarningKind};
pub use config::{AssessorConfig, ConfigurationError};
pub use dataset::{DatasetSnapshot, DatasetSnapshotBuilder};
pub use matcher::{CompanyEntity, MatchCandidate, MatchKind, MatchOutcome, Matcher, MatcherConfig};
pub use recommendation::{Playbook, RecommendationEntry, RecommendationMapper, SanctionsGuidance, TierPlaybook};
pub use record::{Category, ExclusionRecord, ExclusionScope, IntegrityIssue, RawExclusionRecord};
pub use sanctions::{SanctionsConfig, SanctionsEntry, SanctionsHit, SanctionsList, SanctionsRegister, SanctionsScreener};
pub use scoring::{RiskFlag, RiskScorer, RiskTier, ScoreBreakdown, ScoreWeights, ScoringConfig, TierThresholds};
pub use similarity::{JaroWinklerSimilarity, LevenshteinSimilarity, Similarity, TokenSortSimilarity};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Assessment errors. Unmatched and ambiguous queries are results, not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Invalid query: {0:?}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Scored assessment of a uniquely matched company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub query: String,
    pub entity: CompanyEntity,
    pub match_kind: MatchKind,
    pub match_confidence: f64,
    pub breakdown: ScoreBreakdown,
    pub recommendation: RecommendationEntry,
    /// Sanctions listing for the query or the matched company
    pub sanctions: Option<SanctionsHit>,
    pub summary: AggregationSummary,
    /// Matched records, most recent decision first
    pub records: Vec<ExclusionRecord>,
    pub evaluation_date: NaiveDate,
    pub dataset_fingerprint: String,
}

impl AssessmentResult {
    pub fn tier(&self) -> RiskTier {
        self.breakdown.tier
    }

    pub fn final_score(&self) -> f64 {
        self.breakdown.final_score
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Query matched several entities too closely to pick one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    pub query: String,
    /// Near-tied candidates, best first
    pub candidates: Vec<MatchCandidate>,
    pub sanctions: Option<SanctionsHit>,
}

/// Query matched nothing above the confidence floor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoMatch {
    pub query: String,
    pub normalized_query: String,
    /// A company with no exclusions can still be listed
    pub sanctions: Option<SanctionsHit>,
}

/// Outcome of assessing one query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Assessment {
    Assessed(Box<AssessmentResult>),
    Ambiguous(AmbiguousMatch),
    NoMatch(NoMatch),
}

impl Assessment {
    pub fn result(&self) -> Option<&AssessmentResult> {
        match self {
            Assessment::Assessed(result) => Some(result.as_ref()),
            _ => None,
        }
    }

    pub fn is_assessed(&self) -> bool {
        matches!(self, Assessment::Assessed(_))
    }

    pub fn sanctions(&self) -> Option<&SanctionsHit> {
        match self {
            Assessment::Assessed(result) => result.sanctions.as_ref(),
            Assessment::Ambiguous(ambiguous) => ambiguous.sanctions.as_ref(),
            Assessment::NoMatch(no_match) => no_match.sanctions.as_ref(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Company risk assessor
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    matcher: Matcher,
    scorer: RiskScorer,
    mapper: RecommendationMapper,
    screener: SanctionsScreener,
}

impl RiskAssessor {
    /// Validate the configuration and build the pipeline
    pub fn new(config: AssessorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let AssessorConfig {
            matcher,
            scoring,
            playbook,
            sanctions,
        } = config;
        Ok(Self {
            screener: SanctionsScreener::with_config(&sanctions, &matcher),
            matcher: Matcher::with_config(matcher),
            scorer: RiskScorer::with_config(scoring)?,
            mapper: RecommendationMapper::with_playbook(playbook),
        })
    }

    /// Swap the fuzzy matching backend
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.screener = self.screener.with_similarity(Arc::clone(&similarity));
        self.matcher = self.matcher.with_similarity(similarity);
        self
    }

    /// Derive tier thresholds from the snapshot's score distribution.
    /// Thresholds stay fixed for every later assessment.
    pub fn with_percentile_tiers(
        mut self,
        snapshot: &DatasetSnapshot,
        evaluation_date: NaiveDate,
        medium_percentile: f64,
        high_percentile: f64,
    ) -> Result<Self, ConfigurationError> {
        let scores = self.scorer.score_distribution(snapshot, evaluation_date);
        let tiers = TierThresholds::from_percentiles(&scores, medium_percentile, high_percentile);
        info!(medium = tiers.medium, high = tiers.high, "calibrated tier thresholds");
        self.scorer = self.scorer.with_tiers(tiers)?;
        Ok(self)
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    /// Assess a company as of today (UTC)
    pub fn assess(&self, query: &str, snapshot: &DatasetSnapshot) -> Result<Assessment, AssessmentError> {
        self.assess_at(query, snapshot, Utc::now().date_naive())
    }

    /// Assess a company as of `evaluation_date`
    #[tracing::instrument(skip(self, snapshot), fields(fingerprint = %snapshot.fingerprint()))]
    pub fn assess_at(
        &self,
        query: &str,
        snapshot: &DatasetSnapshot,
        evaluation_date: NaiveDate,
    ) -> Result<Assessment, AssessmentError> {
        let normalized_query = normalizer::normalize(query);
        if normalized_query.is_empty() {
            warn!("rejected empty query");
            return Err(AssessmentError::InvalidQuery(query.to_string()));
        }

        let candidate = match self.matcher.resolve(query, snapshot.entities()) {
            MatchOutcome::Unique(candidate) => candidate,
            MatchOutcome::Ambiguous(candidates) => {
                info!(candidates = candidates.len(), "ambiguous match");
                return Ok(Assessment::Ambiguous(AmbiguousMatch {
                    query: query.to_string(),
                    candidates,
                    sanctions: self.screener.screen(&[query], snapshot.sanctions()),
                }));
            }
            MatchOutcome::NoMatch => {
                info!(normalized = %normalized_query, "no match");
                return Ok(Assessment::NoMatch(NoMatch {
                    query: query.to_string(),
                    normalized_query,
                    sanctions: self.screener.screen(&[query], snapshot.sanctions()),
                }));
            }
        };

        let aggregation = aggregate(&candidate.entity, snapshot.records_for(&candidate.entity));
        let mut breakdown = self.scorer.score(&aggregation, evaluation_date);
        let sanctions = self.screener.screen(
            &[query, candidate.entity.canonical_name.as_str()],
            snapshot.sanctions(),
        );
        if let Some(hit) = &sanctions {
            breakdown.flags.push(RiskFlag::SanctionsHit {
                matched_name: hit.matched_name.clone(),
                lists: hit.lists.clone(),
            });
        }
        let recommendation = self.mapper.recommend(
            breakdown.tier,
            &breakdown.flags,
            aggregation.dominant_category(),
        );

        info!(
            entity = %candidate.entity.canonical_name,
            score = breakdown.final_score,
            tier = %breakdown.tier,
            "assessed company"
        );

        let summary = aggregation.summary();
        let Aggregation { records, .. } = aggregation;
        Ok(Assessment::Assessed(Box::new(AssessmentResult {
            query: query.to_string(),
            entity: candidate.entity,
            match_kind: candidate.kind,
            match_confidence: candidate.confidence,
            breakdown,
            recommendation,
            sanctions,
            summary,
            records,
            evaluation_date,
            dataset_fingerprint: snapshot.fingerprint().to_string(),
        })))
    }

    /// Assess multiple queries against the same snapshot and date
    pub fn assess_batch<S: AsRef<str>>(
        &self,
        queries: &[S],
        snapshot: &DatasetSnapshot,
        evaluation_date: NaiveDate,
    ) -> Vec<Result<Assessment, AssessmentError>> {
        queries
            .iter()
            .map(|q| self.assess_at(q.as_ref(), snapshot, evaluation_date))
            .collect()
    }
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self {
            matcher: Matcher::new(),
            scorer: RiskScorer::new(),
            mapper: RecommendationMapper::new(),
            screener: SanctionsScreener::new(),
        }
    }
}
