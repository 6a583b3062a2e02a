//! Multi-factor risk scoring
//!
//! Four sub-scores in `[0, 1]` are combined with fixed weights:
//!
//! | factor    | weight | measures                                         |
//! |-----------|--------|--------------------------------------------------|
//! | consensus | 0.40   | distinct investors and investor countries        |
//! | severity  | 0.30   | category mix, adjusted by motivation keywords    |
//! | recency   | 0.20   | decay over the age of each decision              |
//! | scope     | 0.10   | company-level versus sector-wide exclusions      |
//!
//! The final score maps onto a [`RiskTier`] through thresholds that stay
//! fixed for the whole session. Flags annotate the result and never change
//! the score.

use crate::aggregator::{aggregate, Aggregation, DataIntegrityWarning};
use crate::config::ConfigurationError;
use crate::dataset::DatasetSnapshot;
use crate::record::{Category, ExclusionScope};
use crate::sanctions::SanctionsList;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

const DAYS_PER_YEAR: f64 = 365.25;
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Factor weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub consensus: f64,
    pub severity: f64,
    pub recency: f64,
    pub scope: f64,
}

impl ScoreWeights {
    pub const STANDARD: ScoreWeights = ScoreWeights {
        consensus: 0.40,
        severity: 0.30,
        recency: 0.20,
        scope: 0.10,
    };

    pub fn sum(&self) -> f64 {
        self.consensus + self.severity + self.recency + self.scope
    }

    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("consensus", self.consensus),
            ("severity", self.severity),
            ("recency", self.recency),
            ("scope", self.scope),
        ]
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Severity per category, in `[0, 1]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeverityTable {
    pub climate: f64,
    pub human_rights: f64,
    pub governance: f64,
    pub business_practices: f64,
    pub cannabis: f64,
    pub unspecified: f64,
}

impl SeverityTable {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Climate => self.climate,
            Category::HumanRights => self.human_rights,
            Category::Governance => self.governance,
            Category::BusinessPractices => self.business_practices,
            Category::Cannabis => self.cannabis,
            Category::Unspecified => self.unspecified,
        }
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            climate: 1.0,
            human_rights: 0.9,
            governance: 0.9,
            business_practices: 0.55,
            cannabis: 0.25,
            unspecified: 0.4,
        }
    }
}

/// Severity multiplier for records whose motivation mentions `keyword`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotivationMultiplier {
    pub keyword: String,
    pub multiplier: f64,
}

fn default_motivation_multipliers() -> Vec<MotivationMultiplier> {
    [
        ("thermal coal", 1.3),
        ("corruption", 1.3),
        ("forced labour", 1.3),
        ("forced labor", 1.3),
        ("child labour", 1.3),
        ("child labor", 1.3),
        ("shale", 1.2),
        ("fossil expansion", 1.2),
        ("oil & gas", 1.1),
        ("human rights", 1.1),
        ("labour rights", 1.1),
        ("labor rights", 1.1),
        ("controversial behaviour", 0.9),
        ("controversial behavior", 0.9),
    ]
    .into_iter()
    .map(|(keyword, multiplier)| MotivationMultiplier {
        keyword: keyword.to_string(),
        multiplier,
    })
    .collect()
}

/// Saturation points for the consensus factor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusParams {
    /// Distinct investors at which the investor component reaches 1.0
    pub investor_ceiling: f64,
    /// Distinct countries at which the country component reaches 1.0
    pub country_ceiling: f64,
    /// Share of the investor component; the rest goes to countries
    pub investor_share: f64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            investor_ceiling: 12.0,
            country_ceiling: 6.0,
            investor_share: 0.5,
        }
    }
}

/// Weight of a decision of age `max_years` or less
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecencyStep {
    pub max_years: f64,
    pub weight: f64,
}

/// How a decision's weight decays with age
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecencyDecay {
    Exponential { half_life_years: f64 },
    /// Steps in ascending `max_years`; `beyond` applies past the last step
    Step { steps: Vec<RecencyStep>, beyond: f64 },
}

impl RecencyDecay {
    /// Fixed step table: 1.0 up to a year, 0.9 up to two, 0.8 up to five
    pub fn standard_steps() -> Self {
        RecencyDecay::Step {
            steps: vec![
                RecencyStep { max_years: 1.0, weight: 1.0 },
                RecencyStep { max_years: 2.0, weight: 0.9 },
                RecencyStep { max_years: 5.0, weight: 0.8 },
            ],
            beyond: 0.7,
        }
    }

    pub fn weight(&self, age_years: f64) -> f64 {
        let age = age_years.max(0.0);
        match self {
            RecencyDecay::Exponential { half_life_years } => 0.5_f64.powf(age / half_life_years),
            RecencyDecay::Step { steps, beyond } => steps
                .iter()
                .find(|s| age <= s.max_years)
                .map(|s| s.weight)
                .unwrap_or(*beyond),
        }
    }
}

impl Default for RecencyDecay {
    fn default() -> Self {
        RecencyDecay::Exponential { half_life_years: 2.0 }
    }
}

/// Per-record contribution by exclusion scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScopeParams {
    pub company_weight: f64,
    pub sector_weight: f64,
}

impl Default for ScopeParams {
    fn default() -> Self {
        Self {
            company_weight: 1.0,
            sector_weight: 0.25,
        }
    }
}

/// Score cut-points between tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierThresholds {
    /// Scores at or above this are at least Medium
    pub medium: f64,
    /// Scores at or above this are High
    pub high: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            medium: 0.45,
            high: 0.75,
        }
    }
}

impl TierThresholds {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let ordered = self.medium.is_finite()
            && self.high.is_finite()
            && 0.0 < self.medium
            && self.medium < self.high
            && self.high <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidThresholds {
                medium: self.medium,
                high: self.high,
            })
        }
    }

    pub fn tier(&self, score: f64) -> RiskTier {
        if score >= self.high {
            RiskTier::High
        } else if score >= self.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Derive cut-points from a score distribution, once per session.
    ///
    /// Percentiles use linear interpolation between closest ranks. Falls back
    /// to the default thresholds when the distribution has fewer than two
    /// scores or yields unusable cut-points.
    pub fn from_percentiles(scores: &[f64], medium_percentile: f64, high_percentile: f64) -> Self {
        let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if sorted.len() < 2 {
            warn!(scores = sorted.len(), "too few scores for percentile tiers, using defaults");
            return Self::default();
        }
        sorted.sort_by(f64::total_cmp);

        let derived = Self {
            medium: percentile(&sorted, medium_percentile),
            high: percentile(&sorted, high_percentile),
        };
        match derived.validate() {
            Ok(()) => derived,
            Err(e) => {
                warn!(error = %e, "percentile tiers unusable, using defaults");
                Self::default()
            }
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Thresholds for qualitative flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlagRules {
    pub broad_consensus_min_countries: usize,
    pub broad_consensus_min_investors: usize,
    pub multiple_jurisdictions_min_countries: usize,
    pub escalation_window_days: i64,
    /// Most records dated before the window for an escalation to count
    pub escalation_max_prior_records: usize,
    pub persistence_min_years: i64,
    pub severe_labour_min_breadth: usize,
    pub multiple_categories_min: usize,
}

impl Default for FlagRules {
    fn default() -> Self {
        Self {
            broad_consensus_min_countries: 3,
            broad_consensus_min_investors: 5,
            multiple_jurisdictions_min_countries: 2,
            escalation_window_days: 365,
            escalation_max_prior_records: 2,
            persistence_min_years: 3,
            severe_labour_min_breadth: 3,
            multiple_categories_min: 2,
        }
    }
}

/// Complete scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub severity: SeverityTable,
    pub motivation_multipliers: Vec<MotivationMultiplier>,
    pub consensus: ConsensusParams,
    pub recency: RecencyDecay,
    pub scope: ScopeParams,
    pub tiers: TierThresholds,
    pub flags: FlagRules,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::STANDARD,
            severity: SeverityTable::default(),
            motivation_multipliers: default_motivation_multipliers(),
            consensus: ConsensusParams::default(),
            recency: RecencyDecay::default(),
            scope: ScopeParams::default(),
            tiers: TierThresholds::default(),
            flags: FlagRules::default(),
        }
    }
}

impl ScoringConfig {
    /// Reject configurations that would produce misleading scores
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in self.weights.named() {
            unit_interval(&format!("weights.{}", name), value)?;
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigurationError::WeightsDoNotSumToOne { sum });
        }

        for category in Category::ALL {
            unit_interval(&format!("severity.{}", category), self.severity.get(category))?;
        }

        for m in &self.motivation_multipliers {
            if m.keyword.trim().is_empty() {
                return Err(invalid("motivation_multipliers", "keyword must not be blank"));
            }
            if !m.multiplier.is_finite() || m.multiplier < 0.0 {
                return Err(invalid(
                    "motivation_multipliers",
                    &format!("multiplier for '{}' must be a non-negative number", m.keyword),
                ));
            }
        }

        if !(self.consensus.investor_ceiling >= 1.0) {
            return Err(invalid("consensus.investor_ceiling", "must be at least 1"));
        }
        if !(self.consensus.country_ceiling >= 1.0) {
            return Err(invalid("consensus.country_ceiling", "must be at least 1"));
        }
        unit_interval("consensus.investor_share", self.consensus.investor_share)?;

        match &self.recency {
            RecencyDecay::Exponential { half_life_years } => {
                if !(half_life_years.is_finite() && *half_life_years > 0.0) {
                    return Err(invalid("recency.half_life_years", "must be positive"));
                }
            }
            RecencyDecay::Step { steps, beyond } => {
                if steps.is_empty() {
                    return Err(invalid("recency.steps", "must not be empty"));
                }
                let ascending = steps.windows(2).all(|w| w[0].max_years < w[1].max_years);
                if !ascending || steps.iter().any(|s| !(s.max_years >= 0.0)) {
                    return Err(invalid("recency.steps", "max_years must be ascending and non-negative"));
                }
                for step in steps {
                    unit_interval("recency.steps.weight", step.weight)?;
                }
                unit_interval("recency.beyond", *beyond)?;
            }
        }

        unit_interval("scope.company_weight", self.scope.company_weight)?;
        unit_interval("scope.sector_weight", self.scope.sector_weight)?;
        self.tiers.validate()?;

        if self.flags.escalation_window_days <= 0 {
            return Err(invalid("flags.escalation_window_days", "must be positive"));
        }
        Ok(())
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::WeightOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}

fn invalid(name: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Three-level risk classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [RiskTier::Low, RiskTier::Medium, RiskTier::High];
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "Low Risk"),
            RiskTier::Medium => write!(f, "Medium Risk"),
            RiskTier::High => write!(f, "High Risk"),
        }
    }
}

/// Qualitative annotation on a score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum RiskFlag {
    BroadConsensus { investors: usize, countries: usize },
    MultipleJurisdictions { countries: usize },
    RecentEscalation { latest: NaiveDate, prior_records: usize },
    SectorWideClimate,
    MultipleCategories { categories: usize },
    PersistentConcern { span_days: i64 },
    SevereLabourAllegations,
    DataIntegrity { warning: DataIntegrityWarning },
    /// Listed on a sanctions list. Annotation only, never scored.
    SanctionsHit { matched_name: String, lists: Vec<SanctionsList> },
}

impl RiskFlag {
    /// Stable identifier
    pub fn code(&self) -> &'static str {
        match self {
            RiskFlag::BroadConsensus { .. } => "broad_consensus",
            RiskFlag::MultipleJurisdictions { .. } => "multiple_jurisdictions",
            RiskFlag::RecentEscalation { .. } => "recent_escalation",
            RiskFlag::SectorWideClimate => "sector_wide_climate",
            RiskFlag::MultipleCategories { .. } => "multiple_categories",
            RiskFlag::PersistentConcern { .. } => "persistent_concern",
            RiskFlag::SevereLabourAllegations => "severe_labour_allegations",
            RiskFlag::DataIntegrity { .. } => "data_integrity",
            RiskFlag::SanctionsHit { .. } => "sanctions_hit",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::BroadConsensus { investors, countries } => write!(
                f,
                "broad consensus: {} investors across {} countries",
                investors, countries
            ),
            RiskFlag::MultipleJurisdictions { countries } => {
                write!(f, "multiple independent jurisdictions ({})", countries)
            }
            RiskFlag::RecentEscalation { latest, prior_records } => write!(
                f,
                "recent escalation: latest decision {} with {} earlier records",
                latest, prior_records
            ),
            RiskFlag::SectorWideClimate => write!(f, "sector-wide climate exclusion"),
            RiskFlag::MultipleCategories { categories } => {
                write!(f, "concerns span {} categories", categories)
            }
            RiskFlag::PersistentConcern { span_days } => write!(
                f,
                "persistent concern over {:.1} years",
                *span_days as f64 / DAYS_PER_YEAR
            ),
            RiskFlag::SevereLabourAllegations => {
                write!(f, "forced or child labour cited by multiple sources")
            }
            RiskFlag::DataIntegrity { warning } => write!(f, "data integrity: {}", warning),
            RiskFlag::SanctionsHit { matched_name, lists } => {
                let lists: Vec<&str> = lists.iter().map(SanctionsList::name).collect();
                write!(f, "{} listed on {}", matched_name, lists.join(", "))
            }
        }
    }
}

/// Output of the scorer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub consensus: f64,
    pub severity: f64,
    pub recency: f64,
    pub scope: f64,
    pub weights: ScoreWeights,
    pub final_score: f64,
    pub tier: RiskTier,
    pub flags: Vec<RiskFlag>,
    /// Share of records with a recognized category, mapped onto `[0.5, 1]`
    pub data_confidence: f64,
    pub distinct_investors: usize,
    pub distinct_countries: usize,
    pub evaluation_date: NaiveDate,
}

impl ScoreBreakdown {
    pub fn has_flag(&self, code: &str) -> bool {
        self.flags.iter().any(|f| f.code() == code)
    }

    /// Final score on a 0-100 scale
    pub fn score_percent(&self) -> u8 {
        (self.final_score * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn integrity_warnings(&self) -> impl Iterator<Item = &DataIntegrityWarning> {
        self.flags.iter().filter_map(|f| match f {
            RiskFlag::DataIntegrity { warning } => Some(warning),
            _ => None,
        })
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |w: f64| (w * 100.0).round();
        let pts = |s: f64| (s * 100.0).round();
        writeln!(
            f,
            "{}: {}/100",
            self.tier,
            self.score_percent()
        )?;
        writeln!(
            f,
            "Consensus ({}%): {}/100 - {} ({} investors, {} countries)",
            pct(self.weights.consensus),
            pts(self.consensus),
            consensus_label(self.distinct_investors, self.distinct_countries),
            self.distinct_investors,
            self.distinct_countries
        )?;
        writeln!(
            f,
            "Severity ({}%): {}/100 - {}",
            pct(self.weights.severity),
            pts(self.severity),
            severity_label(self.severity)
        )?;
        writeln!(
            f,
            "Recency ({}%): {}/100 - {}",
            pct(self.weights.recency),
            pts(self.recency),
            recency_label(self.recency)
        )?;
        write!(
            f,
            "Scope ({}%): {}/100 - {}",
            pct(self.weights.scope),
            pts(self.scope),
            scope_label(self.scope)
        )?;
        for flag in &self.flags {
            write!(f, "\n  ! {}", flag)?;
        }
        Ok(())
    }
}

fn consensus_label(investors: usize, countries: usize) -> &'static str {
    if investors == 0 {
        "No exclusions found"
    } else if investors >= 20 || countries >= 6 {
        "Very strong multi-country consensus"
    } else if investors >= 10 && countries >= 4 {
        "Strong multi-country consensus"
    } else if investors >= 5 && countries >= 3 {
        "Moderate multi-country consensus"
    } else if investors >= 3 && countries >= 2 {
        "Limited multi-country consensus"
    } else if investors >= 2 || countries >= 2 {
        "Minimal multi-authority consensus"
    } else {
        "Single authority concern"
    }
}

fn severity_label(score: f64) -> &'static str {
    match score {
        s if s >= 0.9 => "Critical issues",
        s if s >= 0.75 => "Serious issues",
        s if s >= 0.5 => "Moderate issues",
        s if s > 0.0 => "Minor issues",
        _ => "No issues identified",
    }
}

fn recency_label(score: f64) -> &'static str {
    match score {
        s if s >= 0.8 => "Very recent activity",
        s if s >= 0.5 => "Recent activity",
        s if s >= 0.3 => "Mixed timeline",
        s if s >= 0.1 => "Some recent activity",
        s if s > 0.0 => "Historical issues only",
        _ => "No dated activity",
    }
}

fn scope_label(score: f64) -> &'static str {
    match score {
        s if s >= 0.99 => "Company-level",
        s if s <= 0.0 => "No exclusions",
        s if s < 0.5 => "Mostly sector-wide",
        _ => "Mixed company and sector",
    }
}

const LABOUR_KEYWORDS: [&str; 5] = [
    "forced labour",
    "forced labor",
    "child labour",
    "child labor",
    "slavery",
];

/// Risk scorer over aggregated exclusion records
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    /// Scorer with the standard configuration
    pub fn new() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }

    /// Validates the configuration; refuses to build an invalid scorer
    pub fn with_config(config: ScoringConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Replace the tier cut-points, e.g. with percentile-derived ones
    pub fn with_tiers(mut self, tiers: TierThresholds) -> Result<Self, ConfigurationError> {
        tiers.validate()?;
        self.config.tiers = tiers;
        Ok(self)
    }

    /// Score an aggregation as of `evaluation_date`
    pub fn score(&self, aggregation: &Aggregation, evaluation_date: NaiveDate) -> ScoreBreakdown {
        let weights = self.config.weights;
        let investors = aggregation.distinct_investors();
        let countries = aggregation.distinct_countries();

        if aggregation.is_empty() {
            return ScoreBreakdown {
                consensus: 0.0,
                severity: 0.0,
                recency: 0.0,
                scope: 0.0,
                weights,
                final_score: 0.0,
                tier: self.config.tiers.tier(0.0),
                flags: Vec::new(),
                data_confidence: 1.0,
                distinct_investors: 0,
                distinct_countries: 0,
                evaluation_date,
            };
        }

        let consensus = self.consensus_score(investors, countries);
        let severity = self.severity_score(aggregation);
        let recency = self.recency_score(aggregation, evaluation_date);
        let scope = self.scope_score(aggregation);

        let final_score = (weights.consensus * consensus
            + weights.severity * severity
            + weights.recency * recency
            + weights.scope * scope)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            consensus,
            severity,
            recency,
            scope,
            weights,
            final_score,
            tier: self.config.tiers.tier(final_score),
            flags: self.flags(aggregation, evaluation_date),
            data_confidence: data_confidence(aggregation),
            distinct_investors: investors,
            distinct_countries: countries,
            evaluation_date,
        }
    }

    /// Final score of every entity in a snapshot, for percentile tiering
    pub fn score_distribution(&self, snapshot: &DatasetSnapshot, evaluation_date: NaiveDate) -> Vec<f64> {
        snapshot
            .entities()
            .iter()
            .map(|entity| {
                let aggregation = aggregate(entity, snapshot.records_for(entity));
                self.score(&aggregation, evaluation_date).final_score
            })
            .collect()
    }

    /// Saturating log curve per dimension, blended by `investor_share`
    fn consensus_score(&self, investors: usize, countries: usize) -> f64 {
        let params = &self.config.consensus;
        let saturate = |n: usize, ceiling: f64| {
            ((1.0 + n as f64).ln() / (1.0 + ceiling).ln()).clamp(0.0, 1.0)
        };
        let investor_part = saturate(investors, params.investor_ceiling);
        let country_part = saturate(countries, params.country_ceiling);
        (params.investor_share * investor_part + (1.0 - params.investor_share) * country_part)
            .clamp(0.0, 1.0)
    }

    /// Mean per-record severity; each record takes its most severe category
    fn severity_score(&self, aggregation: &Aggregation) -> f64 {
        let total: f64 = aggregation
            .records
            .iter()
            .map(|record| {
                let base = record
                    .categories()
                    .map(|c| self.config.severity.get(c))
                    .fold(0.0_f64, f64::max);
                (base * self.motivation_multiplier(&record.motivation_text)).clamp(0.0, 1.0)
            })
            .sum();
        total / aggregation.total_records() as f64
    }

    /// Largest multiplier among matching keywords, 1.0 when none match
    fn motivation_multiplier(&self, motivation: &str) -> f64 {
        let text = motivation.to_lowercase();
        self.config
            .motivation_multipliers
            .iter()
            .filter(|m| text.contains(&m.keyword.to_lowercase()))
            .map(|m| m.multiplier)
            .reduce(f64::max)
            .unwrap_or(1.0)
    }

    /// Mean decay weight over all records; undated records add zero
    fn recency_score(&self, aggregation: &Aggregation, evaluation_date: NaiveDate) -> f64 {
        let total: f64 = aggregation
            .records
            .iter()
            .filter_map(|r| r.decision_date)
            .map(|date| self.config.recency.weight(age_years(date, evaluation_date)))
            .sum();
        (total / aggregation.total_records() as f64).clamp(0.0, 1.0)
    }

    fn scope_score(&self, aggregation: &Aggregation) -> f64 {
        let params = &self.config.scope;
        let total: f64 = aggregation
            .records
            .iter()
            .map(|r| match r.scope {
                ExclusionScope::Company => params.company_weight,
                ExclusionScope::Sector => params.sector_weight,
            })
            .sum();
        (total / aggregation.total_records() as f64).clamp(0.0, 1.0)
    }

    fn flags(&self, aggregation: &Aggregation, evaluation_date: NaiveDate) -> Vec<RiskFlag> {
        let rules = &self.config.flags;
        let investors = aggregation.distinct_investors();
        let countries = aggregation.distinct_countries();
        let mut flags = Vec::new();

        if countries >= rules.broad_consensus_min_countries
            && investors >= rules.broad_consensus_min_investors
        {
            flags.push(RiskFlag::BroadConsensus { investors, countries });
        }

        if countries >= rules.multiple_jurisdictions_min_countries {
            flags.push(RiskFlag::MultipleJurisdictions { countries });
        }

        if let Some(latest) = aggregation.latest_decision {
            let window_start =
                evaluation_date - chrono::Duration::days(rules.escalation_window_days);
            let prior_records = aggregation
                .records
                .iter()
                .filter_map(|r| r.decision_date)
                .filter(|d| *d < window_start)
                .count();
            if latest >= window_start && prior_records <= rules.escalation_max_prior_records {
                flags.push(RiskFlag::RecentEscalation { latest, prior_records });
            }
        }

        let sector_climate = aggregation.records.iter().any(|r| {
            r.scope == ExclusionScope::Sector && r.categories().any(|c| c == Category::Climate)
        });
        if sector_climate {
            flags.push(RiskFlag::SectorWideClimate);
        }

        let categories: BTreeSet<Category> = aggregation
            .records
            .iter()
            .map(|r| r.category)
            .filter(|c| *c != Category::Unspecified)
            .collect();
        if categories.len() >= rules.multiple_categories_min {
            flags.push(RiskFlag::MultipleCategories {
                categories: categories.len(),
            });
        }

        if let (Some(earliest), Some(latest)) =
            (aggregation.earliest_decision, aggregation.latest_decision)
        {
            let span_days = (latest - earliest).num_days();
            if span_days as f64 >= rules.persistence_min_years as f64 * DAYS_PER_YEAR {
                flags.push(RiskFlag::PersistentConcern { span_days });
            }
        }

        let labour = aggregation.records.iter().any(|r| {
            let text = r.motivation_text.to_lowercase();
            LABOUR_KEYWORDS.iter().any(|k| text.contains(k))
        });
        if labour
            && (investors >= rules.severe_labour_min_breadth
                || countries >= rules.severe_labour_min_breadth)
        {
            flags.push(RiskFlag::SevereLabourAllegations);
        }

        flags.extend(
            aggregation
                .warnings
                .iter()
                .cloned()
                .map(|warning| RiskFlag::DataIntegrity { warning }),
        );
        flags
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Age of a decision in years; future dates count as age zero
fn age_years(date: NaiveDate, evaluation_date: NaiveDate) -> f64 {
    (evaluation_date - date).num_days().max(0) as f64 / DAYS_PER_YEAR
}

/// `1 - min(0.5, unspecified_share / 2)`
fn data_confidence(aggregation: &Aggregation) -> f64 {
    if aggregation.is_empty() {
        return 1.0;
    }
    let unspecified = aggregation.category_count(Category::Unspecified) as f64;
    let share = unspecified / aggregation.total_records() as f64;
    1.0 - (share / 2.0).min(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::CompanyEntity;
    use crate::record::ExclusionRecord;

    fn eval_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn days_ago(days: i64) -> NaiveDate {
        eval_date() - chrono::Duration::days(days)
    }

    fn climate(investor: &str, country: &str, days: i64) -> ExclusionRecord {
        ExclusionRecord::new("Coal Co", investor, country, Category::Climate)
            .with_decision_date(days_ago(days))
    }

    fn agg(records: &[ExclusionRecord]) -> Aggregation {
        aggregate(&CompanyEntity::new("Coal Co"), records)
    }

    fn broad_climate_records() -> Vec<ExclusionRecord> {
        vec![
            climate("KLP", "Norway", 30),
            climate("NBIM", "Norway", 60),
            climate("AP7", "Sweden", 90),
            climate("Church of England", "United Kingdom", 120),
            climate("PFZW", "Netherlands", 150),
            climate("ABP", "Netherlands", 300),
        ]
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((ScoreWeights::STANDARD.sum() - 1.0).abs() < 1e-12);
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn test_broad_recent_climate_is_high() {
        let scorer = RiskScorer::new();
        let breakdown = scorer.score(&agg(&broad_climate_records()), eval_date());

        assert_eq!(breakdown.tier, RiskTier::High);
        assert!(breakdown.consensus > 0.7, "consensus {}", breakdown.consensus);
        assert!(breakdown.severity > 0.7, "severity {}", breakdown.severity);
        assert!(breakdown.has_flag("broad_consensus"));
        assert!(breakdown.has_flag("multiple_jurisdictions"));
        assert_eq!(breakdown.scope, 1.0);
    }

    #[test]
    fn test_single_old_sector_cannabis_is_low() {
        let scorer = RiskScorer::new();
        let record = ExclusionRecord::new("Leaf Corp", "Folksam", "Sweden", Category::Cannabis)
            .with_scope(ExclusionScope::Sector)
            .with_decision_date(days_ago(8 * 365 + 2));
        let breakdown = scorer.score(&agg(&[record]), eval_date());

        assert_eq!(breakdown.tier, RiskTier::Low);
        assert!(breakdown.scope < 0.3);
        assert!(breakdown.recency < 0.3);
        assert!(!breakdown.has_flag("broad_consensus"));
    }

    #[test]
    fn test_final_score_in_unit_interval() {
        let scorer = RiskScorer::new();
        let samples = vec![
            broad_climate_records(),
            vec![ExclusionRecord::new("X", "", "", Category::Unspecified)],
            vec![climate("A", "B", -400)],
        ];
        for records in samples {
            let b = scorer.score(&agg(&records), eval_date());
            assert!((0.0..=1.0).contains(&b.final_score));
            for s in [b.consensus, b.severity, b.recency, b.scope] {
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }

    #[test]
    fn test_consensus_monotonic_in_new_investor() {
        let scorer = RiskScorer::new();
        let mut records = vec![climate("KLP", "Norway", 30)];
        let mut previous = scorer.score(&agg(&records), eval_date()).consensus;
        for (i, country) in ["Sweden", "Denmark", "Finland", "France", "Spain", "Italy", "Japan"]
            .iter()
            .enumerate()
        {
            records.push(climate(&format!("Investor {}", i), country, 30));
            let current = scorer.score(&agg(&records), eval_date()).consensus;
            assert!(current >= previous);
            previous = current;
        }
        assert!(previous <= 1.0);
    }

    #[test]
    fn test_single_investor_cannot_reach_high_consensus() {
        let scorer = RiskScorer::new();
        let records: Vec<ExclusionRecord> = (0..10).map(|i| climate("KLP", "Norway", i * 10)).collect();
        let breakdown = scorer.score(&agg(&records), eval_date());
        assert!(breakdown.consensus < 0.4);
    }

    #[test]
    fn test_undated_record_lowers_recency_not_consensus() {
        let scorer = RiskScorer::new();
        let dated = broad_climate_records();
        let mut undated = dated.clone();
        undated[0].decision_date = None;

        let a = scorer.score(&agg(&dated), eval_date());
        let b = scorer.score(&agg(&undated), eval_date());

        assert!(b.recency < a.recency);
        assert_eq!(a.consensus, b.consensus);
        assert_eq!(a.severity, b.severity);
        assert!(b.integrity_warnings().count() == 1);
    }

    #[test]
    fn test_severity_takes_max_category_and_multiplier() {
        let scorer = RiskScorer::new();
        let mixed = ExclusionRecord::new("X", "A", "N", Category::Cannabis)
            .with_additional_category(Category::HumanRights);
        let b = scorer.score(&agg(&[mixed]), eval_date());
        assert!((b.severity - 0.9).abs() < 1e-9);

        let labour = ExclusionRecord::new("X", "A", "N", Category::BusinessPractices)
            .with_motivation("Controversial behaviour");
        let b = scorer.score(&agg(&[labour]), eval_date());
        assert!((b.severity - 0.55 * 0.9).abs() < 1e-9);

        let coal = ExclusionRecord::new("X", "A", "N", Category::Climate)
            .with_motivation("Thermal coal expansion");
        let b = scorer.score(&agg(&[coal]), eval_date());
        assert_eq!(b.severity, 1.0);
    }

    #[test]
    fn test_step_decay() {
        let decay = RecencyDecay::standard_steps();
        assert_eq!(decay.weight(0.5), 1.0);
        assert_eq!(decay.weight(1.5), 0.9);
        assert_eq!(decay.weight(4.0), 0.8);
        assert_eq!(decay.weight(9.0), 0.7);

        let exp = RecencyDecay::default();
        assert!((exp.weight(2.0) - 0.5).abs() < 1e-12);
        assert_eq!(exp.weight(-1.0), 1.0);
    }

    #[test]
    fn test_tier_monotonic_step_function() {
        let tiers = TierThresholds::default();
        let mut previous = RiskTier::Low;
        for i in 0..=1000 {
            let score = i as f64 / 1000.0;
            let tier = tiers.tier(score);
            assert!(tier >= previous);
            if score < tiers.medium {
                assert_eq!(tier, RiskTier::Low);
            }
            previous = tier;
        }
        assert_eq!(tiers.tier(0.45), RiskTier::Medium);
        assert_eq!(tiers.tier(0.75), RiskTier::High);
    }

    #[test]
    fn test_flags_do_not_change_score() {
        let mut config = ScoringConfig::default();
        config.flags.broad_consensus_min_investors = 100;
        let strict = RiskScorer::with_config(config).unwrap();
        let default = RiskScorer::new();

        let records = broad_climate_records();
        let a = default.score(&agg(&records), eval_date());
        let b = strict.score(&agg(&records), eval_date());
        assert!(a.has_flag("broad_consensus"));
        assert!(!b.has_flag("broad_consensus"));
        assert_eq!(a.final_score, b.final_score);
    }

    #[test]
    fn test_recent_escalation() {
        let scorer = RiskScorer::new();
        let records = vec![climate("A", "Norway", 2000), climate("B", "Sweden", 20)];
        let b = scorer.score(&agg(&records), eval_date());
        assert!(b.has_flag("recent_escalation"));
        assert!(b.has_flag("persistent_concern"));

        let old: Vec<ExclusionRecord> = (0..4).map(|i| climate("A", "Norway", 800 + i)).collect();
        let mut with_new = old.clone();
        with_new.push(climate("B", "Norway", 10));
        let b = scorer.score(&agg(&with_new), eval_date());
        assert!(!b.has_flag("recent_escalation"));
    }

    #[test]
    fn test_sector_climate_and_severe_labour_flags() {
        let scorer = RiskScorer::new();
        let records = vec![
            climate("A", "Norway", 10).with_scope(ExclusionScope::Sector),
            ExclusionRecord::new("Coal Co", "B", "Sweden", Category::HumanRights)
                .with_motivation("Forced labour in supply chain"),
            ExclusionRecord::new("Coal Co", "C", "Denmark", Category::HumanRights)
                .with_motivation("Child labour"),
        ];
        let b = scorer.score(&agg(&records), eval_date());
        assert!(b.has_flag("sector_wide_climate"));
        assert!(b.has_flag("severe_labour_allegations"));
        assert!(b.has_flag("multiple_categories"));
    }

    #[test]
    fn test_data_confidence() {
        let scorer = RiskScorer::new();
        let records = vec![
            climate("A", "Norway", 10),
            ExclusionRecord::new("Coal Co", "B", "Sweden", Category::Unspecified),
        ];
        let b = scorer.score(&agg(&records), eval_date());
        assert!((b.data_confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_aggregation() {
        let scorer = RiskScorer::new();
        let b = scorer.score(&agg(&[]), eval_date());
        assert_eq!(b.final_score, 0.0);
        assert_eq!(b.tier, RiskTier::Low);
        assert!(b.flags.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let scorer = RiskScorer::new();
        let records = broad_climate_records();
        let a = scorer.score(&agg(&records), eval_date());
        let b = scorer.score(&agg(&records), eval_date());
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.scope = 0.2;
        assert!(matches!(
            RiskScorer::with_config(config),
            Err(ConfigurationError::WeightsDoNotSumToOne { .. })
        ));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut config = ScoringConfig::default();
        config.tiers = TierThresholds { medium: 0.8, high: 0.5 };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidThresholds { .. })
        ));

        let mut config = ScoringConfig::default();
        config.recency = RecencyDecay::Step { steps: vec![], beyond: 0.5 };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_percentile_thresholds() {
        let scores: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        let tiers = TierThresholds::from_percentiles(&scores, 50.0, 80.0);
        assert!((tiers.medium - 0.5).abs() < 1e-12);
        assert!((tiers.high - 0.8).abs() < 1e-12);

        assert_eq!(TierThresholds::from_percentiles(&[0.3], 50.0, 80.0), TierThresholds::default());
        assert_eq!(
            TierThresholds::from_percentiles(&[0.3, 0.3, 0.3], 50.0, 80.0),
            TierThresholds::default()
        );
    }

    #[test]
    fn test_breakdown_display() {
        let scorer = RiskScorer::new();
        let text = scorer.score(&agg(&broad_climate_records()), eval_date()).to_string();
        assert!(text.starts_with("High Risk"));
        assert!(text.contains("Consensus (40%)"));
        assert!(text.contains("broad consensus"));
    }
}
