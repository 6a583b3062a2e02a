//! Grouping of an entity's exclusion records
//!
//! Builds the counts the scorer consumes: distinct investors and investor
//! countries, per-category and per-scope tallies, and the record list ordered
//! by decision date. Records are never dropped; data problems are collected
//! as [`DataIntegrityWarning`]s.

use crate::matcher::CompanyEntity;
use crate::record::{Category, ExclusionRecord, ExclusionScope, IntegrityIssue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of data problem found on a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityWarningKind {
    MissingDecisionDate,
    MalformedDecisionDate,
    UnrecognizedCategory,
    UnrecognizedScope,
}

/// Data problem attached to an assessment. Never aborts scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataIntegrityWarning {
    pub kind: IntegrityWarningKind,
    pub investor_name: String,
    pub detail: String,
}

impl fmt::Display for DataIntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (investor: {})", self.detail, self.investor_name)
    }
}

/// Grouped view of one entity's exclusion history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub entity: CompanyEntity,
    /// Most recent first, undated last
    pub records: Vec<ExclusionRecord>,
    pub investors: BTreeSet<String>,
    pub countries: BTreeSet<String>,
    pub category_counts: BTreeMap<Category, usize>,
    pub scope_counts: BTreeMap<ExclusionScope, usize>,
    pub undated_records: usize,
    pub earliest_decision: Option<NaiveDate>,
    pub latest_decision: Option<NaiveDate>,
    pub warnings: Vec<DataIntegrityWarning>,
}

impl Aggregation {
    pub fn total_records(&self) -> usize {
        self.records.len()
    }

    pub fn distinct_investors(&self) -> usize {
        self.investors.len()
    }

    pub fn distinct_countries(&self) -> usize {
        self.countries.len()
    }

    pub fn category_count(&self, category: Category) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn scope_count(&self, scope: ExclusionScope) -> usize {
        self.scope_counts.get(&scope).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most frequent primary category. Ties go to the category listed first
    /// in [`Category::ALL`]; `Unspecified` when there are no records.
    pub fn dominant_category(&self) -> Category {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.category_count(c)))
            .filter(|(_, n)| *n > 0)
            .fold(None, |best: Option<(Category, usize)>, (c, n)| match best {
                Some((_, best_n)) if best_n >= n => best,
                _ => Some((c, n)),
            })
            .map(|(c, _)| c)
            .unwrap_or(Category::Unspecified)
    }

    /// Counts and date range without the record list
    pub fn summary(&self) -> AggregationSummary {
        AggregationSummary {
            total_records: self.total_records(),
            distinct_investors: self.distinct_investors(),
            distinct_countries: self.distinct_countries(),
            category_counts: self.category_counts.clone(),
            scope_counts: self.scope_counts.clone(),
            undated_records: self.undated_records,
            earliest_decision: self.earliest_decision,
            latest_decision: self.latest_decision,
            dominant_category: self.dominant_category(),
        }
    }
}

/// Compact aggregation figures carried in an assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationSummary {
    pub total_records: usize,
    pub distinct_investors: usize,
    pub distinct_countries: usize,
    pub category_counts: BTreeMap<Category, usize>,
    pub scope_counts: BTreeMap<ExclusionScope, usize>,
    pub undated_records: usize,
    pub earliest_decision: Option<NaiveDate>,
    pub latest_decision: Option<NaiveDate>,
    pub dominant_category: Category,
}

/// Group the records already attributed to `entity`
pub fn aggregate<'a>(
    entity: &CompanyEntity,
    records: impl IntoIterator<Item = &'a ExclusionRecord>,
) -> Aggregation {
    let mut records: Vec<ExclusionRecord> = records.into_iter().cloned().collect();
    records.sort_by(compare_records);

    let mut investors = BTreeSet::new();
    let mut countries = BTreeSet::new();
    let mut category_counts = BTreeMap::new();
    let mut scope_counts = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut undated_records = 0;

    for record in &records {
        if let Some(key) = identity_key(&record.investor_name) {
            investors.insert(key);
        }
        if let Some(key) = identity_key(&record.investor_country) {
            countries.insert(key);
        }
        *category_counts.entry(record.category).or_insert(0) += 1;
        *scope_counts.entry(record.scope).or_insert(0) += 1;

        for issue in &record.integrity_issues {
            warnings.push(warning_for_issue(record, issue));
        }
        if record.decision_date.is_none() {
            undated_records += 1;
            let malformed = record
                .integrity_issues
                .iter()
                .any(|i| matches!(i, IntegrityIssue::MalformedDecisionDate(_)));
            if !malformed {
                warnings.push(DataIntegrityWarning {
                    kind: IntegrityWarningKind::MissingDecisionDate,
                    investor_name: record.investor_name.clone(),
                    detail: "missing decision date, excluded from recency".to_string(),
                });
            }
        }
    }

    let latest_decision = records.iter().filter_map(|r| r.decision_date).max();
    let earliest_decision = records.iter().filter_map(|r| r.decision_date).min();

    Aggregation {
        entity: entity.clone(),
        records,
        investors,
        countries,
        category_counts,
        scope_counts,
        undated_records,
        earliest_decision,
        latest_decision,
        warnings,
    }
}

fn warning_for_issue(record: &ExclusionRecord, issue: &IntegrityIssue) -> DataIntegrityWarning {
    let kind = match issue {
        IntegrityIssue::MalformedDecisionDate(_) => IntegrityWarningKind::MalformedDecisionDate,
        IntegrityIssue::UnrecognizedCategory(_) => IntegrityWarningKind::UnrecognizedCategory,
        IntegrityIssue::UnrecognizedScope(_) => IntegrityWarningKind::UnrecognizedScope,
    };
    DataIntegrityWarning {
        kind,
        investor_name: record.investor_name.clone(),
        detail: issue.to_string(),
    }
}

/// Case-insensitive identity for investors and countries; blanks don't count
fn identity_key(name: &str) -> Option<String> {
    let key = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Decision date desc with undated last, then investor, then country
fn compare_records(a: &ExclusionRecord, b: &ExclusionRecord) -> Ordering {
    match (a.decision_date, b.decision_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.investor_name.cmp(&b.investor_name))
    .then_with(|| a.investor_country.cmp(&b.investor_country))
}
