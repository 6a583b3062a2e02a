//! Exclusion records and canonicalization of raw loader rows.
//!
//! The external loader hands rows over as plain strings. [`ExclusionRecord::from_raw`]
//! turns them into typed records without ever rejecting a row: anything it
//! cannot interpret is kept with a default value and an [`IntegrityIssue`].

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Exclusion category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Climate,
    HumanRights,
    Governance,
    BusinessPractices,
    Cannabis,
    Unspecified,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Climate,
        Category::HumanRights,
        Category::Governance,
        Category::BusinessPractices,
        Category::Cannabis,
        Category::Unspecified,
    ];

    /// Human-readable label, as used in source datasets
    pub fn label(&self) -> &'static str {
        match self {
            Category::Climate => "climate",
            Category::HumanRights => "human rights",
            Category::Governance => "governance",
            Category::BusinessPractices => "business practices",
            Category::Cannabis => "cannabis",
            Category::Unspecified => "unspecified",
        }
    }

    /// Parse an exact category label. Case, underscores and surrounding
    /// whitespace are ignored.
    pub fn parse(text: &str) -> Option<Category> {
        let cleaned = text.trim().to_lowercase().replace('_', " ");
        Category::ALL.into_iter().find(|c| c.label() == cleaned)
    }

    /// Map free category/motivation text onto a known category.
    ///
    /// An exact label wins; otherwise the first category whose keywords occur
    /// in the combined text. `None` when nothing is recognized.
    pub fn canonicalize(category_text: &str, motivation_text: &str) -> Option<Category> {
        if let Some(category) = Category::parse(category_text) {
            return Some(category);
        }
        let combined = format!("{} {}", category_text, motivation_text).to_lowercase();
        keyword_categories(&combined).into_iter().next()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether an exclusion targets the company itself or its whole sector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionScope {
    Company,
    Sector,
}

impl ExclusionScope {
    pub fn parse(text: &str) -> Option<ExclusionScope> {
        match text.trim().to_lowercase().as_str() {
            "company" | "company-level" | "company level" => Some(ExclusionScope::Company),
            "sector" | "sector-level" | "sector level" => Some(ExclusionScope::Sector),
            _ => None,
        }
    }
}

impl fmt::Display for ExclusionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionScope::Company => write!(f, "company"),
            ExclusionScope::Sector => write!(f, "sector"),
        }
    }
}

/// Problems found while canonicalizing a raw row. The row is always kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "raw", rename_all = "snake_case")]
pub enum IntegrityIssue {
    MalformedDecisionDate(String),
    UnrecognizedCategory(String),
    UnrecognizedScope(String),
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::MalformedDecisionDate(raw) => {
                write!(f, "malformed decision date '{}'", raw)
            }
            IntegrityIssue::UnrecognizedCategory(raw) => {
                write!(f, "unrecognized category '{}', treated as unspecified", raw)
            }
            IntegrityIssue::UnrecognizedScope(raw) => {
                write!(f, "unrecognized scope '{}', treated as company-level", raw)
            }
        }
    }
}

/// Row as delivered by the data-loading collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExclusionRecord {
    pub company_name: String,
    pub investor_name: String,
    pub investor_country: String,
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub motivation: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub decision_date: String,
}

/// One investor's decision to exclude one company
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExclusionRecord {
    pub company_name: String,
    pub investor_name: String,
    pub investor_country: String,
    pub category: Category,
    /// Further categories the motivation text points at
    #[serde(default)]
    pub additional_categories: Vec<Category>,
    #[serde(default)]
    pub motivation_text: String,
    pub scope: ExclusionScope,
    pub decision_date: Option<NaiveDate>,
    #[serde(default)]
    pub integrity_issues: Vec<IntegrityIssue>,
}

impl ExclusionRecord {
    /// Company-level, undated record. Use the `with_*` setters for the rest.
    pub fn new(
        company_name: impl Into<String>,
        investor_name: impl Into<String>,
        investor_country: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            investor_name: investor_name.into(),
            investor_country: investor_country.into(),
            category,
            additional_categories: Vec::new(),
            motivation_text: String::new(),
            scope: ExclusionScope::Company,
            decision_date: None,
            integrity_issues: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: ExclusionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_decision_date(mut self, date: NaiveDate) -> Self {
        self.decision_date = Some(date);
        self
    }

    pub fn with_motivation(mut self, text: impl Into<String>) -> Self {
        self.motivation_text = text.into();
        self
    }

    pub fn with_additional_category(mut self, category: Category) -> Self {
        if category != self.category && !self.additional_categories.contains(&category) {
            self.additional_categories.push(category);
        }
        self
    }

    /// Canonicalize a raw loader row. Never fails.
    pub fn from_raw(raw: &RawExclusionRecord) -> Self {
        let mut issues = Vec::new();

        let category_text = format!("{} {}", raw.category, raw.sub_category);
        let category = match Category::canonicalize(&category_text, &raw.motivation) {
            Some(category) => category,
            None => {
                if !raw.category.trim().is_empty() {
                    issues.push(IntegrityIssue::UnrecognizedCategory(
                        raw.category.trim().to_string(),
                    ));
                }
                Category::Unspecified
            }
        };

        let additional_categories = keyword_categories(&raw.motivation.to_lowercase())
            .into_iter()
            .filter(|c| *c != category)
            .collect();

        let scope = match ExclusionScope::parse(&raw.scope) {
            Some(scope) => scope,
            None => {
                if !raw.scope.trim().is_empty() {
                    issues.push(IntegrityIssue::UnrecognizedScope(raw.scope.trim().to_string()));
                }
                ExclusionScope::Company
            }
        };

        let decision_date = match parse_decision_date(&raw.decision_date) {
            DateParse::Parsed(date) => Some(date),
            DateParse::Missing => None,
            DateParse::Malformed => {
                issues.push(IntegrityIssue::MalformedDecisionDate(
                    raw.decision_date.trim().to_string(),
                ));
                None
            }
        };

        Self {
            company_name: raw.company_name.trim().to_string(),
            investor_name: raw.investor_name.trim().to_string(),
            investor_country: raw.investor_country.trim().to_string(),
            category,
            additional_categories,
            motivation_text: raw.motivation.trim().to_string(),
            scope,
            decision_date,
            integrity_issues: issues,
        }
    }

    /// Primary category followed by any additional ones
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        std::iter::once(self.category).chain(self.additional_categories.iter().copied())
    }
}

/// Outcome of parsing a raw decision date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateParse {
    Parsed(NaiveDate),
    Missing,
    Malformed,
}

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("static pattern"));
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("static pattern"));

/// Parse a decision date as found in exclusion lists.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a time), `;`-separated lists
/// where the first ISO date wins, and a bare `20xx` year, read as 1 July.
pub fn parse_decision_date(text: &str) -> DateParse {
    let text = text.trim();
    if text.is_empty() {
        return DateParse::Missing;
    }

    for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(caps) = ISO_DATE.captures(part) {
            let parsed = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(y), Ok(m), Ok(d)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return DateParse::Parsed(date);
                }
            }
            return DateParse::Malformed;
        }
    }

    if let Some(caps) = YEAR.captures(text) {
        if let Some(date) = caps[1]
            .parse::<i32>()
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 7, 1))
        {
            return DateParse::Parsed(date);
        }
    }

    DateParse::Malformed
}

const CATEGORY_KEYWORDS: [(Category, &[&str]); 5] = [
    (
        Category::Climate,
        &[
            "climate", "fossil", "coal", "oil", "gas", "carbon", "emission", "emissions",
            "environmental", "deforestation", "palm oil", "energy transition", "thermal coal",
            "shale", "tar sands", "arctic drilling", "fracking",
        ],
    ),
    (
        Category::HumanRights,
        &[
            "human rights", "child labor", "child labour", "forced labor", "forced labour",
            "labor rights", "labour rights", "workplace rights", "social issues",
            "indigenous rights", "community rights", "worker rights",
        ],
    ),
    (
        Category::Governance,
        &[
            "corruption", "bribery", "fraud", "governance", "compliance", "money laundering",
            "tax evasion", "regulatory", "ethics", "integrity", "transparency",
            "anti-corruption",
        ],
    ),
    (
        Category::BusinessPractices,
        &[
            "business practices", "controversial behaviour", "controversial behavior",
            "norms-based", "norms based", "conduct", "violations", "breaches",
        ],
    ),
    (Category::Cannabis, &["cannabis", "marijuana", "hemp"]),
];

static CATEGORY_PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, words)| {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"\b(?:{})\b", alternation);
            (*category, Regex::new(&pattern).expect("escaped keyword pattern"))
        })
        .collect()
});

/// Categories whose keywords occur in already-lowercased text, in table order
fn keyword_categories(text: &str) -> Vec<Category> {
    CATEGORY_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
        .collect()
}
