//! Tiered engagement recommendations
//!
//! Maps a risk tier, its flags and the dominant exclusion category onto
//! static playbook guidance. The mapping is total: every tier has an entry
//! and every category falls back to the tier's generic guidance. A sanctions
//! listing adds a tier-specific note and upgrades Low to enhanced controls
//! without changing the tier.

use crate::config::ConfigurationError;
use crate::record::Category;
use crate::scoring::{RiskFlag, RiskTier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Guidance for one risk tier
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierPlaybook {
    pub title: String,
    pub business_context: String,
    pub compliance_requirement: String,
    pub acceptable_scopes: Vec<String>,
    pub restricted_scopes: Vec<String>,
    pub contract_clauses: Vec<String>,
    pub monitoring: Vec<String>,
    pub quick_wins: Vec<String>,
}

/// Category-specific guidance for a tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryGuidance {
    pub category: Category,
    pub tier: RiskTier,
    pub guidance: String,
}

/// Fallback guidance per tier when no category entry applies
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenericGuidance {
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl GenericGuidance {
    pub fn get(&self, tier: RiskTier) -> &str {
        match tier {
            RiskTier::Low => &self.low,
            RiskTier::Medium => &self.medium,
            RiskTier::High => &self.high,
        }
    }
}

/// Guidance applied when the company appears on a sanctions list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SanctionsGuidance {
    /// Replaces the Low playbook
    pub enhanced_controls: TierPlaybook,
    /// Note added for each tier
    pub notes: GenericGuidance,
}

/// Complete recommendation table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Playbook {
    pub low: TierPlaybook,
    pub medium: TierPlaybook,
    pub high: TierPlaybook,
    pub category_guidance: Vec<CategoryGuidance>,
    pub generic_guidance: GenericGuidance,
    /// Flag code -> note
    pub flag_notes: BTreeMap<String, String>,
    pub sanctions: SanctionsGuidance,
}

impl Default for Playbook {
    fn default() -> Self {
        Self::standard()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn require_text(name: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::InvalidParameter {
            name: name.to_string(),
            reason: "must not be blank".to_string(),
        });
    }
    Ok(())
}

fn validate_tier(prefix: &str, playbook: &TierPlaybook) -> Result<(), ConfigurationError> {
    require_text(&format!("{}.title", prefix), &playbook.title)?;
    require_text(
        &format!("{}.compliance_requirement", prefix),
        &playbook.compliance_requirement,
    )
}

fn validate_notes(prefix: &str, notes: &GenericGuidance) -> Result<(), ConfigurationError> {
    for tier in RiskTier::ALL {
        let name = format!("{}.{}", prefix, tier_key(tier));
        require_text(&name, notes.get(tier))?;
    }
    Ok(())
}

fn tier_key(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Low => "low",
        RiskTier::Medium => "medium",
        RiskTier::High => "high",
    }
}

impl Playbook {
    pub fn tier(&self, tier: RiskTier) -> &TierPlaybook {
        match tier {
            RiskTier::Low => &self.low,
            RiskTier::Medium => &self.medium,
            RiskTier::High => &self.high,
        }
    }

    /// Every tier needs a title and a compliance requirement, and every
    /// fallback note must be present, so that recommendations are never blank.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for tier in RiskTier::ALL {
            validate_tier(&format!("playbook.{}", tier_key(tier)), self.tier(tier))?;
        }
        validate_notes("playbook.generic_guidance", &self.generic_guidance)?;
        validate_tier(
            "playbook.sanctions.enhanced_controls",
            &self.sanctions.enhanced_controls,
        )?;
        validate_notes("playbook.sanctions.notes", &self.sanctions.notes)
    }

    /// Built-in engagement playbook
    pub fn standard() -> Self {
        let low = TierPlaybook {
            title: "Proceed per standard controls".to_string(),
            business_context: "No significant ESG concerns identified. Proceed with standard controls."
                .to_string(),
            compliance_requirement: "No pre-approval needed. Random quarterly spot checks; keep the \
                evidence pack (sources, decision dates) in the central register."
                .to_string(),
            acceptable_scopes: strings(&["All standard services"]),
            restricted_scopes: Vec::new(),
            contract_clauses: strings(&[
                "Standard clauses: code of conduct, anti-corruption, HSE, data privacy",
            ]),
            monitoring: strings(&[
                "Passive monitoring",
                "Re-screen before major new proposals or annually",
            ]),
            quick_wins: Vec::new(),
        };

        let medium = TierPlaybook {
            title: "Controlled engagement with enhanced oversight".to_string(),
            business_context: "Moderate ESG concerns identified. Engagement is viable with targeted \
                mitigations and scope guardrails."
                .to_string(),
            compliance_requirement: "Unit-level pre-approval with logged conditions, model clauses \
                aligned to the risk and practical KPIs."
                .to_string(),
            acceptable_scopes: strings(&[
                "Standard operations",
                "Safety improvements",
                "Compliance uplift",
                "Environmental remediation",
                "Transition planning",
            ]),
            restricted_scopes: strings(&[
                "Activities that would directly worsen or expand the flagged issue area",
            ]),
            contract_clauses: strings(&[
                "Right to suspend or terminate if credible allegations emerge",
                "Prohibit scopes that worsen the flagged issue",
                "Pre-clear sensitive communications and case studies",
            ]),
            monitoring: strings(&[
                "Quarterly re-screening aligned to project milestones",
                "Escalate to High if sector-level bans emerge, impacted countries reach 3 or \
                 investor exclusions reach 5",
            ]),
            quick_wins: strings(&["Add a one-page scope guardrails annex to proposals"]),
        };

        let high = TierPlaybook {
            title: "Strategic engagement with executive oversight".to_string(),
            business_context: "Significant ESG concerns identified. Engagement may proceed for \
                strategic clients with executive approval and tightly defined, harm-reducing scopes."
                .to_string(),
            compliance_requirement: "Executive approval with documented rationale. Enhanced due \
                diligence (UNGC/OECD/ILO evidence), third-party integrity reports, grievance \
                mechanisms and an independent verification plan."
                .to_string(),
            acceptable_scopes: strings(&[
                "Safety-critical",
                "Environmental remediation",
                "Decommissioning",
                "Just transition",
                "Compliance uplift",
                "Renewable transition",
            ]),
            restricted_scopes: strings(&[
                "Fossil expansion",
                "Exploration",
                "Any services that could worsen ESG concerns",
            ]),
            contract_clauses: strings(&[
                "Audit and access rights",
                "Corrective action plan with milestones",
                "Step-in and exit rights",
                "Disclosure cooperation",
                "Human-rights remediation obligations",
                "Performance triggers to pause or exit on credible allegations or KPI failures",
            ]),
            monitoring: strings(&[
                "Monthly active monitoring and milestone reviews",
                "Terminate or pause if conditions are breached or risk escalates",
            ]),
            quick_wins: strings(&[
                "Run a harm-reduction scoping workshop to shape acceptable work packages",
                "Produce a two-page executive brief on safeguards, KPIs and exit triggers",
            ]),
        };

        let guidance = |category, tier, text: &str| CategoryGuidance {
            category,
            tier,
            guidance: text.to_string(),
        };
        let category_guidance = vec![
            guidance(
                Category::HumanRights,
                RiskTier::Medium,
                "Focus on freedom of association and collective bargaining commitments, worker \
                 voice mechanisms and independent audits with remediation clauses.",
            ),
            guidance(
                Category::HumanRights,
                RiskTier::High,
                "Enhanced due diligence must include ILO compliance evidence, independent \
                 verification of working conditions and a human rights impact assessment. \
                 Consider only safety-critical or harm-reduction scopes.",
            ),
            guidance(
                Category::Climate,
                RiskTier::Medium,
                "Conduct a Paris-alignment assessment for climate-adjacent work and include \
                 transition elements. Prohibit services enabling fossil expansion.",
            ),
            guidance(
                Category::Climate,
                RiskTier::High,
                "Restrict engagement to transition-aligned, decommissioning or remediation work. \
                 Prohibit fossil expansion and require monthly Paris-alignment monitoring.",
            ),
            guidance(
                Category::Governance,
                RiskTier::Medium,
                "Require UNGC and OECD adherence and corrective action plans with time-bound \
                 milestones.",
            ),
            guidance(
                Category::Governance,
                RiskTier::High,
                "Enhanced due diligence must include anti-corruption policy evidence and \
                 third-party integrity reports. Limit scope to compliance uplift.",
            ),
            guidance(
                Category::BusinessPractices,
                RiskTier::Medium,
                "Review the cited conduct against the code of conduct and add a right to \
                 suspend on credible new allegations.",
            ),
            guidance(
                Category::BusinessPractices,
                RiskTier::High,
                "Obtain independent verification that the cited conduct has been remediated \
                 before engagement.",
            ),
        ];

        let generic_guidance = GenericGuidance {
            low: "No category-specific action required.".to_string(),
            medium: "Align scope guardrails with the cited exclusion motivations.".to_string(),
            high: "Limit scope to harm-reducing work and document the rationale for engagement."
                .to_string(),
        };

        let flag_notes = [
            (
                "broad_consensus",
                "Exclusions come from a broad, multi-country investor base.",
            ),
            (
                "multiple_jurisdictions",
                "Concerns are shared across independent jurisdictions.",
            ),
            (
                "recent_escalation",
                "Most exclusion decisions are recent; re-screen before each milestone.",
            ),
            (
                "sector_wide_climate",
                "Sector-wide climate exclusions apply; expect further investor action.",
            ),
            (
                "multiple_categories",
                "Concerns span several ESG categories; cover each in due diligence.",
            ),
            (
                "persistent_concern",
                "Concerns have persisted for several years without resolution.",
            ),
            (
                "severe_labour_allegations",
                "Forced or child labour allegations require independent verification.",
            ),
            (
                "data_integrity",
                "Some source records were incomplete; verify against primary sources.",
            ),
        ]
        .into_iter()
        .map(|(code, note)| (code.to_string(), note.to_string()))
        .collect();

        let sanctions = SanctionsGuidance {
            enhanced_controls: TierPlaybook {
                title: "Sanctions listing: enhanced controls required".to_string(),
                business_context: "No significant ESG exclusions, but the company appears on a \
                    debarment or sanctions list."
                    .to_string(),
                compliance_requirement: "Pre-approval required. Compliance and legal must confirm \
                    the listing status and its scope before any engagement."
                    .to_string(),
                acceptable_scopes: strings(&["Standard services after compliance clearance"]),
                restricted_scopes: strings(&["Any work before the listing is cleared"]),
                contract_clauses: strings(&[
                    "Standard clauses: code of conduct, anti-corruption, HSE, data privacy",
                    "Sanctions and debarment compliance warranty",
                    "Right to terminate on confirmed sanctions status",
                ]),
                monitoring: strings(&["Re-check the listing before each new proposal"]),
                quick_wins: Vec::new(),
            },
            notes: GenericGuidance {
                low: "Sanctions listing found: pre-approval and enhanced controls required."
                    .to_string(),
                medium: "Sanctions listing requires additional compliance verification."
                    .to_string(),
                high: "Sanctions listing detected: additional compliance and legal review needed."
                    .to_string(),
            },
        };

        Self {
            low,
            medium,
            high,
            category_guidance,
            generic_guidance,
            flag_notes,
            sanctions,
        }
    }
}

/// Recommendation attached to an assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationEntry {
    pub tier: RiskTier,
    pub category: Category,
    #[serde(flatten)]
    pub playbook: TierPlaybook,
    pub category_guidance: String,
    pub flag_notes: Vec<String>,
    /// Low playbook replaced by the sanctions enhanced-controls playbook
    pub enhanced_controls: bool,
}

const SANCTIONS_HIT: &str = "sanctions_hit";

/// Maps scored results onto playbook entries
#[derive(Debug, Clone, Default)]
pub struct RecommendationMapper {
    playbook: Playbook,
}

impl RecommendationMapper {
    /// Create new mapper with the standard playbook
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playbook(playbook: Playbook) -> Self {
        Self { playbook }
    }

    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    pub fn recommend(
        &self,
        tier: RiskTier,
        flags: &[RiskFlag],
        dominant_category: Category,
    ) -> RecommendationEntry {
        let category_guidance = self
            .playbook
            .category_guidance
            .iter()
            .find(|g| g.tier == tier && g.category == dominant_category)
            .map(|g| g.guidance.clone())
            .unwrap_or_else(|| self.playbook.generic_guidance.get(tier).to_string());

        let mut seen = BTreeSet::new();
        let flag_notes = flags
            .iter()
            .map(RiskFlag::code)
            .filter(|code| seen.insert(*code))
            .filter_map(|code| match code {
                SANCTIONS_HIT => Some(self.playbook.sanctions.notes.get(tier).to_string()),
                _ => self.playbook.flag_notes.get(code).cloned(),
            })
            .collect();

        let enhanced_controls = tier == RiskTier::Low && seen.contains(SANCTIONS_HIT);
        let playbook = if enhanced_controls {
            self.playbook.sanctions.enhanced_controls.clone()
        } else {
            self.playbook.tier(tier).clone()
        };

        RecommendationEntry {
            tier,
            category: dominant_category,
            playbook,
            category_guidance,
            flag_notes,
            enhanced_controls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{DataIntegrityWarning, IntegrityWarningKind};
    use crate::sanctions::SanctionsList;

    fn integrity_flag(investor: &str) -> RiskFlag {
        RiskFlag::DataIntegrity {
            warning: DataIntegrityWarning {
                kind: IntegrityWarningKind::MissingDecisionDate,
                investor_name: investor.to_string(),
                detail: String::new(),
            },
        }
    }

    fn sanctions_flag() -> RiskFlag {
        RiskFlag::SanctionsHit {
            matched_name: "Acme Construction Ltd".to_string(),
            lists: vec![SanctionsList::WorldBank],
        }
    }

    #[test]
    fn test_every_tier_and_category_has_entry() {
        let mapper = RecommendationMapper::new();
        for tier in RiskTier::ALL {
            for category in Category::ALL {
                let entry = mapper.recommend(tier, &[], category);
                assert_eq!(entry.tier, tier);
                assert!(!entry.playbook.title.is_empty());
                assert!(!entry.category_guidance.is_empty());
            }
        }
    }

    #[test]
    fn test_category_guidance_used_for_high_climate() {
        let mapper = RecommendationMapper::new();
        let entry = mapper.recommend(RiskTier::High, &[], Category::Climate);
        assert!(entry.category_guidance.contains("Paris-alignment"));
        assert!(entry.playbook.restricted_scopes.iter().any(|s| s == "Fossil expansion"));
    }

    #[test]
    fn test_fallback_to_generic_guidance() {
        let mapper = RecommendationMapper::new();
        let entry = mapper.recommend(RiskTier::Medium, &[], Category::Cannabis);
        assert_eq!(
            entry.category_guidance,
            mapper.playbook().generic_guidance.medium
        );
    }

    #[test]
    fn test_flag_notes_deduplicated() {
        let mapper = RecommendationMapper::new();
        let flags = vec![
            integrity_flag("A"),
            RiskFlag::SectorWideClimate,
            integrity_flag("B"),
        ];
        let entry = mapper.recommend(RiskTier::Medium, &flags, Category::Climate);
        assert_eq!(entry.flag_notes.len(), 2);
        assert!(entry.flag_notes[0].contains("incomplete"));
    }

    #[test]
    fn test_partial_playbook_still_total() {
        let playbook: Playbook =
            serde_json::from_str(r#"{"category_guidance": [], "flag_notes": {}}"#).unwrap();
        let mapper = RecommendationMapper::with_playbook(playbook);
        let entry = mapper.recommend(RiskTier::High, &[RiskFlag::SectorWideClimate], Category::Climate);
        assert!(!entry.playbook.title.is_empty());
        assert!(entry.flag_notes.is_empty());
    }

    #[test]
    fn test_sanctions_upgrade_low_to_enhanced_controls() {
        let mapper = RecommendationMapper::new();
        let plain = mapper.recommend(RiskTier::Low, &[], Category::Cannabis);
        let listed = mapper.recommend(RiskTier::Low, &[sanctions_flag()], Category::Cannabis);

        assert!(!plain.enhanced_controls);
        assert!(listed.enhanced_controls);
        assert_eq!(listed.tier, RiskTier::Low);
        assert!(listed.playbook.title.contains("enhanced controls"));
        assert!(listed.playbook.compliance_requirement.starts_with("Pre-approval required"));
        assert_eq!(listed.flag_notes, vec![mapper.playbook().sanctions.notes.low.clone()]);
    }

    #[test]
    fn test_sanctions_note_for_higher_tiers() {
        let mapper = RecommendationMapper::new();
        for tier in [RiskTier::Medium, RiskTier::High] {
            let entry = mapper.recommend(tier, &[sanctions_flag(), sanctions_flag()], Category::Climate);
            assert!(!entry.enhanced_controls);
            assert_eq!(entry.playbook, *mapper.playbook().tier(tier));
            assert_eq!(entry.flag_notes.len(), 1);
            assert!(entry.flag_notes[0].contains("compliance"));
        }
    }

    #[test]
    fn test_standard_playbook_valid() {
        assert!(Playbook::standard().validate().is_ok());
    }

    #[test]
    fn test_blank_tier_rejected() {
        let playbook: Playbook = serde_json::from_str(r#"{"high": {}}"#).unwrap();
        assert_eq!(
            playbook.validate(),
            Err(ConfigurationError::InvalidParameter {
                name: "playbook.high.title".to_string(),
                reason: "must not be blank".to_string(),
            })
        );

        let mut playbook = Playbook::standard();
        playbook.medium.compliance_requirement = "  ".to_string();
        assert!(playbook.validate().is_err());
    }

    #[test]
    fn test_blank_generic_guidance_rejected() {
        let mut playbook = Playbook::standard();
        playbook.generic_guidance.low.clear();
        assert!(matches!(
            playbook.validate(),
            Err(ConfigurationError::InvalidParameter { name, .. })
                if name == "playbook.generic_guidance.low"
        ));

        let mut playbook = Playbook::standard();
        playbook.sanctions.notes.high.clear();
        assert!(playbook.validate().is_err());
    }
}
