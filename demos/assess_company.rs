//! Company assessment example
//!
//! Builds a small exclusion dataset, then screens a few company names:
//! a broad climate consensus, a single historical sector exclusion, an
//! ambiguous query, an unknown company and a company found only on the
//! World Bank debarment list.
//!
//! Run with `RUST_LOG=debug` to see matcher and scorer tracing.

use chrono::NaiveDate;
use esg_exclusion_risk::{
    Assessment, AssessorConfig, DatasetSnapshot, ExclusionRecord, RawExclusionRecord,
    RiskAssessor, SanctionsList,
};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn raw(company: &str, investor: &str, country: &str, category: &str, date: &str) -> RawExclusionRecord {
    RawExclusionRecord {
        company_name: company.to_string(),
        investor_name: investor.to_string(),
        investor_country: country.to_string(),
        category: category.to_string(),
        decision_date: date.to_string(),
        ..Default::default()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    println!("=== ESG Exclusion Risk Assessment ===\n");

    let raw_records = vec![
        raw("Coal India Ltd", "KLP", "Norway", "Climate", "2024-05-02"),
        raw("Coal India Ltd", "NBIM", "Norway", "Climate", "2024-03-14"),
        raw("COAL INDIA LIMITED", "AP7", "Sweden", "Climate", "2023-12-01"),
        raw("Coal India Ltd.", "Church of England", "United Kingdom", "Thermal coal", "2023-11-20"),
        raw("Coal India Ltd", "PFZW", "Netherlands", "climate", "2024-01-09"),
        raw("Coal India Ltd", "ABP", "Netherlands", "Climate", "2023"),
        raw("Leaf Corp", "Folksam", "Sweden", "Cannabis", "2016-06-01"),
        raw("Shell Energy", "KLP", "Norway", "Climate", "2022-04-01"),
        raw("Shell Trading", "KLP", "Norway", "Climate", "2022-04-01"),
        raw("Vale S.A.", "Storebrand", "Norway", "Human rights", "unknown"),
    ];
    let records: Vec<ExclusionRecord> = raw_records.iter().map(ExclusionRecord::from_raw).collect();
    let snapshot = DatasetSnapshot::builder()
        .records(records)
        .sanctions(SanctionsList::WorldBank, &["Leaf Corporation", "Acme Construction Ltd"])
        .build();

    println!(
        "Dataset: {} records, {} companies, {} sanctioned names",
        snapshot.len(),
        snapshot.entities().len(),
        snapshot.sanctions().len()
    );
    println!("Fingerprint: {}\n", snapshot.fingerprint());

    let assessor = match RiskAssessor::new(AssessorConfig::default()) {
        Ok(assessor) => assessor,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return;
        }
    };
    let Some(evaluation_date) = NaiveDate::from_ymd_opt(2024, 6, 30) else {
        return;
    };

    let queries = [
        "coal india",
        "Leaf Corp.",
        "Vale",
        "shell",
        "Zzzznotacompany123",
        "Acme Construction",
        "  ",
    ];
    for (i, query) in queries.iter().enumerate() {
        println!("{}. Query: {:?}", i + 1, query);
        let assessment = assessor.assess_at(query, &snapshot, evaluation_date);
        if let Some(hit) = assessment.as_ref().ok().and_then(Assessment::sanctions) {
            println!("   Sanctions: {}", hit);
        }
        match assessment {
            Ok(Assessment::Assessed(result)) => {
                println!(
                    "   Matched: {} ({}, confidence {:.2})",
                    result.entity.canonical_name, result.match_kind, result.match_confidence
                );
                for line in result.breakdown.to_string().lines() {
                    println!("   {}", line);
                }
                println!("   Recommendation: {}", result.recommendation.playbook.title);
                println!("   Guidance: {}", result.recommendation.category_guidance);
                for note in &result.recommendation.flag_notes {
                    println!("   Note: {}", note);
                }
            }
            Ok(Assessment::Ambiguous(ambiguous)) => {
                println!("   Ambiguous, please pick one:");
                for candidate in &ambiguous.candidates {
                    println!(
                        "     - {} ({:.2})",
                        candidate.entity.canonical_name, candidate.confidence
                    );
                }
            }
            Ok(Assessment::NoMatch(_)) => println!("   No exclusions found"),
            Err(e) => println!("   Error: {}", e),
        }
        println!();
    }
}
