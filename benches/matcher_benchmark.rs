//! Benchmarks for name matching and full assessments.
//!
//! Run with: cargo bench

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use esg_exclusion_risk::{
    normalizer, Category, DatasetSnapshot, ExclusionRecord, Matcher, RiskAssessor,
};

/// Snapshot with `companies` entities and three records each
fn build_snapshot(companies: usize) -> DatasetSnapshot {
    let countries = ["Norway", "Sweden", "Denmark", "Netherlands", "France"];
    let records = (0..companies)
        .flat_map(|i| {
            (0..3).map(move |j| {
                ExclusionRecord::new(
                    format!("Company {} Holdings Ltd", i),
                    format!("Investor {}", j),
                    countries[(i + j) % countries.len()],
                    Category::Climate,
                )
            })
        })
        .collect();
    DatasetSnapshot::build(records)
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize", |b| {
        b.iter(|| normalizer::normalize(black_box("Royal Dutch Shell P.L.C. Holdings")))
    });
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match");
    let matcher = Matcher::new();

    for companies in [100, 1_000, 10_000] {
        let snapshot = build_snapshot(companies);
        group.bench_with_input(BenchmarkId::new("exact", companies), &companies, |b, _| {
            b.iter(|| matcher.resolve(black_box("company 42"), snapshot.entities()))
        });
        group.bench_with_input(BenchmarkId::new("fuzzy", companies), &companies, |b, _| {
            b.iter(|| matcher.resolve(black_box("compnay 4x2"), snapshot.entities()))
        });
    }
    group.finish();
}

fn bench_assess(c: &mut Criterion) {
    let snapshot = build_snapshot(1_000);
    let assessor = RiskAssessor::default();
    let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

    c.bench_function("assess_1000_companies", |b| {
        b.iter(|| assessor.assess_at(black_box("company 42"), &snapshot, date))
    });
}

criterion_group!(benches, bench_normalize, bench_match, bench_assess);
criterion_main!(benches);
