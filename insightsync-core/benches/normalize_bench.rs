//! Criterion benchmarks for the per-run hot paths.
//!
//! Benchmarks:
//! 1. Record normalization (coercion of every column plus the audit JSON)
//! 2. Row validation against the table's column constraints
//! 3. DataFrame construction for the Parquet sink

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use insightsync_core::parquet_sink::validate_rows;
use insightsync_core::{normalize, InsightsSchema, RawRecord};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_records(n: usize) -> Vec<RawRecord> {
    let platforms = ["facebook", "instagram", "audience_network", "messenger"];
    (0..n)
        .map(|i| {
            let value = serde_json::json!({
                "date_start": "2024-06-01",
                "date_stop": "2024-06-01",
                "account_id": "1234567890",
                "campaign_id": format!("2384{i:08}"),
                "campaign_name": format!("Campaign {i}"),
                "objective": "OUTCOME_SALES",
                "publisher_platform": platforms[i % platforms.len()],
                "reach": (1000 + i).to_string(),
                "impressions": (2500 + i * 3).to_string(),
                "clicks": (i % 97).to_string(),
                "spend": format!("{}.{:02}", i % 500, i % 100),
                "ctr": "1.234567",
                "cpc": "0.45",
                "cpm": "7.891234"
            });
            match value {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            }
        })
        .collect()
}

// ── 1. Normalization ─────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap();
    let mut group = c.benchmark_group("normalize");
    for n in [100usize, 5_000] {
        let records = make_records(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, records| {
            b.iter(|| normalize(black_box(records), ts))
        });
    }
    group.finish();
}

// ── 2. Validation ────────────────────────────────────────────────────

fn bench_validate(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap();
    let rows = normalize(&make_records(5_000), ts);
    c.bench_function("validate_rows/5000", |b| b.iter(|| validate_rows(black_box(&rows))));
}

// ── 3. DataFrame build ───────────────────────────────────────────────

fn bench_to_dataframe(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap();
    let rows = normalize(&make_records(500), ts);
    c.bench_function("to_dataframe/500", |b| {
        b.iter(|| InsightsSchema::to_dataframe(black_box(&rows)).unwrap())
    });
}

criterion_group!(benches, bench_normalize, bench_validate, bench_to_dataframe);
criterion_main!(benches);
