//! Criterion benchmarks for the optimizer.
//!
//! Benchmarks:
//! 1. End-to-end grid search at increasing worker counts
//! 2. Pareto frontier over synthetic result sets
//! 3. Sensitivity analysis over synthetic result sets

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use exitlab_core::domain::{ExitStrategy, PricePoint};
use exitlab_runner::optimizer::pareto::pareto_frontier;
use exitlab_runner::optimizer::sensitivity::analyze;
use exitlab_runner::{optimize, Dataset, OptimizationResult, OptimizerConfig, PositionRecord};

// ── Helpers ──────────────────────────────────────────────────────────

fn t(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i as i64)
}

/// `positions` run-ups of 500 ticks, each peaking at a different multiple.
fn make_dataset(positions: usize) -> Dataset {
    let mut records = Vec::with_capacity(positions);
    let mut histories = HashMap::with_capacity(positions);
    for p in 0..positions {
        let peak = 1.5 + p as f64 * 0.5;
        let history: Vec<PricePoint> = (0..500)
            .map(|i| {
                let x = i as f64 / 500.0;
                let price = 1.0 + (peak - 1.0) * (x * std::f64::consts::PI).sin();
                let price = Decimal::try_from(price.max(0.01)).unwrap_or(Decimal::ONE).round_dp(6);
                PricePoint::new(t(i + 1), price)
            })
            .collect();
        let record = PositionRecord::new(format!("p{p}"), Decimal::ONE, t(0));
        histories.insert(record.id.clone(), history);
        records.push(record);
    }
    Dataset::from_parts(records, histories)
}

fn make_config(workers: usize) -> OptimizerConfig {
    let base = ExitStrategy::new("bench", "Bench")
        .with_take_profit(dec!(2.0), dec!(30))
        .with_trailing_stop(dec!(1.5), dec!(20));
    let mut config = OptimizerConfig::new(base)
        .with_range("stop_loss_percentage", vec![dec!(10), dec!(20), dec!(30), dec!(40)])
        .with_range("trailing.distance_percentage", vec![dec!(10), dec!(20), dec!(30), dec!(40)])
        .with_range("take_profit.0.sell_percentage", vec![dec!(20), dec!(40), dec!(60)]);
    config.max_workers = workers;
    config
}

fn make_results(n: usize) -> Vec<OptimizationResult> {
    (0..n)
        .map(|i| OptimizationResult {
            combination_id: format!("{i:06}"),
            index: i,
            parameters: BTreeMap::from([
                ("stop_loss_percentage".to_string(), Decimal::from(i % 7)),
                ("trailing.distance_percentage".to_string(), Decimal::from(i % 11)),
            ]),
            objective: Some(((i * 37) % 101) as f64),
            secondary: vec![((i * 53) % 97) as f64, ((i * 13) % 89) as f64],
            ..OptimizationResult::default()
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_48_combinations");
    group.sample_size(10);
    let dataset = make_dataset(8);

    for workers in [1usize, 2, 4, 8] {
        let config = make_config(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| optimize(black_box(&config), black_box(&dataset), None, None));
        });
    }
    group.finish();
}

fn bench_pareto(c: &mut Criterion) {
    let mut group = c.benchmark_group("pareto_frontier");
    for size in [100usize, 1000] {
        let results = make_results(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| pareto_frontier(black_box(&results)));
        });
    }
    group.finish();
}

fn bench_sensitivity(c: &mut Criterion) {
    let results = make_results(1000);
    c.bench_function("sensitivity_1000", |b| {
        b.iter(|| analyze(black_box(&results)));
    });
}

criterion_group!(benches, bench_optimize, bench_pareto, bench_sensitivity);
criterion_main!(benches);
