//! Criterion benchmarks for ExitLab hot paths.
//!
//! Benchmarks:
//! 1. Full simulation over histories of increasing length
//! 2. Trailing stop updates (single position state machine)
//! 3. Tracker store updates across many positions

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use exitlab_core::domain::{ExitStrategy, Position, PositionId, PricePoint, TrailingStopConfig};
use exitlab_core::engine::simulate;
use exitlab_core::position_management::{TrailingStop, TrailingStopTracker};

// ── Helpers ──────────────────────────────────────────────────────────

fn t(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i as i64)
}

/// Oscillating run-up that peaks around 3x and drifts back.
fn make_history(n: usize) -> Vec<PricePoint> {
    (0..n)
        .map(|i| {
            let x = i as f64 / n as f64;
            let wave = (i as f64 * 0.2).sin() * 0.05;
            let price = 1.0 + 2.0 * (x * std::f64::consts::PI).sin() + wave;
            let price = Decimal::try_from(price.max(0.01)).unwrap_or(Decimal::ONE).round_dp(6);
            PricePoint::new(t(i + 1), price)
        })
        .collect()
}

fn make_strategy() -> ExitStrategy {
    ExitStrategy::new("bench", "Bench")
        .with_take_profit(dec!(2.0), dec!(30))
        .with_take_profit(dec!(5.0), dec!(30))
        .with_stop_loss(dec!(40))
        .with_trailing_stop(dec!(2.5), dec!(40))
        .with_moonbag(dec!(10), Some(dec!(0)))
}

// ── 1. Simulation ────────────────────────────────────────────────────

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    let strategy = make_strategy();

    for n in [100usize, 1_000, 10_000] {
        let history = make_history(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &history, |b, h| {
            b.iter(|| simulate(black_box(&strategy), dec!(1), t(0), black_box(h)))
        });
    }
    group.finish();
}

// ── 2. Trailing stop ─────────────────────────────────────────────────

fn bench_trailing_stop(c: &mut Criterion) {
    let history = make_history(1_000);
    let position = Position::new(PositionId::from("bench"), dec!(1), t(0), dec!(100));
    let config = TrailingStopConfig::enabled(dec!(1.5), dec!(50));

    c.bench_function("trailing_stop_1000_updates", |b| {
        b.iter(|| {
            let mut stop = TrailingStop::new(&position, &config);
            for p in &history {
                black_box(stop.update(p.price, p.timestamp));
            }
        })
    });
}

// ── 3. Tracker store ─────────────────────────────────────────────────

fn bench_tracker(c: &mut Criterion) {
    let history = make_history(100);
    let config = TrailingStopConfig::enabled(dec!(1.5), dec!(50));
    let positions: Vec<Position> = (0..500)
        .map(|i| Position::new(PositionId::new(format!("p{i}")), dec!(1), t(0), dec!(100)))
        .collect();

    c.bench_function("tracker_500_positions_100_ticks", |b| {
        b.iter(|| {
            let tracker = TrailingStopTracker::new();
            for p in &positions {
                tracker.initialize(p, &config);
            }
            for tick in &history {
                for p in &positions {
                    black_box(tracker.update(&p.id, tick.price, tick.timestamp));
                }
            }
        })
    });
}

criterion_group!(benches, bench_simulate, bench_trailing_stop, bench_tracker);
criterion_main!(benches);
