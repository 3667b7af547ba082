//! Scenario tests for the exit engine.
//!
//! Each test walks a concrete price path through the trailing stop, the live
//! evaluator, or the simulator and checks the decisions tick by tick.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use exitlab_core::domain::{
    ExitReason, ExitStrategy, Position, PositionId, PricePoint, TimeRules, TrailingStopConfig,
};
use exitlab_core::engine::simulate;
use exitlab_core::position_management::{TrailingState, TrailingStop, TrailingStopTracker};
use exitlab_core::rules::ExitRuleEvaluator;

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn history(prices: &[Decimal]) -> Vec<PricePoint> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| PricePoint::new(t(i as i64 + 1), *p))
        .collect()
}

#[test]
fn scenario_a_activation_ratchet_trigger() {
    // GIVEN entry 1.00, activation 2.0x, distance 30%
    let position = Position::new(PositionId::from("a"), dec!(1.00), t(0), dec!(1));
    let tracker = TrailingStopTracker::new();
    tracker.initialize(&position, &TrailingStopConfig::enabled(dec!(2.0), dec!(30)));

    // WHEN prices 1.50, 2.00, 2.50, 2.20, 1.70 arrive
    let u1 = tracker.update(&position.id, dec!(1.50), t(1));
    let u2 = tracker.update(&position.id, dec!(2.00), t(2));
    let u3 = tracker.update(&position.id, dec!(2.50), t(3));
    let u4 = tracker.update(&position.id, dec!(2.20), t(4));
    let u5 = tracker.update(&position.id, dec!(1.70), t(5));

    // THEN 1.50 leaves it inactive
    assert_eq!(u1.state, TrailingState::Inactive);
    assert!(!u1.newly_activated);

    // AND 2.00 activates with level 1.40
    assert!(u2.newly_activated);
    assert_eq!(u2.trailing_stop_level, Some(dec!(1.40)));

    // AND 2.50 ratchets to 1.75
    let mv = u3.ratchet.expect("2.50 is a new peak");
    assert_eq!(mv.new_level, dec!(1.75));

    // AND 2.20 does not ratchet
    assert!(u4.ratchet.is_none());
    assert_eq!(u4.trailing_stop_level, Some(dec!(1.75)));

    // AND 1.70 triggers
    assert!(u5.newly_triggered);
    assert_eq!(u5.state, TrailingState::Triggered);
}

#[test]
fn scenario_a_through_simulator() {
    let s = ExitStrategy::new("trail", "Trail 2x/30").with_trailing_stop(dec!(2.0), dec!(30));
    let r = simulate(
        &s,
        dec!(1.00),
        t(0),
        &history(&[dec!(1.50), dec!(2.00), dec!(2.50), dec!(2.20), dec!(1.70)]),
    )
    .unwrap();

    assert_eq!(r.exits.len(), 1);
    let exit = &r.exits[0];
    assert_eq!(exit.decision.reason, ExitReason::TrailingStop);
    assert_eq!(exit.decision.trigger_price, dec!(1.70));
    assert_eq!(exit.tick_index, 4);
    assert_eq!(r.simulated_pnl_pct, dec!(70));
    assert_eq!(r.peak_price, dec!(2.50));

    let trig = r.trailing_trigger.expect("trigger summary recorded");
    assert_eq!(trig.peak_multiplier, dec!(2.5));
}

#[test]
fn scenario_b_regular_stop_loss_precedence() {
    // GIVEN stop-loss level 0.70 and trailing still INACTIVE
    let s = ExitStrategy::new("b", "B")
        .with_stop_loss(dec!(30))
        .with_trailing_stop(dec!(2.0), dec!(30));
    let ev = ExitRuleEvaluator::new();
    let mut p = Position::new(PositionId::from("b"), dec!(1.00), t(0), dec!(10));
    ev.open_position(&p, &s).unwrap();

    // WHEN the price drops to 0.65
    let d = ev
        .evaluate(&mut p, &s, &PricePoint::new(t(1), dec!(0.65)), false)
        .unwrap();

    // THEN the regular stop-loss fires for everything
    assert_eq!(d.reason, ExitReason::StopLoss);
    assert_eq!(d.sell_percentage, dec!(100));
    assert!(p.is_closed());
}

#[test]
fn scenario_b_trailing_disabled() {
    let s = ExitStrategy::new("b", "B").with_stop_loss(dec!(30));
    let r = simulate(&s, dec!(1.00), t(0), &history(&[dec!(0.80), dec!(0.65)])).unwrap();
    assert_eq!(r.exits[0].decision.reason, ExitReason::StopLoss);
}

#[test]
fn scenario_c_take_profit_tiering() {
    // GIVEN levels (2.0x, 50%) and (3.0x, 25%)
    let s = ExitStrategy::new("c", "C")
        .with_take_profit(dec!(2.0), dec!(50))
        .with_take_profit(dec!(3.0), dec!(25));

    // WHEN the path reaches 2.0 then 3.0
    let r = simulate(
        &s,
        dec!(1.00),
        t(0),
        &history(&[dec!(1.4), dec!(2.0), dec!(2.6), dec!(3.0), dec!(2.9)]),
    )
    .unwrap();

    // THEN two decisions: 50% then 25%, leaving 25%
    let sells: Vec<Decimal> = r.exits.iter().map(|e| e.decision.sell_percentage).collect();
    assert_eq!(sells, vec![dec!(50), dec!(25)]);
    assert_eq!(r.exits[0].decision.level_index, Some(0));
    assert_eq!(r.exits[1].decision.level_index, Some(1));
    assert_eq!(r.total_sold_pct(), dec!(75));
    assert_eq!(r.remaining_percentage, dec!(25));
}

#[test]
fn trailing_trigger_beats_eligible_tier_on_same_tick() {
    // GIVEN two tiers and a trailing stop armed at entry
    let s = ExitStrategy::new("p", "Priority")
        .with_take_profit(dec!(1.2), dec!(30))
        .with_take_profit(dec!(1.3), dec!(30))
        .with_trailing_stop(dec!(1.0), dec!(5));
    let ev = ExitRuleEvaluator::new();
    let mut p = Position::new(PositionId::from("p"), dec!(1.00), t(0), dec!(10));
    ev.open_position(&p, &s).unwrap();

    // 1.00 arms at level 0.95
    assert!(ev
        .evaluate(&mut p, &s, &PricePoint::new(t(1), dec!(1.00)), false)
        .is_none());
    // 1.60 ratchets to 1.52; only the first tier fires on this tick
    let first = ev
        .evaluate(&mut p, &s, &PricePoint::new(t(2), dec!(1.60)), false)
        .unwrap();
    assert_eq!(first.level_index, Some(0));

    // WHEN 1.50 arrives: below the level AND above the unfired 1.3x target
    let d = ev
        .evaluate(&mut p, &s, &PricePoint::new(t(3), dec!(1.50)), false)
        .unwrap();

    // THEN the trailing stop wins and sells everything left
    assert_eq!(d.reason, ExitReason::TrailingStop);
    assert_eq!(d.sell_percentage, dec!(70));
    assert!(!p.levels_hit.contains(&1));
    assert!(p.is_closed());
}

#[test]
fn trailing_stop_standalone_matches_tracker() {
    let p = Position::new(PositionId::from("solo"), dec!(1.00), t(0), dec!(1));
    let cfg = TrailingStopConfig::enabled(dec!(2.0), dec!(30));
    let mut stop = TrailingStop::new(&p, &cfg);
    let tracker = TrailingStopTracker::new();
    tracker.initialize(&p, &cfg);

    for (i, price) in [dec!(1.5), dec!(2.0), dec!(2.5), dec!(2.2)].into_iter().enumerate() {
        let a = stop.update(price, t(i as i64 + 1));
        let b = tracker.update(&p.id, price, t(i as i64 + 1));
        assert_eq!(a, b);
    }
    assert_eq!(Some(stop.status()), tracker.status(&p.id).as_ref());
}

#[test]
fn trailing_sells_remainder_after_tiers() {
    let s = ExitStrategy::new("sim", "Sim")
        .with_take_profit(dec!(1.25), dec!(40))
        .with_take_profit(dec!(1.40), dec!(40))
        .with_trailing_stop(dec!(1.0), dec!(10));
    // 1.00 arms (0.90); 1.30 ratchets (1.17) and fires tier 0;
    // 1.50 ratchets (1.35) and fires tier 1; 1.34 triggers.
    let r = simulate(
        &s,
        dec!(1.00),
        t(0),
        &history(&[dec!(1.00), dec!(1.30), dec!(1.50), dec!(1.34)]),
    )
    .unwrap();
    let reasons: Vec<ExitReason> = r.exits.iter().map(|e| e.decision.reason).collect();
    assert_eq!(
        reasons,
        vec![
            ExitReason::TakeProfit,
            ExitReason::TakeProfit,
            ExitReason::TrailingStop
        ]
    );
    assert_eq!(r.exits[2].decision.sell_percentage, dec!(20));
    assert_eq!(r.remaining_percentage, Decimal::ZERO);
}

#[test]
fn moonbag_rides_after_tiers_then_stops() {
    let s = ExitStrategy::new("moon", "Moonbag")
        .with_take_profit(dec!(2.0), dec!(50))
        .with_take_profit(dec!(4.0), dec!(40))
        .with_moonbag(dec!(10), Some(dec!(0)));
    let r = simulate(
        &s,
        dec!(1.00),
        t(0),
        &history(&[dec!(2.0), dec!(4.0), dec!(6.0), dec!(1.5), dec!(0.99)]),
    )
    .unwrap();
    let reasons: Vec<ExitReason> = r.exits.iter().map(|e| e.decision.reason).collect();
    assert_eq!(
        reasons,
        vec![
            ExitReason::TakeProfit,
            ExitReason::TakeProfit,
            ExitReason::MoonbagStop
        ]
    );
    assert_eq!(r.exits[2].decision.sell_percentage, dec!(10));
    assert!(r.is_closed());
}

fn flat_for(hours: &[i64], prices: &[Decimal]) -> Vec<PricePoint> {
    hours
        .iter()
        .zip(prices)
        .map(|(h, p)| PricePoint::new(t(h * 60), *p))
        .collect()
}

fn stagnation_6h() -> ExitStrategy {
    ExitStrategy::new("stag", "Stagnation 5%/6h").with_time_rules(TimeRules {
        stagnation_enabled: true,
        stagnation_threshold_pct: dec!(5),
        stagnation_hours: dec!(6),
        ..TimeRules::default()
    })
}

#[test]
fn stagnation_counts_from_entry() {
    // GIVEN a position flat at entry with hourly ticks
    let h = flat_for(&[1, 2, 3, 4, 5, 6, 7, 8], &[dec!(1.00); 8]);

    // WHEN simulated with a 6h stagnation window
    let r = simulate(&stagnation_6h(), dec!(1.00), t(0), &h).unwrap();

    // THEN it exits exactly 6 hours after entry
    assert_eq!(r.exits.len(), 1);
    assert_eq!(r.exits[0].decision.reason, ExitReason::Stagnation);
    assert_eq!(r.exits[0].timestamp, t(6 * 60));
    assert_eq!(r.closed_at, Some(t(6 * 60)));
}

#[test]
fn stagnation_with_sparse_ticks_fires_on_first_late_tick() {
    // GIVEN the first tick arrives after the window already elapsed
    let h = flat_for(&[10, 11], &[dec!(1.01), dec!(1.00)]);

    let r = simulate(&stagnation_6h(), dec!(1.00), t(0), &h).unwrap();

    // THEN the first tick closes the position
    assert_eq!(r.exits.len(), 1);
    assert_eq!(r.exits[0].decision.reason, ExitReason::Stagnation);
    assert_eq!(r.exits[0].timestamp, t(10 * 60));
    assert!(r.is_closed());
}

#[test]
fn simulate_is_deterministic() {
    let s = ExitStrategy::new("det", "Det")
        .with_take_profit(dec!(1.5), dec!(30))
        .with_stop_loss(dec!(20))
        .with_trailing_stop(dec!(1.8), dec!(25));
    let h = history(&[
        dec!(1.1),
        dec!(1.6),
        dec!(1.9),
        dec!(2.4),
        dec!(2.0),
        dec!(1.7),
    ]);
    let a = simulate(&s, dec!(1.0), t(0), &h).unwrap();
    let b = simulate(&s, dec!(1.0), t(0), &h).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
