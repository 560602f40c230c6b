//! Integration tests for the grid decision engine
//!
//! These tests drive the full evaluation pipeline over crafted candle
//! series and verify the decision rules end to end.

use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::{Duration, Utc};

use grid_trader::config::{Config, MonitorConfig, StrategyConfig, TradingConfig};
use grid_trader::engine::{grid, StrategyEngine};
use grid_trader::indicators::IndicatorSeries;
use grid_trader::{
    Candle, GridLedger, Holding, MarketZone, OrderType, PlanStatus, Side, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

/// Build candles from a close series; open = close, high/low = close +/- spread
fn candles_from_closes(closes: &[f64], spread: f64) -> Vec<Candle> {
    let start = Utc::now() - Duration::days(closes.len() as i64);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            Candle::new_unchecked(
                start + Duration::days(i as i64),
                close,
                close + spread,
                close - spread,
                close,
                10_000.0,
            )
        })
        .collect()
}

/// Flat series at one price
fn flat_candles(count: usize, close: f64, spread: f64) -> Vec<Candle> {
    candles_from_closes(&vec![close; count], spread)
}

fn test_config() -> Config {
    Config {
        trading: TradingConfig {
            instruments: Vec::new(),
            capital_per_instrument: 40_000.0,
            lot_size: 100,
            data_dir: "data".to_string(),
            state_db: "grid_state.db".to_string(),
        },
        strategy: StrategyConfig::default(),
        monitor: MonitorConfig::default(),
    }
}

fn engine_with_ledger() -> (StrategyEngine, Arc<GridLedger>) {
    let ledger = Arc::new(GridLedger::open_in_memory().unwrap());
    (StrategyEngine::new(test_config(), ledger.clone()), ledger)
}

fn engine() -> StrategyEngine {
    engine_with_ledger().0
}

/// 25-candle series ending in the gold zone: ma5 = 10.1, ma20 = 10.5,
/// bias = -4.76%, last close 10.0
fn gold_zone_candles() -> Vec<Candle> {
    let c1 = 159.5 / 15.0; // 10.6333...
    let c2 = 10.125;
    let mut closes = vec![c1; 20];
    closes.extend_from_slice(&[c2, c2, c2, c2, 10.0]);
    candles_from_closes(&closes, 0.15)
}

fn code() -> Symbol {
    Symbol::new("sh510050")
}

// =============================================================================
// Insufficiency sentinels (scenario 4)
// =============================================================================

#[test]
fn test_no_candles_yields_insufficient_data() {
    let plan = engine().evaluate(&code(), &[], &Holding::default());
    assert_eq!(plan.status, PlanStatus::InsufficientData);
    assert!(plan.orders.is_empty());
    assert!(!plan.risk_triggered);
}

#[test]
fn test_too_few_candles_yields_insufficient_data() {
    let candles = flat_candles(3, 10.0, 0.1);
    let plan = engine().evaluate(&code(), &candles, &Holding::default());
    assert_eq!(plan.status, PlanStatus::InsufficientData);
    assert!(plan.orders.is_empty());
}

#[test]
fn test_warm_up_window_yields_insufficient_indicators() {
    // enough candles to evaluate but ma20/bias still undefined
    let candles = flat_candles(10, 10.0, 0.1);
    let plan = engine().evaluate(&code(), &candles, &Holding::default());
    assert_eq!(plan.status, PlanStatus::InsufficientIndicators);
    assert!(plan.orders.is_empty());
    assert_relative_eq!(plan.current_price, 10.0);
}

// =============================================================================
// Zone classification + standard grid (scenarios 1 and 2)
// =============================================================================

#[test]
fn test_gold_zone_classification_and_grid() {
    let candles = gold_zone_candles();
    // position already at target so the rebalance rule stays quiet
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let (eng, _) = engine_with_ledger();
    let plan = eng.evaluate(&code(), &candles, &holding);

    assert_eq!(plan.status, PlanStatus::Zone(MarketZone::GoldZone));
    assert_relative_eq!(plan.current_bias, -100.0 / 21.0, epsilon = 1e-9); // -4.7619%
    assert_relative_eq!(plan.target_pos_pct, 0.75);
    assert!(!plan.risk_triggered);

    // expected geometry from the computed indicators
    let ind = IndicatorSeries::compute(&candles);
    let last = candles.len() - 1;
    let anchor = ind.ma5[last].unwrap();
    assert_relative_eq!(anchor, 10.1, epsilon = 1e-9);
    let atr = ind.atr14[last].unwrap();
    let step = grid::dynamic_step(atr, anchor, MarketZone::GoldZone, &eng.config().strategy);

    let buys: Vec<_> = plan.orders.iter().filter(|o| o.side == Side::Buy).collect();
    let sells: Vec<_> = plan.orders.iter().filter(|o| o.side == Side::Sell).collect();
    assert_eq!(buys.len(), 1);
    assert_eq!(sells.len(), 1);

    assert_relative_eq!(buys[0].price, anchor - step, epsilon = 1e-9);
    assert_relative_eq!(sells[0].price, anchor + step, epsilon = 1e-9);
    assert_eq!(buys[0].order_type, OrderType::Limit);

    // base lot: 5% of 40k at the anchor, floored to the 100-share lot
    assert_eq!(buys[0].amount, 100);
    assert_eq!(sells[0].amount, 100);

    // support/resistance over the trailing window
    let (support, resistance) = grid::support_resistance(&candles, 20);
    assert_relative_eq!(plan.support, support);
    assert_relative_eq!(plan.resistance, resistance);
}

#[test]
fn test_scenario_step_floor_numbers() {
    // atr 2% of anchor, unit coefficient: raw step survives the floor
    let cfg = StrategyConfig::default();
    let step = grid::dynamic_step(0.2, 10.1, MarketZone::GoldZone, &cfg);
    assert_relative_eq!(step, 0.2);
    // and the proposed rungs land at anchor +/- step
    assert_relative_eq!(10.1 - step, 9.9, epsilon = 1e-12);
    assert_relative_eq!(10.1 + step, 10.3, epsilon = 1e-12);
}

// =============================================================================
// Risk pipeline (scenario 3 and friends)
// =============================================================================

#[test]
fn test_atr_trailing_stop_fires_alone() {
    // flat at 10.5 with ATR 0.4; a 12.0 spike sits inside the 20-bar high
    // window but outside the 14-bar ATR window
    let mut candles = flat_candles(30, 10.5, 0.2);
    candles[12].high = 12.0;

    let holding = Holding {
        volume: 1000,
        available: 1000,
        avg_cost: 10.0,
    };

    let plan = engine().evaluate(&code(), &candles, &holding);

    assert!(plan.risk_triggered);
    assert_eq!(plan.orders.len(), 1);

    let order = &plan.orders[0];
    assert_eq!(order.side, Side::Sell);
    assert_eq!(order.order_type, OrderType::Market);
    assert_eq!(order.amount, 500); // half the holding, lot-rounded
    assert_relative_eq!(order.price, 10.5);
    assert!(plan
        .warnings
        .iter()
        .any(|w| w.contains("ATR trailing stop")));
}

#[test]
fn test_trailing_stop_without_position_passes() {
    let mut candles = flat_candles(30, 10.5, 0.2);
    candles[12].high = 12.0;

    let plan = engine().evaluate(&code(), &candles, &Holding::default());

    // no holding: retracement alone must not mark risk or emit the stop
    assert!(plan
        .orders
        .iter()
        .all(|o| o.order_type != OrderType::Market));
}

#[test]
fn test_rebalance_buys_half_the_deviation() {
    let candles = gold_zone_candles();
    // empty position in the gold zone: deviation 0.75 > 0.15
    let plan = engine().evaluate(&code(), &candles, &Holding::default());

    assert_eq!(plan.orders.len(), 1);
    let order = &plan.orders[0];
    assert_eq!(order.side, Side::Buy);
    assert_eq!(order.order_type, OrderType::Market);
    // half of 0.75 deviation on 40k at price 10 = 1500 shares
    assert_eq!(order.amount, 1500);
    assert!(!plan.risk_triggered);
    assert!(plan.warnings.iter().any(|w| w.contains("rebalance")));
}

#[test]
fn test_drawdown_breaker_suppresses_buys_not_sells() {
    let candles = flat_candles(30, 10.0, 0.15);
    let holding = Holding {
        volume: 2000,
        available: 2000,
        avg_cost: 13.0, // -23% unrealized
    };

    let plan = engine().evaluate(&code(), &candles, &holding);

    assert!(plan.risk_triggered);
    assert_eq!(plan.status, PlanStatus::Zone(MarketZone::Oscillation));
    assert!(plan.orders.iter().all(|o| o.side == Side::Sell));
    assert_eq!(plan.orders.len(), 1);
    assert!(plan
        .warnings
        .iter()
        .any(|w| w.contains("drawdown circuit breaker")));
}

#[test]
fn test_deep_dip_buys_ignore_risk_flag() {
    // 24 candles at 11.0 then a drop to 10.0: bias -8.68% -> DEEP_DIP
    let mut closes = vec![11.0; 24];
    closes.push(10.0);
    let candles = candles_from_closes(&closes, 0.2);

    // position near target (no rebalance) and deep under water (breaker on)
    let holding = Holding {
        volume: 3600,
        available: 3600,
        avg_cost: 13.0,
    };

    let plan = engine().evaluate(&code(), &candles, &holding);

    assert_eq!(plan.status, PlanStatus::Zone(MarketZone::DeepDip));
    assert!(plan.risk_triggered); // breaker tripped...

    // ...but the deep-dip ladder still goes out, two rungs down
    let buys: Vec<_> = plan.orders.iter().filter(|o| o.side == Side::Buy).collect();
    assert_eq!(buys.len(), 2);
    assert!(buys[1].price < buys[0].price);
    for buy in &buys {
        assert_eq!(buy.order_type, OrderType::Limit);
        assert_eq!(buy.amount % 100, 0); // 1.5x lot, still a lot multiple
        assert!(buy.amount > 0);
    }
}

#[test]
fn test_escape_high_zeroes_target_and_sells() {
    // flat at 10.0 then a melt-up close at 12.0: bias +18.8% > escape top
    let mut closes = vec![10.0; 24];
    closes.push(12.0);
    let mut candles = candles_from_closes(&closes, 0.15);
    // keep the last candle's own range tight
    candles[24].high = 12.15;
    candles[24].low = 11.85;
    candles[24].open = 11.9;

    let holding = Holding {
        volume: 2000,
        available: 2000,
        avg_cost: 10.0,
    };

    let plan = engine().evaluate(&code(), &candles, &holding);

    assert_eq!(plan.status, PlanStatus::EscapeHigh);
    assert_relative_eq!(plan.target_pos_pct, 0.0);
    let sells: Vec<_> = plan.orders.iter().filter(|o| o.side == Side::Sell).collect();
    assert_eq!(sells.len(), 1);
    assert!(plan.orders.iter().all(|o| o.side != Side::Buy));
}

// =============================================================================
// Grid-pair exits
// =============================================================================

#[test]
fn test_pair_exit_proposes_matched_sell() {
    let (eng, ledger) = engine_with_ledger();
    ledger.add_grid_pair("sh510050", 9.8, 200, 9.9);

    let candles = gold_zone_candles(); // price 10.0 >= 9.9 * 0.995
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let plan = eng.evaluate(&code(), &candles, &holding);

    let exit: Vec<_> = plan
        .orders
        .iter()
        .filter(|o| o.desc.starts_with("pair exit"))
        .collect();
    assert_eq!(exit.len(), 1);
    assert_eq!(exit[0].side, Side::Sell);
    assert_eq!(exit[0].amount, 200);
    // quotes the better of current price and target
    assert_relative_eq!(exit[0].price, 10.0);
    assert!(plan.warnings.iter().any(|w| w.contains("pair exit")));

    // pair exits coexist with the standard grid orders
    assert!(plan.orders.iter().any(|o| o.desc == "grid buy"));
}

#[test]
fn test_pair_exit_never_double_books_shares() {
    let (eng, ledger) = engine_with_ledger();
    ledger.add_grid_pair("sh510050", 9.8, 200, 9.9);
    ledger.add_grid_pair("sh510050", 9.7, 5000, 9.85); // larger than what's left

    let candles = gold_zone_candles();
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let plan = eng.evaluate(&code(), &candles, &holding);

    let exits: Vec<_> = plan
        .orders
        .iter()
        .filter(|o| o.desc.starts_with("pair exit"))
        .collect();
    // the oversized second pair cannot be served from remaining shares
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].amount, 200);
}

#[test]
fn test_pairs_survive_until_execution_confirms() {
    let (eng, ledger) = engine_with_ledger();
    ledger.add_grid_pair("sh510050", 9.8, 200, 9.9);

    let candles = gold_zone_candles();
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let _ = eng.evaluate(&code(), &candles, &holding);

    // proposing the exit does not close the pair; execution confirmation does
    assert_eq!(ledger.active_pairs("sh510050").len(), 1);
    ledger.close_pair(1);
    assert!(ledger.active_pairs("sh510050").is_empty());
}

// =============================================================================
// Trigger signaling
// =============================================================================

#[test]
fn test_trigger_signals_fire_once_per_day() {
    let (eng, _) = engine_with_ledger();
    let candles = gold_zone_candles();
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let plan = eng.evaluate(&code(), &candles, &holding);
    let buy_price = plan
        .orders
        .iter()
        .find(|o| o.side == Side::Buy)
        .map(|o| o.price)
        .unwrap();

    let today = Utc::now().date_naive();

    let signals = eng.check_triggers(&plan, buy_price, today);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].order.side, Side::Buy);

    // same level the same day stays quiet
    let signals = eng.check_triggers(&plan, buy_price, today);
    assert!(signals.is_empty());

    // next day the level may signal again
    let tomorrow = today.succ_opt().unwrap();
    let signals = eng.check_triggers(&plan, buy_price, tomorrow);
    assert_eq!(signals.len(), 1);
}

#[test]
fn test_trigger_ignores_prices_outside_alert_band() {
    let (eng, _) = engine_with_ledger();
    let candles = gold_zone_candles();
    let holding = Holding {
        volume: 3000,
        available: 3000,
        avg_cost: 10.2,
    };

    let plan = eng.evaluate(&code(), &candles, &holding);
    let buy_price = plan
        .orders
        .iter()
        .find(|o| o.side == Side::Buy)
        .map(|o| o.price)
        .unwrap();

    // 2% away: outside the 0.5% alert band
    let today = Utc::now().date_naive();
    let signals = eng.check_triggers(&plan, buy_price * 1.02, today);
    assert!(signals.is_empty());
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn test_every_emitted_amount_is_a_lot_multiple() {
    let scenarios: Vec<(Vec<Candle>, Holding)> = vec![
        (
            gold_zone_candles(),
            Holding {
                volume: 3000,
                available: 3000,
                avg_cost: 10.2,
            },
        ),
        (gold_zone_candles(), Holding::default()),
        (
            {
                let mut closes = vec![11.0; 24];
                closes.push(10.0);
                candles_from_closes(&closes, 0.2)
            },
            Holding {
                volume: 3600,
                available: 3600,
                avg_cost: 10.2,
            },
        ),
        (
            {
                let mut candles = flat_candles(30, 10.5, 0.2);
                candles[12].high = 12.0;
                candles
            },
            Holding {
                volume: 1000,
                available: 950, // deliberately not a lot multiple
                avg_cost: 10.0,
            },
        ),
    ];

    for (candles, holding) in scenarios {
        let plan = engine().evaluate(&code(), &candles, &holding);
        for order in &plan.orders {
            assert!(order.amount > 0, "empty order in {}", plan.status);
            assert_eq!(
                order.amount % 100,
                0,
                "amount {} not lot-aligned in {} ({})",
                order.amount,
                plan.status,
                order.desc
            );
        }
    }
}

#[test]
fn test_terminal_risk_plans_carry_at_most_one_order() {
    // trailing stop
    let mut candles = flat_candles(30, 10.5, 0.2);
    candles[12].high = 12.0;
    let plan = engine().evaluate(
        &code(),
        &candles,
        &Holding {
            volume: 1000,
            available: 1000,
            avg_cost: 10.0,
        },
    );
    assert!(plan.risk_triggered);
    assert!(plan.orders.len() <= 1);

    // rebalance
    let plan = engine().evaluate(&code(), &gold_zone_candles(), &Holding::default());
    assert_eq!(plan.orders.len(), 1);
}
