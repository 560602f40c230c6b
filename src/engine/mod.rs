//! Decision engine
//!
//! One evaluation per instrument per refresh cycle: classify the regime,
//! size the grid, walk the risk pipeline, and assemble a plan. The engine
//! never returns an error for bad market input; everything a caller needs
//! is expressed through the plan's status, orders and warnings.
//!
//! Evaluations for different instrument codes are independent and safe to
//! run in parallel. Calls for the same code must be serialized by the
//! caller: the pair-exit accounting assumes a single evaluation in flight.

pub mod grid;
pub mod risk;
pub mod zone;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::indicators::IndicatorSeries;
use crate::ledger::GridLedger;
use crate::{Candle, GridOrder, Holding, MarketZone, PlanStatus, Symbol, TradePlan};

use risk::{AtrTrailingStop, DrawdownBreaker, PairExit, Rebalance, RiskRule, RuleOutcome, TrendLock};

/// Fewer candles than this yields an INSUFFICIENT_DATA plan outright
pub const MIN_CANDLES: usize = 5;

/// A proposed order whose price the live quote has reached, signaled at
/// most once per day per (code, price, direction)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredSignal {
    pub code: Symbol,
    pub order: GridOrder,
    pub live_price: f64,
}

/// Shared evaluation state threaded through the risk rules and grid
/// generation. `available` is a local counter so pair exits can book
/// shares without mutating the holding snapshot.
pub(crate) struct EvalContext<'a> {
    pub zone: MarketZone,
    pub price: f64,
    pub atr: f64,
    pub rsi: Option<f64>,
    pub bias20: &'a [Option<f64>],
    pub volume: i64,
    pub available: i64,
    pub avg_cost: f64,
    pub recent_high: f64,
    pub anchor: f64,
    pub step: f64,
    pub lot_amount: i64,
    pub lot_size: i64,
    pub is_uptrend: bool,
    pub is_downtrend: bool,
}

/// Rule-based position-sizing and order-proposal engine
pub struct StrategyEngine {
    config: Config,
    ledger: Arc<GridLedger>,
}

impl StrategyEngine {
    pub fn new(config: Config, ledger: Arc<GridLedger>) -> Self {
        StrategyEngine { config, ledger }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &GridLedger {
        &self.ledger
    }

    /// Evaluate one instrument against its candle history and holding
    pub fn evaluate(&self, code: &Symbol, candles: &[Candle], holding: &Holding) -> TradePlan {
        let cfg = &self.config.strategy;

        if candles.len() < MIN_CANDLES {
            return TradePlan::insufficient_data(code.clone());
        }

        let ind = IndicatorSeries::compute(candles);
        let last = candles.len() - 1;
        let price = candles[last].close;

        let (bias, atr) = match (ind.bias20[last], ind.atr14[last]) {
            (Some(b), Some(a)) => (b, a),
            _ => return TradePlan::insufficient_indicators(code.clone(), price),
        };
        let prev_bias = ind.bias20[last - 1];
        let rsi = ind.rsi14[last];
        let kdj_j = ind.kdj_j[last];

        let (zone, switched) = zone::classify_with_reversal(bias, prev_bias, &cfg.bias);
        let status = if switched {
            PlanStatus::ZoneSwitch
        } else {
            PlanStatus::Zone(zone)
        };

        let mut plan = TradePlan::new(
            code.clone(),
            price,
            bias,
            status,
            cfg.target_position.for_zone(zone),
        );

        let (support, resistance) = grid::support_resistance(candles, cfg.sr_lookback);
        plan.support = support;
        plan.resistance = resistance;

        // Escape-top escalation: above the boundary the target drops to
        // zero, whatever the interval classification said
        if bias > cfg.bias.escape_top_high {
            plan.status = PlanStatus::EscapeHigh;
            plan.target_pos_pct = 0.0;
            plan.warnings
                .push("bias above escape-top boundary; target position zeroed".to_string());
        }

        if let Some(r) = rsi {
            if r > cfg.rsi.sell_threshold {
                plan.warnings.push(format!(
                    "RSI overbought ({:.1} > {}); buys paused",
                    r, cfg.rsi.sell_threshold
                ));
            }
        }

        if let Some(j) = kdj_j {
            if j < cfg.kdj_oversold_j && zone == MarketZone::DeepDip {
                plan.warnings
                    .push(format!("KDJ oversold (J={j:.1}); bottoming signal"));
            }
        }

        let anchor = grid::anchor_price(zone, price, ind.ma5[last]);
        let capital = self.config.trading.capital_per_instrument;
        let lot_size = self.config.trading.lot_size;

        let recent_high = candles[candles.len().saturating_sub(cfg.trailing_lookback)..]
            .iter()
            .map(|c| c.high)
            .fold(f64::MIN, f64::max);

        let mut ctx = EvalContext {
            zone,
            price,
            atr,
            rsi,
            bias20: &ind.bias20,
            volume: holding.volume,
            available: holding.available,
            avg_cost: holding.avg_cost,
            recent_high,
            anchor,
            step: grid::dynamic_step(atr, anchor, zone, cfg),
            lot_amount: grid::base_lot_amount(capital, anchor, lot_size, cfg.lot_capital_fraction),
            lot_size,
            is_uptrend: false,
            is_downtrend: false,
        };

        // Ordered pipeline: flag producers first, then terminal actions by
        // priority (stop over rebalance), then pair exits
        let breaker = DrawdownBreaker { cfg };
        let trend_lock = TrendLock { cfg };
        let trailing_stop = AtrTrailingStop { cfg };
        let rebalance = Rebalance { cfg, capital };
        let pair_exit = PairExit {
            cfg,
            ledger: &self.ledger,
        };
        let rules: [&dyn RiskRule; 5] =
            [&breaker, &trend_lock, &trailing_stop, &rebalance, &pair_exit];

        for rule in rules {
            if rule.evaluate(&mut plan, &mut ctx) == RuleOutcome::Terminal {
                debug!(code = %plan.code, rule = rule.name(), "terminal risk action");
                return plan;
            }
        }

        grid::generate(&mut plan, &ctx, cfg);

        debug!(
            code = %plan.code,
            status = %plan.status,
            orders = plan.orders.len(),
            warnings = plan.warnings.len(),
            "evaluation complete"
        );

        plan
    }

    /// Check a plan's orders against a live quote and return the ones that
    /// just came within the alert band, marking each in the trigger ledger
    /// so a level signals at most once per day
    pub fn check_triggers(
        &self,
        plan: &TradePlan,
        live_price: f64,
        today: NaiveDate,
    ) -> Vec<TriggeredSignal> {
        let alert_pct = self.config.monitor.price_alert_pct;
        let mut signals = Vec::new();

        if live_price <= 0.0 {
            return signals;
        }

        for order in &plan.orders {
            if order.price <= 0.0 {
                continue;
            }
            let deviation = (live_price - order.price).abs() / order.price;
            if deviation > alert_pct {
                continue;
            }
            if self
                .ledger
                .is_triggered(today, plan.code.as_str(), order.price, order.side)
            {
                continue;
            }

            self.ledger
                .mark_triggered(today, plan.code.as_str(), order.price, order.side);
            signals.push(TriggeredSignal {
                code: plan.code.clone(),
                order: order.clone(),
                live_price,
            });
        }

        signals
    }
}
