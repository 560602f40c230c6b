//! Risk control pipeline
//!
//! An explicit ordered list of rule evaluators. Each rule either passes or
//! returns a terminal decision that short-circuits the rest of the
//! evaluation. Flag-setting rules (circuit breaker, trend lock) run ahead
//! of the action rules because the rebalance condition and the grid-buy
//! branches consume their flags; among the action rules the trailing stop
//! outranks the rebalance, and both outrank pair exits.

use itertools::Itertools;
use tracing::{debug, warn};

use super::grid::round_to_lot;
use super::EvalContext;
use crate::config::StrategyConfig;
use crate::ledger::GridLedger;
use crate::{GridOrder, MarketZone, Side, TradePlan};

/// Result of one rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleOutcome {
    /// The rule fired a terminal action; skip all remaining stages
    Terminal,
    /// Continue down the pipeline
    Pass,
}

/// One stage of the risk pipeline
pub(crate) trait RiskRule {
    fn name(&self) -> &'static str;

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome;
}

/// Consecutive-day BIAS trend detection.
///
/// Returns (uptrend, downtrend): every one of the last `lookback` daily
/// changes above +threshold, or every one below -threshold. Any undefined
/// bias in the window means no trend.
pub(crate) fn detect_trend(
    bias: &[Option<f64>],
    lookback: usize,
    threshold: f64,
) -> (bool, bool) {
    if lookback == 0 || bias.len() < lookback + 1 {
        return (false, false);
    }

    let recent = &bias[bias.len() - (lookback + 1)..];
    let changes: Option<Vec<f64>> = recent
        .iter()
        .tuple_windows()
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        })
        .collect();

    match changes {
        Some(changes) => (
            changes.iter().all(|c| *c > threshold),
            changes.iter().all(|c| *c < -threshold),
        ),
        None => (false, false),
    }
}

/// Advisory: pause buys while the unrealized loss exceeds the drawdown
/// limit. Never terminal; the flag is consumed downstream.
pub(crate) struct DrawdownBreaker<'a> {
    pub cfg: &'a StrategyConfig,
}

impl RiskRule for DrawdownBreaker<'_> {
    fn name(&self) -> &'static str {
        "drawdown_breaker"
    }

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome {
        if ctx.volume > 0 && ctx.avg_cost > 0.0 {
            let pnl_pct = (ctx.price - ctx.avg_cost) / ctx.avg_cost;
            if pnl_pct < self.cfg.max_drawdown_limit {
                warn!(code = %plan.code, pnl_pct, "drawdown circuit breaker tripped");
                plan.warnings.push(format!(
                    "drawdown circuit breaker: unrealized {:.2}% below limit; buys paused",
                    pnl_pct * 100.0
                ));
                plan.risk_triggered = true;
            }
        }
        RuleOutcome::Pass
    }
}

/// Advisory: a sustained one-way bias run suppresses orders against the
/// run (no buying into a melt-up, no selling into a slide)
pub(crate) struct TrendLock<'a> {
    pub cfg: &'a StrategyConfig,
}

impl RiskRule for TrendLock<'_> {
    fn name(&self) -> &'static str {
        "trend_lock"
    }

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome {
        let trend = &self.cfg.trend;
        let (uptrend, downtrend) = detect_trend(ctx.bias20, trend.lookback_days, trend.threshold);
        ctx.is_uptrend = uptrend;
        ctx.is_downtrend = downtrend;

        if uptrend {
            plan.warnings.push(format!(
                "{}-day rising bias streak (daily > +{}); buys paused",
                trend.lookback_days, trend.threshold
            ));
        }
        if downtrend {
            plan.warnings.push(format!(
                "{}-day falling bias streak (daily < -{}); sells paused",
                trend.lookback_days, trend.threshold
            ));
        }
        RuleOutcome::Pass
    }
}

/// Terminal: liquidate half the position when the retracement from the
/// recent high exceeds the ATR multiple
pub(crate) struct AtrTrailingStop<'a> {
    pub cfg: &'a StrategyConfig,
}

impl RiskRule for AtrTrailingStop<'_> {
    fn name(&self) -> &'static str {
        "atr_trailing_stop"
    }

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome {
        let retracement = ctx.recent_high - ctx.price;
        let limit = self.cfg.trailing_atr_multiple * ctx.atr;

        if retracement <= limit || ctx.volume <= 0 {
            return RuleOutcome::Pass;
        }

        warn!(
            code = %plan.code,
            retracement = format!("{retracement:.3}"),
            limit = format!("{limit:.3}"),
            "ATR trailing stop fired"
        );
        plan.warnings.push(format!(
            "ATR trailing stop: retracement {:.3} > {:.1}x ATR ({:.3})",
            retracement, self.cfg.trailing_atr_multiple, limit
        ));
        plan.risk_triggered = true;

        let half = ctx.volume as f64 * self.cfg.trailing_liquidate_fraction;
        let sell_vol = round_to_lot(half.max(ctx.lot_size as f64), ctx.lot_size);
        let amount = round_to_lot(sell_vol.min(ctx.available) as f64, ctx.lot_size);

        if amount > 0 && ctx.available > 0 {
            plan.orders.push(GridOrder::market(
                Side::Sell,
                ctx.price,
                amount,
                "ATR trailing stop",
            ));
            return RuleOutcome::Terminal;
        }

        RuleOutcome::Pass
    }
}

/// Terminal: when the position sits far below target in an accumulation
/// zone, issue one damped market buy that closes half the deviation
pub(crate) struct Rebalance<'a> {
    pub cfg: &'a StrategyConfig,
    pub capital: f64,
}

impl RiskRule for Rebalance<'_> {
    fn name(&self) -> &'static str {
        "rebalance"
    }

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome {
        let current_pos_pct = if self.capital > 0.0 {
            ctx.price * ctx.volume as f64 / self.capital
        } else {
            0.0
        };
        let deviation = plan.target_pos_pct - current_pos_pct;

        let accumulation_zone =
            matches!(ctx.zone, MarketZone::DeepDip | MarketZone::GoldZone);

        if deviation <= self.cfg.rebalance_threshold || plan.risk_triggered || !accumulation_zone {
            return RuleOutcome::Pass;
        }

        let buy_value = self.capital * deviation * self.cfg.rebalance_damping;
        let buy_amount = round_to_lot(buy_value / ctx.price, ctx.lot_size);

        if buy_amount > 0 {
            debug!(code = %plan.code, deviation, buy_amount, "rebalance buy");
            plan.orders.push(GridOrder::market(
                Side::Buy,
                ctx.price,
                buy_amount,
                format!(
                    "rebalance buy: deviation {:.1}% > {:.0}%",
                    deviation * 100.0,
                    self.cfg.rebalance_threshold * 100.0
                ),
            ));
            plan.warnings
                .push("rebalance: position far below target; market buy takes priority".to_string());
            return RuleOutcome::Terminal;
        }

        RuleOutcome::Pass
    }
}

/// Non-terminal: propose the matched sell for every open pair whose target
/// is within reach, booking each pair's shares against the local available
/// counter so two pairs never claim the same shares
pub(crate) struct PairExit<'a> {
    pub cfg: &'a StrategyConfig,
    pub ledger: &'a GridLedger,
}

impl RiskRule for PairExit<'_> {
    fn name(&self) -> &'static str {
        "pair_exit"
    }

    fn evaluate(&self, plan: &mut TradePlan, ctx: &mut EvalContext<'_>) -> RuleOutcome {
        for pair in self.ledger.active_pairs(plan.code.as_str()) {
            if ctx.price < pair.target_sell_price * self.cfg.pair_exit_tolerance {
                continue;
            }
            if ctx.available < pair.buy_amount {
                continue;
            }

            // quote the better of current price and target
            plan.orders.push(GridOrder::limit(
                Side::Sell,
                ctx.price.max(pair.target_sell_price),
                pair.buy_amount,
                format!("pair exit (id {})", pair.id),
            ));
            ctx.available -= pair.buy_amount;
            plan.warnings.push(format!(
                "pair exit triggered: id {} target {:.3}",
                pair.id, pair.target_sell_price
            ));
        }
        RuleOutcome::Pass
    }
}
