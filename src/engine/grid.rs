//! Anchor selection, dynamic grid sizing and standard grid generation
//!
//! Grid spacing scales with ATR per zone, stretches or shrinks with the
//! volatility ratio, and is floored so every rung clears the minimum
//! profit target for its volatility bucket.

use tracing::debug;

use super::EvalContext;
use crate::config::StrategyConfig;
use crate::{Candle, GridOrder, MarketZone, Side, TradePlan};

/// Round a share amount down to the nearest lot multiple
pub fn round_to_lot(amount: f64, lot_size: i64) -> i64 {
    if lot_size <= 0 || amount <= 0.0 {
        return 0;
    }
    ((amount / lot_size as f64).floor() as i64) * lot_size
}

/// Reference price the grid offsets from.
///
/// A deep dip anchors on the current close so the grid tracks a falling
/// market without MA lag; everywhere else the 5-period MA smooths the
/// anchor, falling back to the close while the MA is warming up.
pub fn anchor_price(zone: MarketZone, close: f64, ma5: Option<f64>) -> f64 {
    match zone {
        MarketZone::DeepDip => close,
        _ => ma5.unwrap_or(close),
    }
}

/// Volatility-adaptive grid spacing.
///
/// `step = atr * coefficient(zone)`, scaled by the volatility multiplier
/// and clamped from below to `anchor * min_profit_pct` so a filled rung
/// always recovers at least the target edge.
pub fn dynamic_step(atr: f64, anchor: f64, zone: MarketZone, cfg: &StrategyConfig) -> f64 {
    let mut step = atr * cfg.grid_coefficient.for_zone(zone);

    let atr_pct = if anchor > 0.0 { atr / anchor } else { 0.0 };
    if atr_pct < cfg.dynamic_grid.low_volatility_atr {
        step *= cfg.dynamic_grid.low_vol_multiplier;
    } else if atr_pct > cfg.dynamic_grid.high_volatility_atr {
        step *= cfg.dynamic_grid.high_vol_multiplier;
    }

    let min_step = anchor * cfg.min_profit.for_volatility(atr_pct);
    step.max(min_step)
}

/// Support and resistance from the trailing lookback window, truncated to
/// the available history
pub fn support_resistance(candles: &[Candle], lookback: usize) -> (f64, f64) {
    if candles.is_empty() {
        return (0.0, 0.0);
    }

    let window = &candles[candles.len().saturating_sub(lookback)..];
    let support = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let resistance = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);

    (support, resistance)
}

/// Base lot for one grid rung: a fixed fraction of the instrument's
/// capital at the anchor price, floored to the lot size
pub fn base_lot_amount(capital: f64, anchor: f64, lot_size: i64, fraction: f64) -> i64 {
    if anchor <= 0.0 {
        return lot_size.max(0);
    }
    round_to_lot(capital * fraction / anchor, lot_size).max(lot_size)
}

/// Standard grid generation, reached only when no terminal risk rule fired
pub(crate) fn generate(plan: &mut TradePlan, ctx: &EvalContext, cfg: &StrategyConfig) {
    let anchor = ctx.anchor;
    let step = ctx.step;
    let lot_amount = ctx.lot_amount;
    let lot_size = ctx.lot_size;

    let rsi_overbought = ctx
        .rsi
        .map(|r| r > cfg.rsi.sell_threshold)
        .unwrap_or(false);

    debug!(
        code = %plan.code,
        zone = %ctx.zone,
        anchor = format!("{anchor:.3}"),
        step = format!("{step:.4}"),
        lot = lot_amount,
        "generating grid orders"
    );

    match ctx.zone {
        MarketZone::DeepDip => {
            // Accumulation zone. Does not consult risk_triggered or the
            // trend lock; only the RSI overbought gate applies.
            if !rsi_overbought {
                let heavy_lot = round_to_lot(lot_amount as f64 * 1.5, lot_size);
                if heavy_lot > 0 {
                    plan.orders.push(GridOrder::limit(
                        Side::Buy,
                        anchor - step,
                        heavy_lot,
                        "deep-dip grid buy 1",
                    ));
                    plan.orders.push(GridOrder::limit(
                        Side::Buy,
                        anchor - 2.0 * step,
                        heavy_lot,
                        "deep-dip grid buy 2",
                    ));
                }
            }
        }
        MarketZone::ReduceZone | MarketZone::EscapeZone => {
            if ctx.available > 0 && !ctx.is_downtrend {
                let heavy_lot = round_to_lot(lot_amount as f64 * 1.5, lot_size);
                let amount = round_to_lot(ctx.available.min(heavy_lot) as f64, lot_size);
                if amount > 0 {
                    plan.orders.push(GridOrder::limit(
                        Side::Sell,
                        anchor + step,
                        amount,
                        "reduce grid sell",
                    ));
                }
            }
        }
        MarketZone::Oscillation | MarketZone::GoldZone => {
            if !plan.risk_triggered && !ctx.is_uptrend && !rsi_overbought {
                plan.orders.push(GridOrder::limit(
                    Side::Buy,
                    anchor - step,
                    lot_amount,
                    "grid buy",
                ));
            }

            if ctx.available > 0 && !ctx.is_downtrend {
                let amount = round_to_lot(ctx.available.min(lot_amount) as f64, lot_size);
                if amount > 0 {
                    plan.orders.push(GridOrder::limit(
                        Side::Sell,
                        anchor + step,
                        amount,
                        "grid sell",
                    ));
                }
            }
        }
    }
}
