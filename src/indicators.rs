//! Technical indicators
//!
//! Trailing-window (causal) indicators used by the decision engine. A value
//! of `None` marks an indicator still inside its warm-up window; downstream
//! gating consumes the marker instead of a NaN. Nothing here panics or
//! returns an error.

use crate::Candle;

/// MA window used for grid anchoring
pub const MA_FAST: usize = 5;
/// MA window driving the BIAS regime signal
pub const MA_SLOW: usize = 20;
/// ATR window
pub const ATR_PERIOD: usize = 14;
/// RSI window
pub const RSI_PERIOD: usize = 14;
/// KDJ RSV window
pub const KDJ_PERIOD: usize = 9;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if period == 0 || i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate BIAS: percentage deviation of price from its moving average
///
/// `bias = (close - ma) / ma * 100`, undefined while the MA is undefined.
pub fn bias(close: &[f64], ma: &[Option<f64>]) -> Vec<Option<f64>> {
    close
        .iter()
        .zip(ma.iter())
        .map(|(&c, &m)| match m {
            Some(m) if m != 0.0 => Some((c - m) / m * 100.0),
            _ => None,
        })
        .collect()
}

/// Calculate True Range
///
/// `TR = max(high-low, |high-prevClose|, |low-prevClose|)`; the first bar
/// has no previous close and falls back to its own range.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range as a simple average of TR
///
/// Deliberately a plain SMA rather than Wilder's smoothing; grid spacing
/// only needs a stable volatility scale.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    sma(&tr, period)
}

/// Calculate RSI from simple-average gains and losses
///
/// Deltas exist from the second bar, so the first defined value sits at
/// index `period`. A zero average loss maps to RSI 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if n == 0 || period == 0 {
        return result;
    }

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    for i in period..n {
        let avg_gain: f64 = gains[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let avg_loss: f64 = losses[i + 1 - period..=i].iter().sum::<f64>() / period as f64;

        if avg_loss == 0.0 {
            result[i] = Some(100.0);
        } else {
            let rs = avg_gain / avg_loss;
            result[i] = Some(100.0 - 100.0 / (1.0 + rs));
        }
    }

    result
}

/// Calculate KDJ (stochastic oscillator with J line)
///
/// `RSV = (close - min(low, n)) / (max(high, n) - min(low, n)) * 100`,
/// undefined while inside the window or when the n-period range is zero.
/// K and D apply the recurrence `x = (2*prev + new) / 3`, seeding at the
/// first defined RSV; an undefined RSV leaves a hole in the output while
/// the smoothing state is retained. `J = 3K - 2D`.
#[allow(clippy::type_complexity)]
pub fn kdj(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    let mut k_out = vec![None; n];
    let mut d_out = vec![None; n];
    let mut j_out = vec![None; n];
    if n == 0 || period == 0 {
        return (k_out, d_out, j_out);
    }

    let mut prev_k: Option<f64> = None;
    let mut prev_d: Option<f64> = None;

    for i in 0..n {
        if i + 1 < period {
            continue;
        }

        let window_low = low[i + 1 - period..=i]
            .iter()
            .cloned()
            .fold(f64::MAX, f64::min);
        let window_high = high[i + 1 - period..=i]
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);

        let range = window_high - window_low;
        if range == 0.0 {
            continue;
        }

        let rsv = (close[i] - window_low) / range * 100.0;

        let k = match prev_k {
            Some(pk) => (2.0 * pk + rsv) / 3.0,
            None => rsv,
        };
        let d = match prev_d {
            Some(pd) => (2.0 * pd + k) / 3.0,
            None => k,
        };

        prev_k = Some(k);
        prev_d = Some(d);
        k_out[i] = Some(k);
        d_out[i] = Some(d);
        j_out[i] = Some(3.0 * k - 2.0 * d);
    }

    (k_out, d_out, j_out)
}

/// Candle series enriched with every indicator the engine consumes.
/// Derived once per evaluation, never persisted.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub ma5: Vec<Option<f64>>,
    pub ma20: Vec<Option<f64>>,
    pub bias20: Vec<Option<f64>>,
    pub atr14: Vec<Option<f64>>,
    pub rsi14: Vec<Option<f64>>,
    pub kdj_k: Vec<Option<f64>>,
    pub kdj_d: Vec<Option<f64>>,
    pub kdj_j: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Compute all columns from an ascending-time candle sequence
    pub fn compute(candles: &[Candle]) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let ma5 = sma(&close, MA_FAST);
        let ma20 = sma(&close, MA_SLOW);
        let bias20 = bias(&close, &ma20);
        let atr14 = atr(&high, &low, &close, ATR_PERIOD);
        let rsi14 = rsi(&close, RSI_PERIOD);
        let (kdj_k, kdj_d, kdj_j) = kdj(&high, &low, &close, KDJ_PERIOD);

        IndicatorSeries {
            ma5,
            ma20,
            bias20,
            atr14,
            rsi14,
            kdj_k,
            kdj_d,
            kdj_j,
        }
    }

    pub fn len(&self) -> usize {
        self.bias20.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bias20.is_empty()
    }
}
