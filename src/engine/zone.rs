//! BIAS zone classification
//!
//! Maps the BIAS(20) reading onto one of five market regimes through
//! half-open intervals ordered by the configured boundaries, with one
//! override: a sharp pullback through the trend-reversal line drops
//! straight back to OSCILLATION so accumulation resumes without waiting
//! for the next full interval crossing.

use crate::config::BiasThresholds;
use crate::MarketZone;

/// Raw interval classification against the four ascending boundaries
pub fn classify(bias: f64, thresholds: &BiasThresholds) -> MarketZone {
    if bias < thresholds.deep_dip {
        MarketZone::DeepDip
    } else if bias < thresholds.gold_zone_upper {
        MarketZone::GoldZone
    } else if bias < thresholds.oscillation_upper {
        MarketZone::Oscillation
    } else if bias < thresholds.reduce_zone_upper {
        MarketZone::ReduceZone
    } else {
        MarketZone::EscapeZone
    }
}

/// Classification with the trend-reversal override applied.
///
/// Returns the effective zone and whether the override fired. The
/// override requires the previous bias to be known: it fires when bias
/// crossed down from above `trend_reversal` to at or below it and the raw
/// zone is anything but DEEP_DIP.
pub fn classify_with_reversal(
    bias: f64,
    prev_bias: Option<f64>,
    thresholds: &BiasThresholds,
) -> (MarketZone, bool) {
    let zone = classify(bias, thresholds);

    let crossed_down = prev_bias
        .map(|prev| prev > thresholds.trend_reversal && bias <= thresholds.trend_reversal)
        .unwrap_or(false);

    if crossed_down && zone != MarketZone::DeepDip {
        (MarketZone::Oscillation, true)
    } else {
        (zone, false)
    }
}
