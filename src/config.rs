//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. The whole tree
//! is an explicit, immutable value injected into the engine at
//! construction; nothing reads process-global state. Defaults carry the
//! tuned parameters for a CN ETF basket.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Holding, MarketZone, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trading: TradingConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

/// One instrument in the monitored basket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Holding snapshot; normally refreshed by the holdings collaborator,
    /// read from config when running standalone
    #[serde(default)]
    pub holding: Holding,
}

/// Basket, capital and storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub instruments: Vec<InstrumentConfig>,
    /// Fixed capital pool per instrument, same currency as price data
    pub capital_per_instrument: f64,
    /// Minimum tradable unit; every order amount is a multiple of this
    pub lot_size: i64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_state_db")]
    pub state_db: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_state_db() -> String {
    "grid_state.db".to_string()
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            instruments: vec![
                InstrumentConfig {
                    code: "sh510050".to_string(),
                    name: "SSE 50".to_string(),
                    holding: Holding::default(),
                },
                InstrumentConfig {
                    code: "sh588090".to_string(),
                    name: "STAR 50".to_string(),
                    holding: Holding::default(),
                },
                InstrumentConfig {
                    code: "sz159841".to_string(),
                    name: "Securities".to_string(),
                    holding: Holding::default(),
                },
                InstrumentConfig {
                    code: "sh512480".to_string(),
                    name: "Semiconductor".to_string(),
                    holding: Holding::default(),
                },
                InstrumentConfig {
                    code: "sh512760".to_string(),
                    name: "Chipmaker".to_string(),
                    holding: Holding::default(),
                },
            ],
            capital_per_instrument: 40_000.0,
            lot_size: 100,
            data_dir: default_data_dir(),
            state_db: default_state_db(),
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.instruments
            .iter()
            .map(|i| Symbol::new(&i.code))
            .collect()
    }

    pub fn holding_for(&self, code: &str) -> Holding {
        self.instruments
            .iter()
            .find(|i| i.code == code)
            .map(|i| i.holding)
            .unwrap_or_default()
    }
}

/// BIAS(20) zone boundaries, ordered ascending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasThresholds {
    pub deep_dip: f64,
    pub gold_zone_upper: f64,
    pub oscillation_upper: f64,
    pub reduce_zone_upper: f64,
    /// Crossing down through this value re-enables accumulation
    pub trend_reversal: f64,
    /// Above this the plan escalates to ESCAPE_HIGH with a zero target
    pub escape_top_high: f64,
}

impl Default for BiasThresholds {
    fn default() -> Self {
        BiasThresholds {
            deep_dip: -6.0,
            gold_zone_upper: -3.0,
            oscillation_upper: 5.0,
            reduce_zone_upper: 12.0,
            trend_reversal: 3.0,
            escape_top_high: 15.0,
        }
    }
}

/// Target position percentage per zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPosition {
    pub deep_dip: f64,
    pub gold_zone: f64,
    pub oscillation: f64,
    pub reduce_zone: f64,
    pub escape_zone: f64,
}

impl Default for TargetPosition {
    fn default() -> Self {
        TargetPosition {
            deep_dip: 0.95,
            gold_zone: 0.75,
            oscillation: 0.55,
            reduce_zone: 0.30,
            escape_zone: 0.0,
        }
    }
}

impl TargetPosition {
    pub fn for_zone(&self, zone: MarketZone) -> f64 {
        match zone {
            MarketZone::DeepDip => self.deep_dip,
            MarketZone::GoldZone => self.gold_zone,
            MarketZone::Oscillation => self.oscillation,
            MarketZone::ReduceZone => self.reduce_zone,
            MarketZone::EscapeZone => self.escape_zone,
        }
    }
}

/// Grid spacing coefficient per zone: step = ATR * coefficient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridCoefficients {
    pub deep_dip: f64,
    pub gold_zone: f64,
    pub oscillation: f64,
    pub reduce_zone: f64,
    pub escape_zone: f64,
}

impl Default for GridCoefficients {
    fn default() -> Self {
        GridCoefficients {
            deep_dip: 0.8,
            gold_zone: 1.0,
            oscillation: 1.2,
            reduce_zone: 1.5,
            escape_zone: 1.0,
        }
    }
}

impl GridCoefficients {
    pub fn for_zone(&self, zone: MarketZone) -> f64 {
        match zone {
            MarketZone::DeepDip => self.deep_dip,
            MarketZone::GoldZone => self.gold_zone,
            MarketZone::Oscillation => self.oscillation,
            MarketZone::ReduceZone => self.reduce_zone,
            MarketZone::EscapeZone => self.escape_zone,
        }
    }
}

/// Spacing adjustment by ATR/price volatility ratio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicGrid {
    pub low_volatility_atr: f64,
    pub high_volatility_atr: f64,
    pub low_vol_multiplier: f64,
    pub high_vol_multiplier: f64,
}

impl Default for DynamicGrid {
    fn default() -> Self {
        DynamicGrid {
            low_volatility_atr: 0.015,
            high_volatility_atr: 0.03,
            low_vol_multiplier: 0.8,
            high_vol_multiplier: 1.3,
        }
    }
}

/// Minimum profit per grid rung, keyed by the same volatility ratio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinProfit {
    pub base_pct: f64,
    pub high_volatility_pct: f64,
    pub high_profit_target: f64,
    pub low_volatility_pct: f64,
    pub low_profit_target: f64,
}

impl Default for MinProfit {
    fn default() -> Self {
        MinProfit {
            base_pct: 0.012,
            high_volatility_pct: 0.03,
            high_profit_target: 0.020,
            low_volatility_pct: 0.015,
            low_profit_target: 0.010,
        }
    }
}

impl MinProfit {
    /// Pick the minimum profit percentage for a volatility ratio
    pub fn for_volatility(&self, atr_pct: f64) -> f64 {
        if atr_pct > self.high_volatility_pct {
            self.high_profit_target
        } else if atr_pct < self.low_volatility_pct {
            self.low_profit_target
        } else {
            self.base_pct
        }
    }
}

/// RSI gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiConfig {
    pub buy_threshold: f64,
    /// Above this no new buys are proposed
    pub sell_threshold: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        RsiConfig {
            buy_threshold: 30.0,
            sell_threshold: 75.0,
        }
    }
}

/// Consecutive-day BIAS trend lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendTracking {
    pub lookback_days: usize,
    /// Daily BIAS change (in points) that counts toward a trend
    pub threshold: f64,
}

impl Default for TrendTracking {
    fn default() -> Self {
        TrendTracking {
            lookback_days: 3,
            threshold: 2.0,
        }
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub bias: BiasThresholds,
    pub target_position: TargetPosition,
    pub grid_coefficient: GridCoefficients,
    pub dynamic_grid: DynamicGrid,
    pub min_profit: MinProfit,
    pub rsi: RsiConfig,
    pub trend: TrendTracking,
    /// KDJ J below this in DEEP_DIP raises a bottoming-signal warning
    pub kdj_oversold_j: f64,
    /// Unrealized loss fraction that trips the circuit breaker (negative)
    pub max_drawdown_limit: f64,
    /// Trailing-stop lookback for the recent high
    pub trailing_lookback: usize,
    /// Retracement beyond this many ATRs forces liquidation
    pub trailing_atr_multiple: f64,
    /// Fraction of the holding liquidated by the trailing stop
    pub trailing_liquidate_fraction: f64,
    /// Position deviation that triggers a rebalance buy
    pub rebalance_threshold: f64,
    /// Fraction of the deviation closed per rebalance
    pub rebalance_damping: f64,
    /// Pair exits fire once price reaches target * this tolerance
    pub pair_exit_tolerance: f64,
    /// Support/resistance lookback window
    pub sr_lookback: usize,
    /// Fraction of per-instrument capital behind one base lot
    pub lot_capital_fraction: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            bias: BiasThresholds::default(),
            target_position: TargetPosition::default(),
            grid_coefficient: GridCoefficients::default(),
            dynamic_grid: DynamicGrid::default(),
            min_profit: MinProfit::default(),
            rsi: RsiConfig::default(),
            trend: TrendTracking::default(),
            kdj_oversold_j: 10.0,
            max_drawdown_limit: -0.20,
            trailing_lookback: 20,
            trailing_atr_multiple: 3.0,
            trailing_liquidate_fraction: 0.5,
            rebalance_threshold: 0.15,
            rebalance_damping: 0.5,
            pair_exit_tolerance: 0.995,
            sr_lookback: 20,
            lot_capital_fraction: 0.05,
        }
    }
}

/// Signal-check configuration for the analyze loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Live price within this fraction of a grid price triggers a signal
    pub price_alert_pct: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            price_alert_pct: 0.005,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_json() {
        let config = Config {
            trading: TradingConfig::default(),
            strategy: StrategyConfig::default(),
            monitor: MonitorConfig::default(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.trading.instruments.len(), 5);
        assert_eq!(parsed.trading.lot_size, 100);
        assert_eq!(parsed.strategy.bias.deep_dip, -6.0);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "trading": {
                "instruments": [{"code": "sh510050", "holding": {"volume": 6400, "available": 6400, "avg_cost": 3.10}}],
                "capital_per_instrument": 40000.0,
                "lot_size": 100
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy.bias.trend_reversal, 3.0);
        assert_eq!(config.strategy.rebalance_threshold, 0.15);
        assert_eq!(config.monitor.price_alert_pct, 0.005);
        assert_eq!(config.trading.holding_for("sh510050").volume, 6400);
        assert_eq!(config.trading.holding_for("unknown").volume, 0);
        assert_eq!(config.trading.data_dir, "data");
    }

    #[test]
    fn test_min_profit_volatility_buckets() {
        let mp = MinProfit::default();
        assert_eq!(mp.for_volatility(0.010), 0.010); // low volatility
        assert_eq!(mp.for_volatility(0.020), 0.012); // normal band
        assert_eq!(mp.for_volatility(0.040), 0.020); // high volatility
    }
}
