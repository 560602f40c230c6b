//! Core data types used across the trading system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Instrument code using Arc<str> for cheap cloning
///
/// Codes are cloned into every plan, order and ledger row. Using Arc<str>
/// instead of String reduces heap allocations from O(n) to O(1) per clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Ledger/display form, matching the persisted direction column
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order execution style for a proposed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Limit => f.write_str("LIMIT"),
            OrderType::Market => f.write_str("MARKET"),
        }
    }
}

/// One proposed order. A single tagged structure consumed uniformly by all
/// collaborators (notifier, order placement, dashboards).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridOrder {
    pub side: Side,
    pub price: f64,
    /// Share count, always a non-negative multiple of the configured lot size
    pub amount: i64,
    pub order_type: OrderType,
    pub desc: String,
}

impl GridOrder {
    pub fn limit(side: Side, price: f64, amount: i64, desc: impl Into<String>) -> Self {
        GridOrder {
            side,
            price,
            amount,
            order_type: OrderType::Limit,
            desc: desc.into(),
        }
    }

    pub fn market(side: Side, price: f64, amount: i64, desc: impl Into<String>) -> Self {
        GridOrder {
            side,
            price,
            amount,
            order_type: OrderType::Market,
            desc: desc.into(),
        }
    }

    /// Notional value of the order at its proposed price
    pub fn value(&self) -> f64 {
        self.price * self.amount as f64
    }
}

/// Current position in an instrument, supplied by the holdings collaborator
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Holding {
    /// Total shares held
    #[serde(default)]
    pub volume: i64,
    /// Shares available to sell (T+1 settlement can lock part of the volume)
    #[serde(default)]
    pub available: i64,
    /// Average cost per share
    #[serde(default)]
    pub avg_cost: f64,
}

impl Holding {
    /// Unrealized PnL fraction against average cost, if a position exists
    pub fn pnl_pct(&self, price: f64) -> Option<f64> {
        if self.volume > 0 && self.avg_cost > 0.0 {
            Some((price - self.avg_cost) / self.avg_cost)
        } else {
            None
        }
    }
}

/// Market regime derived from BIAS(20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketZone {
    DeepDip,
    GoldZone,
    Oscillation,
    ReduceZone,
    EscapeZone,
}

impl std::fmt::Display for MarketZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketZone::DeepDip => f.write_str("DEEP_DIP"),
            MarketZone::GoldZone => f.write_str("GOLD_ZONE"),
            MarketZone::Oscillation => f.write_str("OSCILLATION"),
            MarketZone::ReduceZone => f.write_str("REDUCE_ZONE"),
            MarketZone::EscapeZone => f.write_str("ESCAPE_ZONE"),
        }
    }
}

/// Outcome classification carried on every plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Too few candles to evaluate at all
    InsufficientData,
    /// Enough candles, but bias/ATR still in their warm-up window
    InsufficientIndicators,
    /// Normal classification
    Zone(MarketZone),
    /// OSCILLATION forced by the trend-reversal override
    ZoneSwitch,
    /// BIAS above the escape-top boundary, target position forced to zero
    EscapeHigh,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::InsufficientData => f.write_str("INSUFFICIENT_DATA"),
            PlanStatus::InsufficientIndicators => f.write_str("INSUFFICIENT_INDICATORS"),
            PlanStatus::Zone(zone) => write!(f, "{zone}"),
            PlanStatus::ZoneSwitch => f.write_str("OSCILLATION (SWITCH)"),
            PlanStatus::EscapeHigh => f.write_str("ESCAPE_HIGH"),
        }
    }
}

/// Full output of one evaluation. Always returned, never an error: bad or
/// insufficient input is expressed through `status` and `warnings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub code: Symbol,
    pub current_price: f64,
    pub current_bias: f64,
    pub status: PlanStatus,
    pub target_pos_pct: f64,
    pub orders: Vec<GridOrder>,
    pub warnings: Vec<String>,
    pub risk_triggered: bool,
    pub support: f64,
    pub resistance: f64,
}

impl TradePlan {
    pub fn new(code: Symbol, price: f64, bias: f64, status: PlanStatus, target: f64) -> Self {
        TradePlan {
            code,
            current_price: price,
            current_bias: bias,
            status,
            target_pos_pct: target,
            orders: Vec::new(),
            warnings: Vec::new(),
            risk_triggered: false,
            support: 0.0,
            resistance: 0.0,
        }
    }

    /// Sentinel plan for a series too short to evaluate
    pub fn insufficient_data(code: Symbol) -> Self {
        let mut plan = TradePlan::new(code, 0.0, 0.0, PlanStatus::InsufficientData, 0.0);
        plan.warnings.push("insufficient history".to_string());
        plan
    }

    /// Sentinel plan for a series whose indicators are still warming up
    pub fn insufficient_indicators(code: Symbol, price: f64) -> Self {
        TradePlan::new(code, price, 0.0, PlanStatus::InsufficientIndicators, 0.0)
    }
}
