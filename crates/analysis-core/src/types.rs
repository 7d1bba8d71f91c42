use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AnalysisError;

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// True range against the previous close, or plain high-low for the first candle.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let high_low = self.range();
        match prev_close {
            Some(pc) => high_low.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => high_low,
        }
    }
}

/// Non-empty candle sequence with strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, AnalysisError> {
        if candles.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "candle sequence is empty".to_string(),
            ));
        }

        for (i, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(AnalysisError::InvalidData(format!(
                    "candle {} at {} is not after {}",
                    i + 1,
                    pair[1].timestamp,
                    pair[0].timestamp
                )));
            }
        }

        if let Some(bad) = candles.iter().find(|c| {
            !(c.open.is_finite() && c.high.is_finite() && c.low.is_finite() && c.close.is_finite())
                || c.high < c.low
        }) {
            return Err(AnalysisError::InvalidData(format!(
                "malformed candle at {}",
                bad.timestamp
            )));
        }

        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Newest candle. `None` never occurs for a series built through [`CandleSeries::new`].
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

impl<'de> Deserialize<'de> for CandleSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let candles = Vec::<Candle>::deserialize(deserializer)?;
        CandleSeries::new(candles).map_err(serde::de::Error::custom)
    }
}

/// Timeframe for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1m" | "m1" => Some(Timeframe::Minute1),
            "5m" | "m5" => Some(Timeframe::Minute5),
            "15m" | "m15" => Some(Timeframe::Minute15),
            "30m" | "m30" => Some(Timeframe::Minute30),
            "1h" | "h1" => Some(Timeframe::Hour1),
            "4h" | "h4" => Some(Timeframe::Hour4),
            "1d" | "d1" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

/// UTC trading session, used as a liquidity proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketSession {
    Asian,
    London,
    NewYork,
    Overlap,
}

impl MarketSession {
    pub const ALL: [MarketSession; 4] = [
        MarketSession::Asian,
        MarketSession::London,
        MarketSession::NewYork,
        MarketSession::Overlap,
    ];

    /// London/New York overlap (13:00-16:00) wins over both sessions.
    /// 22:00-24:00 belongs to the Asian session (Sydney open).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            13..=15 => MarketSession::Overlap,
            8..=12 => MarketSession::London,
            16..=21 => MarketSession::NewYork,
            _ => MarketSession::Asian,
        }
    }

    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self::from_hour(ts.hour())
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketSession::Asian => "Asian",
            MarketSession::London => "London",
            MarketSession::NewYork => "New York",
            MarketSession::Overlap => "London/New York overlap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    /// +1 bullish, -1 bearish, 0 neutral
    pub fn sign(&self) -> i32 {
        match self {
            TrendDirection::Bullish => 1,
            TrendDirection::Bearish => -1,
            TrendDirection::Neutral => 0,
        }
    }

    pub fn opposes(&self, other: TrendDirection) -> bool {
        self.sign() * other.sign() < 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternLabel {
    None,
    Hammer,
    Doji,
    EngulfingBull,
    EngulfingBear,
    Marubozu,
    PinBar,
}

impl PatternLabel {
    pub fn to_label(&self) -> &'static str {
        match self {
            PatternLabel::None => "no pattern",
            PatternLabel::Hammer => "hammer",
            PatternLabel::Doji => "doji",
            PatternLabel::EngulfingBull => "bullish engulfing",
            PatternLabel::EngulfingBear => "bearish engulfing",
            PatternLabel::Marubozu => "marubozu",
            PatternLabel::PinBar => "pin bar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Crossover {
    None,
    BullishCross,
    BearishCross,
}

/// An indicator value, or the explicit "lookback not satisfied" state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading<T> {
    Ready(T),
    Insufficient { required: usize, available: usize },
}

impl<T: Copy> Reading<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Reading::Ready(v) => Some(*v),
            Reading::Insufficient { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Reading::Ready(_))
    }

    /// Value or an `InsufficientData` error naming the indicator.
    pub fn require(&self, name: &str) -> Result<T, AnalysisError> {
        match self {
            Reading::Ready(v) => Ok(*v),
            Reading::Insufficient { required, available } => Err(AnalysisError::InsufficientData(
                format!("{name} needs {required} candles, have {available}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandReading {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Indicator state keyed to the last candle of the analysed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub last_close: f64,
    pub candles_used: usize,
    pub rsi: Reading<f64>,
    pub ema_fast: Reading<f64>,
    pub ema_slow: Reading<f64>,
    pub macd: Reading<MacdReading>,
    pub bollinger: Reading<BandReading>,
    pub volatility_ratio: Reading<f64>,
    pub pattern: PatternLabel,
    pub pattern_bias: TrendDirection,
    pub trend: TrendDirection,
    pub ema_crossover: Crossover,
}

impl IndicatorSnapshot {
    pub fn is_complete(&self) -> bool {
        self.rsi.is_ready()
            && self.ema_fast.is_ready()
            && self.ema_slow.is_ready()
            && self.macd.is_ready()
            && self.bollinger.is_ready()
            && self.volatility_ratio.is_ready()
    }

    /// Plain numeric view, available once every lookback is satisfied.
    pub fn values(&self) -> Result<IndicatorValues, AnalysisError> {
        let macd = self.macd.require("MACD")?;
        let bands = self.bollinger.require("Bollinger bands")?;
        Ok(IndicatorValues {
            timestamp: self.timestamp,
            close: self.last_close,
            rsi: self.rsi.require("RSI")?,
            ema_fast: self.ema_fast.require("fast EMA")?,
            ema_slow: self.ema_slow.require("slow EMA")?,
            macd_line: macd.line,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            volatility_ratio: self.volatility_ratio.require("volatility ratio")?,
            pattern: self.pattern,
            pattern_bias: self.pattern_bias,
            trend: self.trend,
            ema_crossover: self.ema_crossover,
        })
    }
}

/// Fully-populated indicator values consumed by scoring, trap and model code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub volatility_ratio: f64,
    pub pattern: PatternLabel,
    pub pattern_bias: TrendDirection,
    pub trend: TrendDirection,
    pub ema_crossover: Crossover,
}

impl IndicatorValues {
    pub fn band_width(&self) -> f64 {
        self.bb_upper - self.bb_lower
    }

    /// Bollinger %B: 0 at the lower band, 1 at the upper band. 0.5 on a flat band.
    pub fn percent_b(&self) -> f64 {
        let width = self.band_width();
        if width.abs() < f64::EPSILON {
            0.5
        } else {
            (self.close - self.bb_lower) / width
        }
    }

    pub fn session(&self) -> MarketSession {
        MarketSession::from_timestamp(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    NoTrade,
    Risky,
    Acceptable,
    HighQuality,
}

impl Grade {
    /// Lower bounds are inclusive: 41 RISKY, 61 ACCEPTABLE, 76 HIGH_QUALITY.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 76.0 => Grade::HighQuality,
            s if s >= 61.0 => Grade::Acceptable,
            s if s >= 41.0 => Grade::Risky,
            _ => Grade::NoTrade,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Grade::NoTrade => "No Trade",
            Grade::Risky => "Risky",
            Grade::Acceptable => "Acceptable",
            Grade::HighQuality => "High Quality",
        }
    }
}

/// Weighted setup quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    pub trend_component: f64,
    pub momentum_component: f64,
    pub volatility_component: f64,
    pub pattern_component: f64,
    pub session_component: f64,
    pub psychology_penalty: f64,
    pub final_score: f64,
    pub grade: Grade,
    pub session: MarketSession,
    pub trend: TrendDirection,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapAssessment {
    pub perfect_setup_flag: bool,
    pub volatility_spike_flag: bool,
    pub late_entry_flag: bool,
    pub revenge_trade_flag: bool,
    pub overtrading_flag: bool,
    #[serde(default)]
    pub conflicting_signals_flag: bool,
    pub risk_score: f64,
    pub warnings: Vec<String>,
}

impl TrapAssessment {
    pub fn any_fired(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Estimator lifecycle. Ordering follows the forward-only progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    ColdStart,
    Learning,
    Activated,
    Tuning,
    Mature,
}

impl ModelState {
    pub fn produces_probability(&self) -> bool {
        !matches!(self, ModelState::ColdStart)
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelState::ColdStart => "COLD_START",
            ModelState::Learning => "LEARNING",
            ModelState::Activated => "ACTIVATED",
            ModelState::Tuning => "TUNING",
            ModelState::Mature => "MATURE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Tier from distance to 0.5, symmetric for wins and losses.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.70 || p <= 0.30 {
            ConfidenceTier::High
        } else if p >= 0.60 || p <= 0.40 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityEstimate {
    /// `None` means no model is trusted yet; never a stand-in 0.5.
    pub win_probability: Option<f64>,
    pub confidence_tier: ConfidenceTier,
    pub sample_size_used: usize,
    pub model_state: ModelState,
    #[serde(default)]
    pub low_confidence: bool,
}

impl ProbabilityEstimate {
    pub fn cold_start(sample_size_used: usize) -> Self {
        Self {
            win_probability: None,
            confidence_tier: ConfidenceTier::None,
            sample_size_used,
            model_state: ModelState::ColdStart,
            low_confidence: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Wait,
    DoNotTrade,
}

impl Signal {
    pub fn to_label(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Wait => "WAIT",
            Signal::DoNotTrade => "DO NOT TRADE",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, Signal::Buy | Signal::Sell)
    }
}

/// Which fusion rule produced a decision, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    TrapVeto,
    StrongSetup,
    MarginalSetup,
    WeakScore,
    Fallback,
}

impl DecisionRule {
    pub fn priority(&self) -> u8 {
        match self {
            DecisionRule::TrapVeto => 1,
            DecisionRule::StrongSetup => 2,
            DecisionRule::MarginalSetup => 3,
            DecisionRule::WeakScore => 4,
            DecisionRule::Fallback => 5,
        }
    }
}

/// Externally visible outcome of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: Signal,
    pub direction: Option<crate::TradeDirection>,
    pub confidence: ConfidenceTier,
    pub rule: DecisionRule,
    pub score: f64,
    pub grade: Grade,
    pub win_probability: Option<f64>,
    pub model_state: ModelState,
    pub trap_risk: f64,
    pub rationale: Vec<String>,
    pub warnings: Vec<String>,
}
