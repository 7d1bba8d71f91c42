use analysis_core::{AnalysisError, TrendDirection};
use serde::{Deserialize, Serialize};

/// Trap rule thresholds. The defaults are tunable starting points, not
/// fitted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapThresholds {
    /// Share of directional signals that must agree for the perfect-setup trap (default 0.9)
    #[serde(default = "default_perfect_setup_alignment")]
    pub perfect_setup_alignment: f64,
    /// Volatility ratio counted as a spike (default 2.0)
    #[serde(default = "default_volatility_spike_ratio")]
    pub volatility_spike_ratio: f64,
    /// Share of the Bollinger range already travelled in the trend direction (default 0.7)
    #[serde(default = "default_late_entry_completion")]
    pub late_entry_completion: f64,
    /// Seconds after a losing close during which a new trade is a revenge trade (default 300)
    #[serde(default = "default_revenge_cooldown_secs")]
    pub revenge_cooldown_secs: i64,
    /// Trades allowed inside the overtrading window before the flag fires (default 5)
    #[serde(default = "default_overtrading_max_trades")]
    pub overtrading_max_trades: usize,
    /// Overtrading window in minutes (default 60)
    #[serde(default = "default_overtrading_window_mins")]
    pub overtrading_window_mins: i64,
    /// RSI below this votes bullish (oversold bounce expected)
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    /// RSI above this votes bearish
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default)]
    pub severities: TrapSeverities,
}

fn default_perfect_setup_alignment() -> f64 { 0.9 }
fn default_volatility_spike_ratio() -> f64 { 2.0 }
fn default_late_entry_completion() -> f64 { 0.7 }
fn default_revenge_cooldown_secs() -> i64 { 300 }
fn default_overtrading_max_trades() -> usize { 5 }
fn default_overtrading_window_mins() -> i64 { 60 }
fn default_rsi_oversold() -> f64 { 30.0 }
fn default_rsi_overbought() -> f64 { 70.0 }

impl Default for TrapThresholds {
    fn default() -> Self {
        Self {
            perfect_setup_alignment: default_perfect_setup_alignment(),
            volatility_spike_ratio: default_volatility_spike_ratio(),
            late_entry_completion: default_late_entry_completion(),
            revenge_cooldown_secs: default_revenge_cooldown_secs(),
            overtrading_max_trades: default_overtrading_max_trades(),
            overtrading_window_mins: default_overtrading_window_mins(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            severities: TrapSeverities::default(),
        }
    }
}

impl TrapThresholds {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (name, v) in [
            ("perfect_setup_alignment", self.perfect_setup_alignment),
            ("late_entry_completion", self.late_entry_completion),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} = {v} must be in (0, 1]"
                )));
            }
        }
        if self.volatility_spike_ratio <= 1.0 {
            return Err(AnalysisError::InvalidConfig(
                "volatility_spike_ratio must be above 1.0".to_string(),
            ));
        }
        if self.revenge_cooldown_secs < 0 || self.overtrading_window_mins <= 0 {
            return Err(AnalysisError::InvalidConfig(
                "trap time windows must be positive".to_string(),
            ));
        }
        self.severities.validate()
    }
}

/// Points each fired flag adds to the risk score (capped at 100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapSeverities {
    pub perfect_setup: f64,
    pub volatility_spike: f64,
    pub late_entry: f64,
    pub revenge_trade: f64,
    pub overtrading: f64,
    pub conflicting_signals: f64,
}

impl Default for TrapSeverities {
    fn default() -> Self {
        Self {
            perfect_setup: 30.0,
            volatility_spike: 25.0,
            late_entry: 25.0,
            revenge_trade: 30.0,
            overtrading: 20.0,
            conflicting_signals: 15.0,
        }
    }
}

impl TrapSeverities {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let all = [
            self.perfect_setup,
            self.volatility_spike,
            self.late_entry,
            self.revenge_trade,
            self.overtrading,
            self.conflicting_signals,
        ];
        if all.iter().any(|s| !s.is_finite() || *s < 0.0 || *s > 100.0) {
            return Err(AnalysisError::InvalidConfig(
                "trap severities must be within [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Direction each tracked indicator points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalVotes {
    pub rsi: TrendDirection,
    pub ema: TrendDirection,
    pub macd: TrendDirection,
    pub bollinger: TrendDirection,
    pub candle: TrendDirection,
}

impl SignalVotes {
    pub fn all(&self) -> [TrendDirection; 5] {
        [self.rsi, self.ema, self.macd, self.bollinger, self.candle]
    }

    fn count(votes: &[TrendDirection], direction: TrendDirection) -> usize {
        votes.iter().filter(|v| **v == direction).count()
    }

    /// Largest share of the five signals pointing the same way.
    pub fn alignment(&self) -> f64 {
        let votes = self.all();
        let bulls = Self::count(&votes, TrendDirection::Bullish);
        let bears = Self::count(&votes, TrendDirection::Bearish);
        bulls.max(bears) as f64 / votes.len() as f64
    }

    /// Bullish and bearish counts over RSI, MACD, EMA and candle.
    pub fn split(&self) -> (usize, usize) {
        let votes = [self.rsi, self.macd, self.ema, self.candle];
        (
            Self::count(&votes, TrendDirection::Bullish),
            Self::count(&votes, TrendDirection::Bearish),
        )
    }
}
