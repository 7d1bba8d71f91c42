use analysis_core::{IndicatorValues, MarketSession, PatternLabel, TrendDirection};
use serde::{Deserialize, Serialize};

/// RSI zones used when classifying the trend component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiZones {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiZones {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendSetup {
    /// Oversold inside a bullish trend, or overbought inside a bearish one.
    PullbackInTrend,
    /// Price on the trend side of the fast EMA.
    Continuation,
    /// EMAs aligned but price lagging the fast EMA.
    WeakAlignment,
    /// RSI stretched in the trend direction.
    Exhausted,
    /// No EMA alignment.
    Flat,
}

impl TrendSetup {
    pub fn score(&self) -> f64 {
        match self {
            TrendSetup::PullbackInTrend => 85.0,
            TrendSetup::Continuation => 75.0,
            TrendSetup::WeakAlignment => 60.0,
            TrendSetup::Exhausted => 40.0,
            TrendSetup::Flat => 30.0,
        }
    }
}

pub fn classify_trend(v: &IndicatorValues, zones: &RsiZones) -> TrendSetup {
    match v.trend {
        TrendDirection::Neutral => TrendSetup::Flat,
        TrendDirection::Bullish => {
            if v.rsi < zones.oversold {
                TrendSetup::PullbackInTrend
            } else if v.rsi > zones.overbought {
                TrendSetup::Exhausted
            } else if v.close >= v.ema_fast {
                TrendSetup::Continuation
            } else {
                TrendSetup::WeakAlignment
            }
        }
        TrendDirection::Bearish => {
            if v.rsi > zones.overbought {
                TrendSetup::PullbackInTrend
            } else if v.rsi < zones.oversold {
                TrendSetup::Exhausted
            } else if v.close <= v.ema_fast {
                TrendSetup::Continuation
            } else {
                TrendSetup::WeakAlignment
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MomentumState {
    /// MACD line on the trend side of its signal line.
    Confirming,
    /// No trend to confirm, or line sitting on the signal.
    Unconfirmed,
    /// MACD line against the trend.
    Opposing,
}

impl MomentumState {
    pub fn score(&self) -> f64 {
        match self {
            MomentumState::Confirming => 75.0,
            MomentumState::Unconfirmed => 40.0,
            MomentumState::Opposing => 25.0,
        }
    }
}

pub fn classify_momentum(v: &IndicatorValues) -> MomentumState {
    let spread = v.macd_line - v.macd_signal;
    let direction = v.trend.sign() as f64;
    if direction == 0.0 || spread == 0.0 {
        MomentumState::Unconfirmed
    } else if spread * direction > 0.0 {
        MomentumState::Confirming
    } else {
        MomentumState::Opposing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolatilityRegime {
    Calm,
    Normal,
    Elevated,
    Spike,
}

impl VolatilityRegime {
    pub fn score(&self) -> f64 {
        match self {
            VolatilityRegime::Calm => 50.0,
            VolatilityRegime::Normal => 70.0,
            VolatilityRegime::Elevated => 45.0,
            VolatilityRegime::Spike => 15.0,
        }
    }
}

/// `spike_ratio` is shared with the trap assessor's volatility-spike rule.
pub fn classify_volatility(volatility_ratio: f64, spike_ratio: f64) -> VolatilityRegime {
    if volatility_ratio >= spike_ratio {
        VolatilityRegime::Spike
    } else if volatility_ratio >= 1.5 {
        VolatilityRegime::Elevated
    } else if volatility_ratio < 0.6 {
        VolatilityRegime::Calm
    } else {
        VolatilityRegime::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFit {
    /// Pattern with no bias conflict against the trend.
    Fits(PatternLabel),
    /// Directional pattern pointing against the trend.
    Opposing(PatternLabel),
}

impl PatternFit {
    pub fn score(&self) -> f64 {
        match self {
            PatternFit::Opposing(_) => 25.0,
            PatternFit::Fits(label) => match label {
                PatternLabel::EngulfingBull | PatternLabel::EngulfingBear => 85.0,
                PatternLabel::Hammer => 80.0,
                PatternLabel::Marubozu => 75.0,
                PatternLabel::PinBar => 70.0,
                PatternLabel::None => 50.0,
                PatternLabel::Doji => 40.0,
            },
        }
    }
}

pub fn classify_pattern(v: &IndicatorValues) -> PatternFit {
    if v.pattern_bias.opposes(v.trend) {
        PatternFit::Opposing(v.pattern)
    } else {
        PatternFit::Fits(v.pattern)
    }
}

pub fn session_score(session: MarketSession) -> f64 {
    match session {
        MarketSession::Overlap => 100.0,
        MarketSession::London => 100.0,
        MarketSession::NewYork => 90.0,
        MarketSession::Asian => 60.0,
    }
}
