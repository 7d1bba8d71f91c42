use analysis_core::{Candle, Crossover, PatternLabel, TrendDirection};
use serde::{Deserialize, Serialize};

/// Body/wick ratio thresholds for single-candle shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternThresholds {
    /// Body under this share of the range is a doji.
    pub doji_body_ratio: f64,
    /// Body at or above this share of the range is a marubozu.
    pub marubozu_body_ratio: f64,
    /// Dominant wick at or above this share of the range is a pin bar.
    pub pin_bar_wick_ratio: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            doji_body_ratio: 0.1,
            marubozu_body_ratio: 0.9,
            pin_bar_wick_ratio: 2.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern: PatternLabel,
    pub bias: TrendDirection,
    pub strength: f64, // 0.0 to 1.0
}

impl PatternMatch {
    fn none() -> Self {
        Self {
            pattern: PatternLabel::None,
            bias: TrendDirection::Neutral,
            strength: 0.0,
        }
    }
}

fn colour(candle: &Candle) -> TrendDirection {
    if candle.is_bullish() {
        TrendDirection::Bullish
    } else if candle.is_bearish() {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

/// Detect engulfing pattern (requires 2 candles)
fn is_engulfing(prev: &Candle, curr: &Candle) -> Option<PatternMatch> {
    // Bullish engulfing: prev bearish, curr bullish and engulfs prev
    if prev.is_bearish()
        && curr.is_bullish()
        && curr.open <= prev.close
        && curr.close >= prev.open
    {
        let body_size = curr.body() / prev.body();
        return Some(PatternMatch {
            pattern: PatternLabel::EngulfingBull,
            bias: TrendDirection::Bullish,
            strength: body_size.min(2.0) / 2.0,
        });
    }

    // Bearish engulfing: prev bullish, curr bearish and engulfs prev
    if prev.is_bullish()
        && curr.is_bearish()
        && curr.open >= prev.close
        && curr.close <= prev.open
    {
        let body_size = curr.body() / prev.body();
        return Some(PatternMatch {
            pattern: PatternLabel::EngulfingBear,
            bias: TrendDirection::Bearish,
            strength: body_size.min(2.0) / 2.0,
        });
    }

    None
}

fn is_doji(candle: &Candle, t: &PatternThresholds) -> Option<PatternMatch> {
    let body_ratio = candle.body() / candle.range();
    if body_ratio < t.doji_body_ratio {
        return Some(PatternMatch {
            pattern: PatternLabel::Doji,
            bias: TrendDirection::Neutral,
            strength: 1.0 - body_ratio / t.doji_body_ratio,
        });
    }
    None
}

/// Long lower shadow, little or no upper shadow.
fn is_hammer(candle: &Candle) -> Option<PatternMatch> {
    let body = candle.body();
    let lower = candle.lower_wick();
    if lower > 2.0 * body && candle.upper_wick() < body * 0.5 {
        return Some(PatternMatch {
            pattern: PatternLabel::Hammer,
            bias: TrendDirection::Bullish,
            strength: (lower / body).min(5.0) / 5.0,
        });
    }
    None
}

/// One wick dominates the range; bias points away from the rejected side.
fn is_pin_bar(candle: &Candle, t: &PatternThresholds) -> Option<PatternMatch> {
    let range = candle.range();
    let upper = candle.upper_wick() / range;
    let lower = candle.lower_wick() / range;

    let (wick, bias) = if lower >= upper {
        (lower, TrendDirection::Bullish)
    } else {
        (upper, TrendDirection::Bearish)
    };

    if wick >= t.pin_bar_wick_ratio {
        return Some(PatternMatch {
            pattern: PatternLabel::PinBar,
            bias,
            strength: wick,
        });
    }
    None
}

fn is_marubozu(candle: &Candle, t: &PatternThresholds) -> Option<PatternMatch> {
    let body_ratio = candle.body() / candle.range();
    if body_ratio >= t.marubozu_body_ratio {
        return Some(PatternMatch {
            pattern: PatternLabel::Marubozu,
            bias: colour(candle),
            strength: body_ratio,
        });
    }
    None
}

/// Classify the last one or two candles. Two-candle patterns take precedence;
/// a zero-range candle is never a pattern.
pub fn detect_pattern(candles: &[Candle], thresholds: &PatternThresholds) -> PatternMatch {
    let Some(curr) = candles.last() else {
        return PatternMatch::none();
    };

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if let Some(m) = is_engulfing(prev, curr) {
            return m;
        }
    }

    if curr.range() <= 0.0 {
        return PatternMatch::none();
    }

    is_doji(curr, thresholds)
        .or_else(|| is_hammer(curr))
        .or_else(|| is_pin_bar(curr, thresholds))
        .or_else(|| is_marubozu(curr, thresholds))
        .unwrap_or_else(PatternMatch::none)
}

/// Trend from the fast EMA's position against the slow EMA.
pub fn trend_from_emas(ema_fast: Option<f64>, ema_slow: Option<f64>) -> TrendDirection {
    match (ema_fast, ema_slow) {
        (Some(fast), Some(slow)) if fast > slow => TrendDirection::Bullish,
        (Some(fast), Some(slow)) if fast < slow => TrendDirection::Bearish,
        _ => TrendDirection::Neutral,
    }
}

/// Cross of the fast EMA over the slow EMA on the latest candle.
///
/// Both slices must be aligned to the same candles, latest last.
pub fn detect_crossover(fast: &[f64], slow: &[f64]) -> Crossover {
    if fast.len() < 2 || slow.len() < 2 {
        return Crossover::None;
    }

    let (f_prev, f_now) = (fast[fast.len() - 2], fast[fast.len() - 1]);
    let (s_prev, s_now) = (slow[slow.len() - 2], slow[slow.len() - 1]);

    if f_prev <= s_prev && f_now > s_now {
        Crossover::BullishCross
    } else if f_prev >= s_prev && f_now < s_now {
        Crossover::BearishCross
    } else {
        Crossover::None
    }
}
