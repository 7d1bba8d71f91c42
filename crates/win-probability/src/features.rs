use analysis_core::{stats, AnalysisError, IndicatorValues, MarketSession, TradeDirection};
use chrono::Timelike;

pub const FEATURE_COUNT: usize = 15;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "rsi",
    "ema_spread_pct",
    "macd_histogram_pct",
    "bollinger_percent_b",
    "bollinger_width_pct",
    "volatility_ratio",
    "pattern_bias",
    "session_asian",
    "session_london",
    "session_new_york",
    "session_overlap",
    "trend_strength",
    "time_bucket",
    "strategy_score",
    "direction",
];

/// Engineered feature vector for one setup.
///
/// `direction` is the side being evaluated; `None` (no trend) encodes as 0.
pub fn feature_vector(
    values: &IndicatorValues,
    final_score: f64,
    direction: Option<TradeDirection>,
) -> Result<Vec<f64>, AnalysisError> {
    let session = MarketSession::from_timestamp(values.timestamp);
    let ema_spread = values.ema_fast - values.ema_slow;

    let one_hot = |s: MarketSession| if session == s { 1.0 } else { 0.0 };

    let features = vec![
        values.rsi / 100.0,
        stats::safe_ratio(ema_spread, values.close, 0.0) * 100.0,
        stats::safe_ratio(values.macd_histogram, values.close, 0.0) * 100.0,
        values.percent_b(),
        stats::safe_ratio(values.band_width(), values.bb_middle, 0.0) * 100.0,
        values.volatility_ratio,
        values.pattern_bias.sign() as f64,
        one_hot(MarketSession::Asian),
        one_hot(MarketSession::London),
        one_hot(MarketSession::NewYork),
        one_hot(MarketSession::Overlap),
        stats::safe_ratio(ema_spread, values.band_width(), 0.0),
        (values.timestamp.hour() / 4) as f64,
        final_score / 100.0,
        direction.map(|d| d.sign()).unwrap_or(0.0),
    ];

    if let Some((i, v)) = features.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(AnalysisError::InvalidData(format!(
            "feature {} is not finite ({v})",
            FEATURE_NAMES[i]
        )));
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Crossover, PatternLabel, TrendDirection};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn values() -> IndicatorValues {
        IndicatorValues {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 15, 0).unwrap(),
            close: 100.0,
            rsi: 62.0,
            ema_fast: 100.5,
            ema_slow: 100.0,
            macd_line: 0.3,
            macd_signal: 0.1,
            macd_histogram: 0.2,
            bb_upper: 102.0,
            bb_middle: 100.0,
            bb_lower: 98.0,
            volatility_ratio: 1.2,
            pattern: PatternLabel::Hammer,
            pattern_bias: TrendDirection::Bullish,
            trend: TrendDirection::Bullish,
            ema_crossover: Crossover::None,
        }
    }

    #[test]
    fn test_feature_layout() {
        let f = feature_vector(&values(), 72.0, Some(TradeDirection::Call)).unwrap();
        assert_eq!(f.len(), FEATURE_COUNT);
        assert_relative_eq!(f[0], 0.62, epsilon = 1e-12);
        assert_relative_eq!(f[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(f[2], 0.2, epsilon = 1e-12);
        assert_relative_eq!(f[3], 0.5, epsilon = 1e-12);
        assert_relative_eq!(f[4], 4.0, epsilon = 1e-12);
        assert_relative_eq!(f[5], 1.2, epsilon = 1e-12);
        assert_eq!(f[6], 1.0);
        // 14:15 UTC is the overlap
        assert_eq!(&f[7..11], &[0.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(f[11], 0.125, epsilon = 1e-12);
        assert_eq!(f[12], 3.0);
        assert_relative_eq!(f[13], 0.72, epsilon = 1e-12);
        assert_eq!(f[14], 1.0);
    }

    #[test]
    fn test_neutral_direction_and_zero_prices() {
        let mut v = values();
        v.close = 0.0;
        v.bb_upper = 0.0;
        v.bb_middle = 0.0;
        v.bb_lower = 0.0;
        let f = feature_vector(&v, 50.0, None).unwrap();
        assert_eq!(f[1], 0.0);
        assert_eq!(f[11], 0.0);
        assert_eq!(f[14], 0.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut v = values();
        v.volatility_ratio = f64::NAN;
        assert!(feature_vector(&v, 50.0, None).is_err());
    }
}
