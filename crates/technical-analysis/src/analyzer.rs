use analysis_core::{
    AnalysisError, BandReading, Candle, CandleSeries, IndicatorSnapshot, MacdReading, Reading,
};
use serde::{Deserialize, Serialize};

use crate::indicators::*;
use crate::patterns::*;

/// Indicator lookbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub volatility_period: usize,
    pub patterns: PatternThresholds,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast: 9,
            ema_slow: 21,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            volatility_period: 14,
            patterns: PatternThresholds::default(),
        }
    }
}

impl IndicatorConfig {
    /// Candles needed before every reading in a snapshot is ready.
    pub fn full_lookback(&self) -> usize {
        [
            self.rsi_period + 1,
            self.ema_fast,
            self.ema_slow,
            self.macd_slow,
            self.bollinger_period,
            self.volatility_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let periods = [
            ("rsi_period", self.rsi_period),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("bollinger_period", self.bollinger_period),
            ("volatility_period", self.volatility_period),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(AnalysisError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.ema_fast >= self.ema_slow {
            return Err(AnalysisError::InvalidConfig(
                "ema_fast must be shorter than ema_slow".to_string(),
            ));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(AnalysisError::InvalidConfig(
                "macd_fast must be shorter than macd_slow".to_string(),
            ));
        }
        if self.bollinger_std_dev <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "bollinger_std_dev must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn reading<T>(value: Option<T>, required: usize, available: usize) -> Reading<T> {
    match value {
        Some(v) => Reading::Ready(v),
        None => Reading::Insufficient {
            required,
            available,
        },
    }
}

/// Computes an [`IndicatorSnapshot`] over the trailing window of a candle series.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Validate raw candles, then analyse. An empty slice is `InsufficientData`.
    pub fn analyze_candles(
        &self,
        candles: Vec<Candle>,
    ) -> Result<IndicatorSnapshot, AnalysisError> {
        let series = CandleSeries::new(candles)?;
        self.analyze(&series)
    }

    pub fn analyze(&self, series: &CandleSeries) -> Result<IndicatorSnapshot, AnalysisError> {
        let Some(last) = series.last() else {
            return Err(AnalysisError::InsufficientData(
                "candle sequence is empty".to_string(),
            ));
        };
        let cfg = &self.config;
        let candles = series.candles();
        let closes = series.closes();
        let n = candles.len();

        let rsi = reading(rsi(&closes, cfg.rsi_period).last().copied(), cfg.rsi_period + 1, n);

        let fast_line = ema(&closes, cfg.ema_fast);
        let slow_line = ema(&closes, cfg.ema_slow);
        let ema_fast = reading(fast_line.last().copied(), cfg.ema_fast, n);
        let ema_slow = reading(slow_line.last().copied(), cfg.ema_slow, n);

        let macd_result = macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let macd_value = match (
            macd_result.macd_line.last(),
            macd_result.signal_line.last(),
            macd_result.histogram.last(),
        ) {
            (Some(&line), Some(&signal), Some(&histogram)) => Some(MacdReading {
                line,
                signal,
                histogram,
            }),
            _ => None,
        };

        let bands = bollinger_bands(&closes, cfg.bollinger_period, cfg.bollinger_std_dev);
        let band_value = match (bands.upper.last(), bands.middle.last(), bands.lower.last()) {
            (Some(&upper), Some(&middle), Some(&lower)) => Some(BandReading {
                upper,
                middle,
                lower,
            }),
            _ => None,
        };

        let volatility = reading(
            volatility_ratio(candles, cfg.volatility_period),
            cfg.volatility_period + 1,
            n,
        );

        let pattern = detect_pattern(candles, &cfg.patterns);
        let trend = trend_from_emas(ema_fast.value(), ema_slow.value());

        // Align the fast line to the slow line's candles before comparing.
        let fast_tail = &fast_line[fast_line.len().saturating_sub(slow_line.len())..];
        let crossover = detect_crossover(fast_tail, &slow_line);

        let snapshot = IndicatorSnapshot {
            timestamp: last.timestamp,
            last_close: last.close,
            candles_used: n,
            rsi,
            ema_fast,
            ema_slow,
            macd: reading(macd_value, cfg.macd_slow, n),
            bollinger: reading(band_value, cfg.bollinger_period, n),
            volatility_ratio: volatility,
            pattern: pattern.pattern,
            pattern_bias: pattern.bias,
            trend,
            ema_crossover: crossover,
        };

        tracing::debug!(
            candles = n,
            complete = snapshot.is_complete(),
            trend = ?snapshot.trend,
            pattern = ?snapshot.pattern,
            "indicator snapshot computed"
        );

        Ok(snapshot)
    }
}
