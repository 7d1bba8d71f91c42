use analysis_core::{
    stats, AnalysisError, Crossover, Grade, IndicatorValues, MarketSession, PatternLabel,
    StrategyScore, TrendDirection,
};
use serde::{Deserialize, Serialize};

use crate::rules::*;

/// Component weights. The psychology term is subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub trend: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub pattern: f64,
    pub session: f64,
    pub psychology: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            trend: 0.25,
            momentum: 0.20,
            volatility: 0.15,
            pattern: 0.15,
            session: 0.10,
            psychology: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn additive_total(&self) -> f64 {
        self.trend + self.momentum + self.volatility + self.pattern + self.session
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let all = [
            ("trend", self.trend),
            ("momentum", self.momentum),
            ("volatility", self.volatility),
            ("pattern", self.pattern),
            ("session", self.session),
            ("psychology", self.psychology),
        ];
        if let Some((name, w)) = all.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "scoring weight {name} = {w} must be a non-negative number"
            )));
        }
        if self.additive_total() <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "additive scoring weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted mean of the additive components on the 0-100 scale, minus the
    /// weighted penalty, clamped to [0, 100].
    pub fn combine(&self, components: &ComponentScores, psychology_penalty: f64) -> f64 {
        let additive = self.trend * components.trend
            + self.momentum * components.momentum
            + self.volatility * components.volatility
            + self.pattern * components.pattern
            + self.session * components.session;
        let base = stats::safe_ratio(additive, self.additive_total(), 0.0);
        stats::clamp_score(base - self.psychology * psychology_penalty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub trend: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub pattern: f64,
    pub session: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub weights: ScoringWeights,
    pub rsi_zones: RsiZones,
    /// Volatility ratio treated as a spike.
    pub volatility_spike_ratio: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            rsi_zones: RsiZones::default(),
            volatility_spike_ratio: 2.0,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.weights.validate()?;
        let zones = &self.rsi_zones;
        if !(0.0 < zones.oversold
            && zones.oversold < zones.overbought
            && zones.overbought < 100.0)
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "RSI zones {}/{} must satisfy 0 < oversold < overbought < 100",
                zones.oversold, zones.overbought
            )));
        }
        if self.volatility_spike_ratio <= 1.5 {
            return Err(AnalysisError::InvalidConfig(
                "volatility_spike_ratio must exceed the elevated band (1.5)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyScorer {
    config: ScorerConfig,
}

impl StrategyScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score a setup. `trap_risk` (0-100) is the psychology penalty.
    pub fn score(
        &self,
        values: &IndicatorValues,
        session: MarketSession,
        trap_risk: f64,
    ) -> StrategyScore {
        let trend_setup = classify_trend(values, &self.config.rsi_zones);
        let momentum = classify_momentum(values);
        let regime =
            classify_volatility(values.volatility_ratio, self.config.volatility_spike_ratio);
        let pattern = classify_pattern(values);

        let components = ComponentScores {
            trend: trend_setup.score(),
            momentum: momentum.score(),
            volatility: regime.score(),
            pattern: pattern.score(),
            session: session_score(session),
        };
        let penalty = stats::clamp_score(trap_risk);
        let final_score = self.config.weights.combine(&components, penalty);
        let grade = Grade::from_score(final_score);

        let notes = build_notes(values, session, trend_setup, momentum, regime, pattern);

        tracing::debug!(
            final_score,
            grade = ?grade,
            trend = ?trend_setup,
            momentum = ?momentum,
            volatility = ?regime,
            "strategy scored"
        );

        StrategyScore {
            trend_component: components.trend,
            momentum_component: components.momentum,
            volatility_component: components.volatility,
            pattern_component: components.pattern,
            session_component: components.session,
            psychology_penalty: penalty,
            final_score,
            grade,
            session,
            trend: values.trend,
            notes,
        }
    }
}

fn build_notes(
    v: &IndicatorValues,
    session: MarketSession,
    trend: TrendSetup,
    momentum: MomentumState,
    regime: VolatilityRegime,
    pattern: PatternFit,
) -> Vec<String> {
    let mut notes = Vec::new();

    let direction = match v.trend {
        TrendDirection::Bullish => "bullish",
        TrendDirection::Bearish => "bearish",
        TrendDirection::Neutral => "neutral",
    };

    notes.push(match trend {
        TrendSetup::PullbackInTrend => {
            format!("RSI {:.1} pullback inside {direction} EMA trend", v.rsi)
        }
        TrendSetup::Continuation => format!("Price continuing {direction} EMA trend"),
        TrendSetup::WeakAlignment => format!("EMAs {direction} but price lags the fast EMA"),
        TrendSetup::Exhausted => format!("RSI {:.1} stretched in {direction} trend", v.rsi),
        TrendSetup::Flat => "EMAs flat, no trend".to_string(),
    });

    match v.ema_crossover {
        Crossover::BullishCross => notes.push("Fresh bullish EMA crossover".to_string()),
        Crossover::BearishCross => notes.push("Fresh bearish EMA crossover".to_string()),
        Crossover::None => {}
    }

    notes.push(match momentum {
        MomentumState::Confirming => format!("MACD confirms {direction} momentum"),
        MomentumState::Unconfirmed => "MACD gives no confirmation".to_string(),
        MomentumState::Opposing => "MACD momentum opposes the trend".to_string(),
    });

    match regime {
        VolatilityRegime::Spike => notes.push(format!(
            "Volatility spike ({:.2}x average range)",
            v.volatility_ratio
        )),
        VolatilityRegime::Elevated => notes.push("Volatility elevated".to_string()),
        VolatilityRegime::Calm => notes.push("Volatility unusually quiet".to_string()),
        VolatilityRegime::Normal => {}
    }

    match pattern {
        PatternFit::Fits(PatternLabel::None) => {}
        PatternFit::Fits(label) => notes.push(format!("Pattern: {}", label.to_label())),
        PatternFit::Opposing(label) => {
            notes.push(format!("Pattern {} points against the trend", label.to_label()))
        }
    }

    notes.push(format!("Session: {}", session.label()));
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn scenario_values() -> IndicatorValues {
        IndicatorValues {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
            close: 99.8,
            rsi: 28.0,
            ema_fast: 100.2,
            ema_slow: 100.0,
            macd_line: 0.05,
            macd_signal: 0.02,
            macd_histogram: 0.03,
            bb_upper: 101.0,
            bb_middle: 100.0,
            bb_lower: 99.0,
            volatility_ratio: 1.0,
            pattern: PatternLabel::Hammer,
            pattern_bias: TrendDirection::Bullish,
            trend: TrendDirection::Bullish,
            ema_crossover: Crossover::None,
        }
    }

    #[test]
    fn test_pullback_scenario_is_high_quality() {
        let scorer = StrategyScorer::default();
        let score = scorer.score(&scenario_values(), MarketSession::London, 0.0);

        assert_eq!(score.trend_component, 85.0);
        assert_eq!(score.momentum_component, 75.0);
        assert_eq!(score.volatility_component, 70.0);
        assert_eq!(score.pattern_component, 80.0);
        assert_eq!(score.session_component, 100.0);
        assert_eq!(score.psychology_penalty, 0.0);
        assert_relative_eq!(score.final_score, 68.75 / 0.85, epsilon = 1e-9);
        assert_eq!(score.grade, Grade::HighQuality);
        assert_eq!(score.trend, TrendDirection::Bullish);
        assert!(score.notes.iter().any(|n| n.contains("pullback")));
    }

    #[test]
    fn test_penalty_lowers_score() {
        let scorer = StrategyScorer::default();
        let clean = scorer.score(&scenario_values(), MarketSession::London, 0.0);
        let trapped = scorer.score(&scenario_values(), MarketSession::London, 60.0);
        assert_relative_eq!(clean.final_score - trapped.final_score, 9.0, epsilon = 1e-9);
        assert_eq!(trapped.psychology_penalty, 60.0);
    }

    #[test]
    fn test_clamping_law() {
        let weights = ScoringWeights::default();
        let levels = [0.0, 25.0, 50.0, 75.0, 100.0];
        for &t in &levels {
            for &m in &levels {
                for &p in &levels {
                    for &penalty in &levels {
                        let c = ComponentScores {
                            trend: t,
                            momentum: m,
                            volatility: 100.0 - t,
                            pattern: p,
                            session: 100.0 - m,
                        };
                        let s = weights.combine(&c, penalty);
                        assert!((0.0..=100.0).contains(&s));
                    }
                }
            }
        }
        let worst = ComponentScores {
            trend: 0.0,
            momentum: 0.0,
            volatility: 0.0,
            pattern: 0.0,
            session: 0.0,
        };
        assert_eq!(weights.combine(&worst, 100.0), 0.0);
    }

    #[test]
    fn test_out_of_range_trap_risk_is_clamped() {
        let scorer = StrategyScorer::default();
        let score = scorer.score(&scenario_values(), MarketSession::London, 250.0);
        assert_eq!(score.psychology_penalty, 100.0);
        assert!(score.final_score >= 0.0);
    }

    #[test]
    fn test_weight_validation() {
        assert!(ScoringWeights::default().validate().is_ok());
        let negative = ScoringWeights {
            trend: -0.1,
            ..ScoringWeights::default()
        };
        assert!(negative.validate().is_err());
        let zero = ScoringWeights {
            trend: 0.0,
            momentum: 0.0,
            volatility: 0.0,
            pattern: 0.0,
            session: 0.0,
            psychology: 0.15,
        };
        assert!(zero.validate().is_err());
        assert!(ScorerConfig::default().validate().is_ok());
    }
}
