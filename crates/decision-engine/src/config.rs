use std::env;
use std::str::FromStr;

use analysis_core::AnalysisError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strategy_scorer::ScorerConfig;
use technical_analysis::IndicatorConfig;
use trap_detector::{BehaviourThresholds, TrapThresholds};
use win_probability::{LifecyclePolicy, TrainingParams};

use crate::fuser::DecisionThresholds;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub lifecycle: LifecyclePolicy,
    pub training: TrainingParams,
}

/// Every tunable of the engine. All defaults match the documented constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indicators: IndicatorConfig,
    pub scorer: ScorerConfig,
    pub traps: TrapThresholds,
    pub model: ModelConfig,
    pub decision: DecisionThresholds,
    pub behaviour: BehaviourThresholds,
    /// Trades read from the journal for the behavioural trap rules and the behaviour review
    pub activity_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            scorer: ScorerConfig::default(),
            traps: TrapThresholds::default(),
            model: ModelConfig::default(),
            decision: DecisionThresholds::default(),
            behaviour: BehaviourThresholds::default(),
            activity_limit: 50,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

impl EngineConfig {
    /// Defaults overridden by `MARKETSENSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an arbitrary key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let l = &lookup;

        let spike = parse_or(
            l,
            "MARKETSENSE_VOLATILITY_SPIKE_RATIO",
            d.traps.volatility_spike_ratio,
        )?;

        let config = Self {
            indicators: IndicatorConfig {
                rsi_period: parse_or(l, "MARKETSENSE_RSI_PERIOD", d.indicators.rsi_period)?,
                ema_fast: parse_or(l, "MARKETSENSE_EMA_FAST", d.indicators.ema_fast)?,
                ema_slow: parse_or(l, "MARKETSENSE_EMA_SLOW", d.indicators.ema_slow)?,
                bollinger_period: parse_or(
                    l,
                    "MARKETSENSE_BOLLINGER_PERIOD",
                    d.indicators.bollinger_period,
                )?,
                volatility_period: parse_or(
                    l,
                    "MARKETSENSE_VOLATILITY_PERIOD",
                    d.indicators.volatility_period,
                )?,
                ..d.indicators
            },
            scorer: ScorerConfig {
                weights: strategy_scorer::ScoringWeights {
                    trend: parse_or(l, "MARKETSENSE_WEIGHT_TREND", d.scorer.weights.trend)?,
                    momentum: parse_or(
                        l,
                        "MARKETSENSE_WEIGHT_MOMENTUM",
                        d.scorer.weights.momentum,
                    )?,
                    volatility: parse_or(
                        l,
                        "MARKETSENSE_WEIGHT_VOLATILITY",
                        d.scorer.weights.volatility,
                    )?,
                    pattern: parse_or(l, "MARKETSENSE_WEIGHT_PATTERN", d.scorer.weights.pattern)?,
                    session: parse_or(l, "MARKETSENSE_WEIGHT_SESSION", d.scorer.weights.session)?,
                    psychology: parse_or(
                        l,
                        "MARKETSENSE_WEIGHT_PSYCHOLOGY",
                        d.scorer.weights.psychology,
                    )?,
                },
                volatility_spike_ratio: spike,
                ..d.scorer
            },
            traps: TrapThresholds {
                perfect_setup_alignment: parse_or(
                    l,
                    "MARKETSENSE_PERFECT_SETUP_ALIGNMENT",
                    d.traps.perfect_setup_alignment,
                )?,
                volatility_spike_ratio: spike,
                late_entry_completion: parse_or(
                    l,
                    "MARKETSENSE_LATE_ENTRY_COMPLETION",
                    d.traps.late_entry_completion,
                )?,
                revenge_cooldown_secs: parse_or(
                    l,
                    "MARKETSENSE_REVENGE_COOLDOWN_SECS",
                    d.traps.revenge_cooldown_secs,
                )?,
                overtrading_max_trades: parse_or(
                    l,
                    "MARKETSENSE_OVERTRADING_MAX_TRADES",
                    d.traps.overtrading_max_trades,
                )?,
                overtrading_window_mins: parse_or(
                    l,
                    "MARKETSENSE_OVERTRADING_WINDOW_MINS",
                    d.traps.overtrading_window_mins,
                )?,
                ..d.traps
            },
            model: ModelConfig {
                lifecycle: LifecyclePolicy {
                    learning_threshold: parse_or(
                        l,
                        "MARKETSENSE_LEARNING_THRESHOLD",
                        d.model.lifecycle.learning_threshold,
                    )?,
                    activation_threshold: parse_or(
                        l,
                        "MARKETSENSE_ACTIVATION_THRESHOLD",
                        d.model.lifecycle.activation_threshold,
                    )?,
                    retrain_interval: parse_or(
                        l,
                        "MARKETSENSE_RETRAIN_INTERVAL",
                        d.model.lifecycle.retrain_interval,
                    )?,
                    mature_threshold: parse_or(
                        l,
                        "MARKETSENSE_MATURE_THRESHOLD",
                        d.model.lifecycle.mature_threshold,
                    )?,
                },
                training: TrainingParams {
                    learning_rate: parse_or(
                        l,
                        "MARKETSENSE_LEARNING_RATE",
                        d.model.training.learning_rate,
                    )?,
                    epochs: parse_or(l, "MARKETSENSE_EPOCHS", d.model.training.epochs)?,
                    l2: parse_or(l, "MARKETSENSE_L2", d.model.training.l2)?,
                    seed: parse_or(l, "MARKETSENSE_MODEL_SEED", d.model.training.seed)?,
                    ..d.model.training
                },
            },
            decision: DecisionThresholds {
                trap_veto: parse_or(l, "MARKETSENSE_TRAP_VETO", d.decision.trap_veto)?,
                strong_score: parse_or(l, "MARKETSENSE_STRONG_SCORE", d.decision.strong_score)?,
                strong_probability: parse_or(
                    l,
                    "MARKETSENSE_STRONG_PROBABILITY",
                    d.decision.strong_probability,
                )?,
                strong_trap: parse_or(l, "MARKETSENSE_STRONG_TRAP", d.decision.strong_trap)?,
                marginal_score: parse_or(
                    l,
                    "MARKETSENSE_MARGINAL_SCORE",
                    d.decision.marginal_score,
                )?,
                marginal_probability: parse_or(
                    l,
                    "MARKETSENSE_MARGINAL_PROBABILITY",
                    d.decision.marginal_probability,
                )?,
                marginal_trap: parse_or(l, "MARKETSENSE_MARGINAL_TRAP", d.decision.marginal_trap)?,
            },
            behaviour: BehaviourThresholds {
                max_daily_trades: parse_or(
                    l,
                    "MARKETSENSE_MAX_DAILY_TRADES",
                    d.behaviour.max_daily_trades,
                )?,
                max_consecutive_losses: parse_or(
                    l,
                    "MARKETSENSE_MAX_CONSECUTIVE_LOSSES",
                    d.behaviour.max_consecutive_losses,
                )?,
                ..d.behaviour
            },
            activity_limit: parse_or(l, "MARKETSENSE_ACTIVITY_LIMIT", d.activity_limit)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.indicators.validate()?;
        self.scorer.validate()?;
        self.traps.validate()?;
        self.model.lifecycle.validate()?;
        self.model.training.validate()?;
        self.decision.validate()?;
        self.behaviour.validate()?;
        if self.activity_limit == 0 {
            return Err(AnalysisError::InvalidConfig(
                "activity_limit must be positive".to_string(),
            ));
        }
        if self.activity_limit <= self.traps.overtrading_max_trades {
            return Err(AnalysisError::InvalidConfig(format!(
                "activity_limit {} cannot reveal overtrading above {} trades",
                self.activity_limit, self.traps.overtrading_max_trades
            )));
        }
        if self.activity_limit < self.behaviour.max_daily_trades {
            return Err(AnalysisError::InvalidConfig(format!(
                "activity_limit {} cannot reveal a daily limit of {} trades",
                self.activity_limit, self.behaviour.max_daily_trades
            )));
        }
        Ok(())
    }
}
