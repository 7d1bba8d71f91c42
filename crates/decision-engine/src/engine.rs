use std::sync::Arc;

use analysis_core::{
    AnalysisError, Candle, CandleSource, Decision, IndicatorSnapshot, IndicatorValues, NewTrade,
    ProbabilityEstimate, StrategyScore, Timeframe, TradeActivity, TradeDirection, TradeHistory,
    TradeRecord, TrapAssessment,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strategy_scorer::StrategyScorer;
use technical_analysis::IndicatorEngine;
use tokio::sync::oneshot;
use trap_detector::{BehaviourAnalyzer, BehaviourAssessment, TrapAssessor};
use win_probability::{
    ModelArtifact, ModelRegistry, ProbabilityEstimator, RetrainHandle, RetrainReport,
    RetrainWorker, Trainer,
};

use crate::config::EngineConfig;
use crate::fuser::fuse;

/// Everything produced for one asset in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub asset: String,
    pub snapshot: IndicatorSnapshot,
    pub values: IndicatorValues,
    pub traps: TrapAssessment,
    pub score: StrategyScore,
    pub probability: ProbabilityEstimate,
    pub decision: Decision,
    pub behaviour: BehaviourAssessment,
}

pub type RetrainReceiver = oneshot::Receiver<Result<RetrainReport, AnalysisError>>;

/// A closed trade plus the retrain it triggered, if any.
#[derive(Debug)]
pub struct TradeClosure {
    pub record: TradeRecord,
    pub retrain: Option<RetrainReceiver>,
}

/// Indicator, trap, scoring, probability and fusion stages behind one call.
pub struct SignalEngine {
    config: EngineConfig,
    indicators: IndicatorEngine,
    scorer: StrategyScorer,
    traps: TrapAssessor,
    behaviour: BehaviourAnalyzer,
    estimator: ProbabilityEstimator,
    trainer: Trainer,
    retrain: Option<RetrainHandle>,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let registry = Arc::new(ModelRegistry::new(config.model.lifecycle.clone()));
        Ok(Self::build(config, registry))
    }

    /// Start from a previously fitted artifact.
    pub fn with_artifact(
        config: EngineConfig,
        artifact: ModelArtifact,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        let registry = Arc::new(ModelRegistry::with_artifact(
            config.model.lifecycle.clone(),
            artifact,
        ));
        Ok(Self::build(config, registry))
    }

    fn build(config: EngineConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            indicators: IndicatorEngine::new(config.indicators.clone()),
            scorer: StrategyScorer::new(config.scorer.clone()),
            traps: TrapAssessor::new(config.traps.clone()),
            behaviour: BehaviourAnalyzer::new(config.behaviour.clone()),
            estimator: ProbabilityEstimator::new(registry),
            trainer: Trainer::new(config.model.training.clone(), config.model.lifecycle.clone()),
            retrain: None,
            config,
        }
    }

    /// Spawn the background retrain worker. Must run inside a tokio runtime.
    pub fn with_retrain_worker(mut self) -> Self {
        let handle = RetrainWorker::spawn(self.registry().clone(), self.trainer.clone());
        self.retrain = Some(handle);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.estimator.registry()
    }

    /// Estimate for any snapshot; an incomplete one never gets a probability.
    pub fn probability(
        &self,
        snapshot: &IndicatorSnapshot,
        final_score: f64,
    ) -> ProbabilityEstimate {
        match snapshot.values() {
            Ok(values) => self.estimator.estimate(
                &values,
                final_score,
                TradeDirection::from_trend(values.trend),
            ),
            Err(_) => self.estimator.unavailable(),
        }
    }

    /// Run the full pipeline on `candles` against known trade `activity`.
    ///
    /// Fails with `InsufficientData` for an empty series or one shorter than
    /// the longest indicator lookback.
    pub fn evaluate(
        &self,
        asset: &str,
        candles: Vec<Candle>,
        activity: &[TradeActivity],
    ) -> Result<Analysis, AnalysisError> {
        let snapshot = self.indicators.analyze_candles(candles)?;
        let values = snapshot.values()?;

        let traps = self.traps.assess(&values, activity, values.timestamp);
        let score = self.scorer.score(&values, values.session(), traps.risk_score);
        let probability = self.estimator.estimate(
            &values,
            score.final_score,
            TradeDirection::from_trend(values.trend),
        );
        let mut decision = fuse(&score, &probability, &traps, &self.config.decision);

        // advisory only, the signal itself stays with the fusion rules
        let behaviour = self.behaviour.assess(activity, values.timestamp);
        decision.warnings.extend(behaviour.warnings.iter().cloned());

        tracing::debug!(
            asset,
            signal = decision.signal.to_label(),
            score = score.final_score,
            trap_risk = traps.risk_score,
            pause = behaviour.pause_trading,
            "analysis complete"
        );

        Ok(Analysis {
            asset: asset.to_string(),
            snapshot,
            values,
            traps,
            score,
            probability,
            decision,
            behaviour,
        })
    }

    /// Like [`SignalEngine::evaluate`], reading recent activity from `history`.
    pub async fn analyze(
        &self,
        asset: &str,
        candles: Vec<Candle>,
        history: &dyn TradeHistory,
    ) -> Result<Analysis, AnalysisError> {
        let activity = history.recent_activity(self.config.activity_limit).await?;
        self.evaluate(asset, candles, &activity)
    }

    /// Pull candles from a feed and analyse them. `Ok(None)` when the feed has
    /// nothing for the pair.
    pub async fn fetch_and_analyze(
        &self,
        source: &dyn CandleSource,
        asset: &str,
        timeframe: Timeframe,
        history: &dyn TradeHistory,
    ) -> Result<Option<Analysis>, AnalysisError> {
        let limit = self.config.indicators.full_lookback().max(100);
        let Some(candles) = source.candles(asset, timeframe, limit).await? else {
            tracing::debug!(asset, "price feed returned nothing");
            return Ok(None);
        };
        self.analyze(asset, candles, history).await.map(Some)
    }

    /// Analyse several assets in parallel against the same activity.
    pub fn analyze_batch(
        &self,
        inputs: Vec<(String, Vec<Candle>)>,
        activity: &[TradeActivity],
    ) -> Vec<(String, Result<Analysis, AnalysisError>)> {
        inputs
            .into_par_iter()
            .map(|(asset, candles)| {
                let result = self.evaluate(&asset, candles, activity);
                if let Err(e) = &result {
                    tracing::debug!(asset = %asset, error = %e, "batch analysis skipped asset");
                }
                (asset, result)
            })
            .collect()
    }

    /// Actionable analyses, best score first, at most `limit`.
    pub fn best_opportunities(analyses: &[Analysis], limit: usize) -> Vec<&Analysis> {
        let mut actionable: Vec<&Analysis> = analyses
            .iter()
            .filter(|a| a.decision.signal.is_actionable())
            .collect();
        actionable.sort_by(|a, b| {
            b.decision
                .confidence
                .cmp(&a.decision.confidence)
                .then(b.score.final_score.total_cmp(&a.score.final_score))
        });
        actionable.truncate(limit);
        actionable
    }

    /// Journal a trade taken on an actionable decision.
    pub async fn record_trade(
        &self,
        history: &dyn TradeHistory,
        analysis: &Analysis,
        entry_price: f64,
        opened_at: DateTime<Utc>,
        journal: impl Into<String>,
    ) -> Result<TradeRecord, AnalysisError> {
        let direction = analysis.decision.direction.ok_or_else(|| {
            AnalysisError::TradeState(format!(
                "decision for {} is {}, nothing to trade",
                analysis.asset,
                analysis.decision.signal.to_label()
            ))
        })?;

        let record = history
            .open_trade(NewTrade {
                asset: analysis.asset.clone(),
                direction,
                entry_price,
                opened_at,
                score: analysis.score.clone(),
                indicators: analysis.values.clone(),
                journal: journal.into(),
            })
            .await?;

        tracing::info!(
            trade_id = record.id,
            asset = %record.asset,
            direction = direction.as_str(),
            entry_price,
            "trade recorded"
        );
        Ok(record)
    }

    /// Close a trade and queue a refit when enough new outcomes have accumulated.
    pub async fn close_trade(
        &self,
        history: &dyn TradeHistory,
        id: i64,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeClosure, AnalysisError> {
        let record = history.close_trade(id, exit_price, closed_at).await?;
        tracing::info!(trade_id = id, outcome = record.outcome.as_str(), "trade closed");

        let retrain = self.maybe_retrain(history).await?;
        Ok(TradeClosure { record, retrain })
    }

    /// Submit a refit if the lifecycle policy asks for one and a worker is running.
    ///
    /// At most one refit is queued per retrain interval: the closed count is
    /// reserved on the registry before the job is sent, and closes arriving
    /// while it runs measure from that reservation.
    pub async fn maybe_retrain(
        &self,
        history: &dyn TradeHistory,
    ) -> Result<Option<RetrainReceiver>, AnalysisError> {
        let closed = history.closed_count().await?;
        let registry = self.registry();

        let Some(handle) = &self.retrain else {
            if registry.retrain_due(closed) {
                tracing::debug!(closed, "retrain due but no worker is running");
            }
            return Ok(None);
        };
        if !registry.claim_retrain(closed) {
            return Ok(None);
        }

        let queued = match history.closed_trades().await {
            Ok(records) => {
                tracing::info!(closed, records = records.len(), "retrain queued");
                handle.submit_claimed(records, closed).await
            }
            Err(e) => Err(e),
        };
        if queued.is_err() {
            registry.release_retrain(closed);
        }
        queued.map(Some)
    }
}
