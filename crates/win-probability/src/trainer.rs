use std::sync::Arc;

use analysis_core::{AnalysisError, ModelState, TradeOutcome, TradeRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::features::feature_vector;
use crate::lifecycle::LifecyclePolicy;
use crate::model::{ModelArtifact, ModelMetrics, TrainingParams};
use crate::registry::ModelRegistry;

/// Turns closed trades into a fitted artifact.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    params: TrainingParams,
    policy: LifecyclePolicy,
}

impl Trainer {
    pub fn new(params: TrainingParams, policy: LifecyclePolicy) -> Self {
        Self { params, policy }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// `(features, won)` for every closed trade. Open trades and records
    /// whose snapshot cannot be encoded are skipped.
    pub fn build_dataset(records: &[TradeRecord]) -> Vec<(Vec<f64>, bool)> {
        let mut skipped = 0usize;
        let dataset: Vec<_> = records
            .iter()
            .filter(|r| r.outcome != TradeOutcome::Open)
            .filter_map(|r| {
                match feature_vector(&r.indicators, r.score.final_score, Some(r.direction)) {
                    Ok(features) => Some((features, r.outcome == TradeOutcome::Win)),
                    Err(e) => {
                        tracing::debug!(
                            trade_id = r.id,
                            error = %e,
                            "skipping trade in training set"
                        );
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();

        if skipped > 0 {
            tracing::warn!(skipped, kept = dataset.len(), "closed trades skipped for training");
        }
        dataset
    }

    /// Fit on every closed record. The artifact remembers how many closed
    /// trades it saw, including ones the dataset had to skip.
    pub fn train(&self, records: &[TradeRecord]) -> Result<ModelArtifact, AnalysisError> {
        let dataset = Self::build_dataset(records);
        let mut artifact =
            ModelArtifact::fit(&dataset, &self.params, self.policy.learning_threshold)?;
        artifact.closed_trades = Some(records.iter().filter(|r| !r.is_open()).count());
        Ok(artifact)
    }
}

/// Outcome of one successful retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub sample_size: usize,
    pub previous_state: ModelState,
    pub new_state: ModelState,
    pub metrics: ModelMetrics,
}

type RetrainReply = oneshot::Sender<Result<RetrainReport, AnalysisError>>;

struct RetrainJob {
    records: Vec<TradeRecord>,
    /// Reservation taken with `ModelRegistry::claim_retrain`
    claimed: Option<usize>,
    reply: RetrainReply,
}

/// Sender side of the retrain worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RetrainHandle {
    tx: mpsc::Sender<RetrainJob>,
}

impl RetrainHandle {
    /// Queue a refit on `records`; the receiver yields the outcome.
    pub async fn submit(
        &self,
        records: Vec<TradeRecord>,
    ) -> Result<oneshot::Receiver<Result<RetrainReport, AnalysisError>>, AnalysisError> {
        self.enqueue(records, None).await
    }

    /// Like [`RetrainHandle::submit`] for a refit reserved with
    /// `ModelRegistry::claim_retrain(claimed)`. The worker releases the
    /// reservation when the job finishes, whatever the outcome.
    pub async fn submit_claimed(
        &self,
        records: Vec<TradeRecord>,
        claimed: usize,
    ) -> Result<oneshot::Receiver<Result<RetrainReport, AnalysisError>>, AnalysisError> {
        self.enqueue(records, Some(claimed)).await
    }

    async fn enqueue(
        &self,
        records: Vec<TradeRecord>,
        claimed: Option<usize>,
    ) -> Result<oneshot::Receiver<Result<RetrainReport, AnalysisError>>, AnalysisError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RetrainJob {
                records,
                claimed,
                reply,
            })
            .await
            .map_err(|_| AnalysisError::RetrainFailure("retrain worker has stopped".to_string()))?;
        Ok(rx)
    }

    /// Queue a refit and wait for it to finish.
    pub async fn retrain(&self, records: Vec<TradeRecord>) -> Result<RetrainReport, AnalysisError> {
        let rx = self.submit(records).await?;
        rx.await.map_err(|_| {
            AnalysisError::RetrainFailure("retrain worker dropped the request".to_string())
        })?
    }
}

/// Single background task that fits models off the async runtime and swaps
/// them into the registry. Jobs run one at a time in arrival order.
pub struct RetrainWorker;

impl RetrainWorker {
    /// Start the worker on the current tokio runtime. It stops once every
    /// handle has been dropped.
    pub fn spawn(registry: Arc<ModelRegistry>, trainer: Trainer) -> RetrainHandle {
        let (tx, mut rx) = mpsc::channel::<RetrainJob>(8);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = Self::run(&registry, &trainer, job.records).await;
                match &result {
                    Ok(report) => tracing::info!(
                        sample_size = report.sample_size,
                        state = %report.new_state,
                        accuracy = report.metrics.accuracy,
                        brier = report.metrics.brier_score,
                        "model retrained"
                    ),
                    Err(e) => tracing::warn!(error = %e, "retrain failed, keeping previous model"),
                }
                if let Some(claimed) = job.claimed {
                    registry.release_retrain(claimed);
                }
                // Caller may have stopped listening.
                let _ = job.reply.send(result);
            }
            tracing::debug!("retrain worker stopped");
        });

        RetrainHandle { tx }
    }

    async fn run(
        registry: &Arc<ModelRegistry>,
        trainer: &Trainer,
        records: Vec<TradeRecord>,
    ) -> Result<RetrainReport, AnalysisError> {
        let previous_state = registry.state();
        let trainer = trainer.clone();

        let artifact = tokio::task::spawn_blocking(move || trainer.train(&records))
            .await
            .map_err(|e| AnalysisError::RetrainFailure(e.to_string()))??;

        let sample_size = artifact.sample_size;
        let metrics = artifact.metrics.clone();
        let new_state = registry.install(artifact)?;

        Ok(RetrainReport {
            sample_size,
            previous_state,
            new_state,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        Crossover, Grade, IndicatorValues, MarketSession, NewTrade, PatternLabel, StrategyScore,
        TradeDirection, TrendDirection,
    };
    use chrono::{Duration, TimeZone, Utc};

    /// Closed trades whose RSI decides the outcome.
    fn records(n: usize) -> Vec<TradeRecord> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let rsi = ((i * 37) % 101) as f64;
                let opened_at = start + Duration::minutes(i as i64 * 7);
                let values = IndicatorValues {
                    timestamp: opened_at,
                    close: 100.0,
                    rsi,
                    ema_fast: 100.2,
                    ema_slow: 100.0,
                    macd_line: 0.1,
                    macd_signal: 0.05,
                    macd_histogram: 0.05,
                    bb_upper: 101.0,
                    bb_middle: 100.0,
                    bb_lower: 99.0,
                    volatility_ratio: 1.0 + (i % 5) as f64 / 10.0,
                    pattern: PatternLabel::None,
                    pattern_bias: TrendDirection::Neutral,
                    trend: TrendDirection::Bullish,
                    ema_crossover: Crossover::None,
                };
                let score = StrategyScore {
                    trend_component: 75.0,
                    momentum_component: 75.0,
                    volatility_component: 70.0,
                    pattern_component: 50.0,
                    session_component: 90.0,
                    psychology_penalty: 0.0,
                    final_score: 70.0,
                    grade: Grade::Acceptable,
                    session: MarketSession::from_timestamp(opened_at),
                    trend: TrendDirection::Bullish,
                    notes: Vec::new(),
                };
                let mut record = TradeRecord::open(
                    i as i64 + 1,
                    NewTrade {
                        asset: "EURUSD".to_string(),
                        direction: TradeDirection::Call,
                        entry_price: 100.0,
                        opened_at,
                        score,
                        indicators: values,
                        journal: String::new(),
                    },
                );
                let exit = if rsi > 55.0 { 101.0 } else { 99.0 };
                record.close(exit, opened_at + Duration::minutes(5)).unwrap();
                record
            })
            .collect()
    }

    #[test]
    fn test_dataset_skips_open_trades() {
        let mut all = records(10);
        all.push(TradeRecord::open(99, NewTrade {
            asset: "EURUSD".to_string(),
            direction: TradeDirection::Put,
            entry_price: 1.0,
            opened_at: Utc::now(),
            score: all[0].score.clone(),
            indicators: all[0].indicators.clone(),
            journal: String::new(),
        }));
        let dataset = Trainer::build_dataset(&all);
        assert_eq!(dataset.len(), 10);
        let wins = all[..10]
            .iter()
            .filter(|r| r.outcome == TradeOutcome::Win)
            .count();
        assert_eq!(dataset.iter().filter(|(_, won)| *won).count(), wins);
    }

    #[test]
    fn test_retrain_twice_is_identical() {
        let trainer = Trainer::default();
        let data = records(120);
        let a = trainer.train(&data).unwrap();
        let b = trainer.train(&data).unwrap();

        for r in data.iter().take(30) {
            let features =
                feature_vector(&r.indicators, r.score.final_score, Some(r.direction)).unwrap();
            assert_eq!(a.predict(&features).unwrap(), b.predict(&features).unwrap());
        }
    }

    #[tokio::test]
    async fn test_worker_installs_and_reports() {
        let registry = Arc::new(ModelRegistry::new(LifecyclePolicy::default()));
        let handle = RetrainWorker::spawn(registry.clone(), Trainer::default());

        let report = handle.retrain(records(60)).await.unwrap();
        assert_eq!(report.previous_state, ModelState::ColdStart);
        assert_eq!(report.new_state, ModelState::Learning);
        assert_eq!(report.sample_size, 60);
        assert_eq!(registry.state(), ModelState::Learning);

        let report = handle.retrain(records(110)).await.unwrap();
        assert_eq!(report.previous_state, ModelState::Learning);
        assert_eq!(report.new_state, ModelState::Activated);
    }

    #[tokio::test]
    async fn test_worker_failure_keeps_previous_model() {
        let registry = Arc::new(ModelRegistry::new(LifecyclePolicy::default()));
        let handle = RetrainWorker::spawn(registry.clone(), Trainer::default());
        handle.retrain(records(60)).await.unwrap();

        let err = handle.retrain(records(20)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RetrainFailure(_)));
        assert_eq!(registry.sample_size(), 60);

        let rx = handle.submit(records(70)).await.unwrap();
        assert_eq!(rx.await.unwrap().unwrap().sample_size, 70);
    }

    #[tokio::test]
    async fn test_worker_releases_claim_on_success_and_failure() {
        let registry = Arc::new(ModelRegistry::new(LifecyclePolicy::default()));
        let handle = RetrainWorker::spawn(registry.clone(), Trainer::default());

        // too few usable records behind the claim
        assert!(registry.claim_retrain(50));
        let rx = handle.submit_claimed(records(20), 50).await.unwrap();
        assert!(rx.await.unwrap().is_err());
        assert_eq!(registry.pending_retrain(), None);

        assert!(registry.claim_retrain(60));
        let rx = handle.submit_claimed(records(60), 60).await.unwrap();
        let report = rx.await.unwrap().unwrap();
        assert_eq!(report.sample_size, 60);
        assert_eq!(registry.pending_retrain(), None);
        assert_eq!(registry.current().unwrap().closed_trades, Some(60));
        assert!(!registry.retrain_due(109));
        assert!(registry.retrain_due(110));
    }
}
