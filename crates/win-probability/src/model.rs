//! Logistic regression with feature standardisation.
//!
//! Fitting is plain mini-batch gradient descent on the L2-regularised log
//! loss. All randomness (holdout split and batch order) comes from a seeded
//! `StdRng`, so identical data and parameters give identical weights.

use std::path::Path;

use analysis_core::{stats, AnalysisError};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::features::{FEATURE_COUNT, FEATURE_NAMES};

/// Gradient descent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// L2 penalty on the weights (bias is not penalised)
    pub l2: f64,
    /// Share of samples held out for metrics
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 200,
            batch_size: 16,
            l2: 0.01,
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.learning_rate > 0.0) || self.epochs == 0 || self.batch_size == 0 {
            return Err(AnalysisError::InvalidConfig(
                "learning_rate, epochs and batch_size must be positive".to_string(),
            ));
        }
        if self.l2 < 0.0 || !(0.0..0.5).contains(&self.holdout_fraction) {
            return Err(AnalysisError::InvalidConfig(
                "l2 must be >= 0 and holdout_fraction in [0, 0.5)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-feature mean and scale learned on the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Zero-variance columns get scale 1 so they pass through centred.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);

        for j in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            let sd = stats::population_std_dev(&column);
            mean.push(stats::mean(&column));
            scale.push(if sd < 1e-12 { 1.0 } else { sd });
        }

        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    /// Probability of a win for an already-scaled row.
    pub fn predict_scaled(&self, row: &[f64]) -> f64 {
        let z = self.bias + self.weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>();
        sigmoid(z)
    }

    fn fit(
        rows: &[Vec<f64>],
        labels: &[f64],
        params: &TrainingParams,
        rng: &mut StdRng,
    ) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut model = Self {
            weights: vec![0.0; width],
            bias: 0.0,
        };
        let mut order: Vec<usize> = (0..rows.len()).collect();

        for _ in 0..params.epochs {
            order.shuffle(rng);
            for batch in order.chunks(params.batch_size) {
                let mut grad_w = vec![0.0; width];
                let mut grad_b = 0.0;

                for &i in batch {
                    let error = model.predict_scaled(&rows[i]) - labels[i];
                    for (g, x) in grad_w.iter_mut().zip(&rows[i]) {
                        *g += error * x;
                    }
                    grad_b += error;
                }

                let n = batch.len() as f64;
                for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                    *w -= params.learning_rate * (g / n + params.l2 * *w);
                }
                model.bias -= params.learning_rate * grad_b / n;
            }
        }

        model
    }
}

/// Holdout quality of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean squared error of the predicted probabilities
    pub brier_score: f64,
    pub train_samples: usize,
    pub holdout_samples: usize,
}

impl ModelMetrics {
    fn evaluate(predictions: &[(f64, bool)], train_samples: usize) -> Self {
        let n = predictions.len().max(1) as f64;
        let (mut tp, mut fp, mut tn, mut fn_) = (0.0, 0.0, 0.0, 0.0);
        let mut brier = 0.0;

        for &(p, won) in predictions {
            let predicted_win = p >= 0.5;
            match (predicted_win, won) {
                (true, true) => tp += 1.0,
                (true, false) => fp += 1.0,
                (false, false) => tn += 1.0,
                (false, true) => fn_ += 1.0,
            }
            let y = if won { 1.0 } else { 0.0 };
            brier += (p - y).powi(2);
        }

        let precision = stats::safe_ratio(tp, tp + fp, 0.0);
        let recall = stats::safe_ratio(tp, tp + fn_, 0.0);
        Self {
            accuracy: (tp + tn) / n,
            precision,
            recall,
            f1: stats::safe_ratio(2.0 * precision * recall, precision + recall, 0.0),
            brier_score: brier / n,
            train_samples,
            holdout_samples: predictions.len(),
        }
    }
}

/// Trained classifier plus everything needed to serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub scaler: StandardScaler,
    pub model: LogisticModel,
    /// Closed trades the fit used.
    pub sample_size: usize,
    /// Sample size of the first fit at or above the activation threshold.
    #[serde(default)]
    pub activation_sample: Option<usize>,
    /// Closed trades in the history when the fit was queued. Can exceed
    /// `sample_size` when some records could not be encoded.
    #[serde(default)]
    pub closed_trades: Option<usize>,
    pub metrics: ModelMetrics,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Fit on `(features, won)` samples. Fails with `RetrainFailure` on too few
    /// samples, a single outcome class, or malformed rows.
    pub fn fit(
        samples: &[(Vec<f64>, bool)],
        params: &TrainingParams,
        min_samples: usize,
    ) -> Result<Self, AnalysisError> {
        if samples.len() < min_samples.max(2) {
            return Err(AnalysisError::RetrainFailure(format!(
                "need at least {} closed trades, have {}",
                min_samples.max(2),
                samples.len()
            )));
        }
        if let Some((i, _)) = samples
            .iter()
            .enumerate()
            .find(|(_, (row, _))| row.len() != FEATURE_COUNT || row.iter().any(|v| !v.is_finite()))
        {
            return Err(AnalysisError::RetrainFailure(format!("sample {i} is malformed")));
        }
        let wins = samples.iter().filter(|(_, won)| *won).count();
        if wins == 0 || wins == samples.len() {
            return Err(AnalysisError::RetrainFailure(
                "training data holds a single outcome class".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.shuffle(&mut rng);

        let holdout_len = (samples.len() as f64 * params.holdout_fraction).round() as usize;
        let (holdout_idx, train_idx) = order.split_at(holdout_len);

        let train_raw: Vec<Vec<f64>> = train_idx.iter().map(|&i| samples[i].0.clone()).collect();
        let scaler = StandardScaler::fit(&train_raw);
        let train_rows: Vec<Vec<f64>> = train_raw.iter().map(|r| scaler.transform(r)).collect();
        let labels: Vec<f64> = train_idx
            .iter()
            .map(|&i| if samples[i].1 { 1.0 } else { 0.0 })
            .collect();

        let model = LogisticModel::fit(&train_rows, &labels, params, &mut rng);

        // With no holdout, report training fit.
        let eval_idx = if holdout_idx.is_empty() { train_idx } else { holdout_idx };
        let predictions: Vec<(f64, bool)> = eval_idx
            .iter()
            .map(|&i| {
                let p = model.predict_scaled(&scaler.transform(&samples[i].0));
                (p, samples[i].1)
            })
            .collect();
        let metrics = ModelMetrics::evaluate(&predictions, train_idx.len());

        Ok(Self {
            scaler,
            model,
            sample_size: samples.len(),
            activation_sample: None,
            closed_trades: None,
            metrics,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
        })
    }

    /// Closed-trade count the next retrain is measured from.
    pub fn retrain_baseline(&self) -> usize {
        self.closed_trades.unwrap_or(self.sample_size).max(self.sample_size)
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, AnalysisError> {
        if features.len() != self.model.weights.len() {
            return Err(AnalysisError::InvalidData(format!(
                "expected {} features, got {}",
                self.model.weights.len(),
                features.len()
            )));
        }
        Ok(self.model.predict_scaled(&self.scaler.transform(features)))
    }

    /// Absolute standardised weights normalised to sum to 1, largest first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let total: f64 = self.model.weights.iter().map(|w| w.abs()).sum();
        let mut out: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .zip(&self.model.weights)
            .map(|(name, w)| (name.clone(), stats::safe_ratio(w.abs(), total, 0.0)))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model artifact to {}", path.display()))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact from {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&json).context("Malformed model artifact")?;
        if artifact.model.weights.len() != artifact.scaler.mean.len() {
            anyhow::bail!("Model artifact weights and scaler disagree in width");
        }
        Ok(artifact)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic separable-ish data: feature 0 drives the outcome.
    pub(crate) fn synthetic_samples(n: usize) -> Vec<(Vec<f64>, bool)> {
        (0..n)
            .map(|i| {
                let x = ((i * 37) % 101) as f64 / 100.0;
                let noise = ((i * 53) % 17) as f64 / 170.0;
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = x;
                row[5] = 1.0 + noise;
                row[13] = 0.5;
                let won = x + noise > 0.55;
                (row, won)
            })
            .collect()
    }

    #[test]
    fn test_sigmoid_stable() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn test_scaler_zero_variance() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows);
        assert_eq!(scaler.scale[1], 1.0);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn test_fit_learns_signal() {
        let samples = synthetic_samples(200);
        let artifact = ModelArtifact::fit(&samples, &TrainingParams::default(), 50).unwrap();

        let mut high = vec![0.0; FEATURE_COUNT];
        high[0] = 0.95;
        high[5] = 1.0;
        high[13] = 0.5;
        let mut low = high.clone();
        low[0] = 0.05;

        let p_high = artifact.predict(&high).unwrap();
        let p_low = artifact.predict(&low).unwrap();
        assert!(p_high > 0.5, "p_high = {p_high}");
        assert!(p_low < 0.5, "p_low = {p_low}");
        assert!(artifact.metrics.accuracy > 0.7);
        assert_eq!(artifact.metrics.holdout_samples, 40);
        assert_eq!(artifact.metrics.train_samples, 160);
        assert_eq!(artifact.feature_importance()[0].0, "rsi");
    }

    #[test]
    fn test_fit_is_deterministic() {
        let samples = synthetic_samples(120);
        let params = TrainingParams::default();
        let a = ModelArtifact::fit(&samples, &params, 50).unwrap();
        let b = ModelArtifact::fit(&samples, &params, 50).unwrap();

        assert_eq!(a.model, b.model);
        assert_eq!(a.scaler, b.scaler);
        for (row, _) in samples.iter().take(20) {
            assert_eq!(a.predict(row).unwrap(), b.predict(row).unwrap());
        }
    }

    #[test]
    fn test_fit_rejects_bad_data() {
        let params = TrainingParams::default();

        let few = synthetic_samples(10);
        assert!(matches!(
            ModelArtifact::fit(&few, &params, 50),
            Err(AnalysisError::RetrainFailure(_))
        ));

        let one_class: Vec<_> = synthetic_samples(60).into_iter().map(|(r, _)| (r, true)).collect();
        assert!(matches!(
            ModelArtifact::fit(&one_class, &params, 50),
            Err(AnalysisError::RetrainFailure(_))
        ));

        let mut malformed = synthetic_samples(60);
        malformed[3].0.pop();
        assert!(ModelArtifact::fit(&malformed, &params, 50).is_err());
    }

    #[test]
    fn test_predict_checks_width() {
        let artifact =
            ModelArtifact::fit(&synthetic_samples(80), &TrainingParams::default(), 50).unwrap();
        assert!(artifact.predict(&[0.1, 0.2]).is_err());
    }

    #[test]
    fn test_metrics() {
        let m = ModelMetrics::evaluate(&[(0.9, true), (0.8, false), (0.2, false), (0.3, true)], 10);
        assert_relative_eq!(m.accuracy, 0.5);
        assert_relative_eq!(m.precision, 0.5);
        assert_relative_eq!(m.recall, 0.5);
        assert_relative_eq!(m.f1, 0.5);
        assert_relative_eq!(m.brier_score, (0.01 + 0.64 + 0.04 + 0.49) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_save_and_load() {
        let artifact =
            ModelArtifact::fit(&synthetic_samples(80), &TrainingParams::default(), 50).unwrap();
        let path = std::env::temp_dir().join(format!("wp-artifact-{}.json", std::process::id()));
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.sample_size, artifact.sample_size);
        let row = &synthetic_samples(1)[0].0;
        assert_relative_eq!(
            loaded.predict(row).unwrap(),
            artifact.predict(row).unwrap(),
            epsilon = 1e-12
        );
    }
}
