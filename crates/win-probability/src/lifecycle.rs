use analysis_core::{AnalysisError, ModelState};
use serde::{Deserialize, Serialize};

use crate::model::ModelArtifact;

/// Sample-count thresholds driving the model lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    /// Minimum closed trades for a first fit
    pub learning_threshold: usize,
    /// Fits at or above this sample count are trusted without the low-confidence flag
    pub activation_threshold: usize,
    /// Additional closed trades between retrains
    pub retrain_interval: usize,
    pub mature_threshold: usize,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            learning_threshold: 50,
            activation_threshold: 100,
            retrain_interval: 50,
            mature_threshold: 500,
        }
    }
}

impl LifecyclePolicy {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.retrain_interval == 0 {
            return Err(AnalysisError::InvalidConfig(
                "retrain_interval must be positive".to_string(),
            ));
        }
        if self.learning_threshold < 2 {
            return Err(AnalysisError::InvalidConfig(
                "learning_threshold must be at least 2".to_string(),
            ));
        }
        if self.activation_threshold < self.learning_threshold
            || self.mature_threshold < self.activation_threshold
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "lifecycle thresholds must be ordered: learning {} <= activation {} <= mature {}",
                self.learning_threshold, self.activation_threshold, self.mature_threshold
            )));
        }
        Ok(())
    }

    /// Lifecycle state of the serving artifact.
    pub fn state_for(&self, artifact: Option<&ModelArtifact>) -> ModelState {
        let Some(artifact) = artifact else {
            return ModelState::ColdStart;
        };
        let n = artifact.sample_size;

        if n < self.learning_threshold {
            ModelState::ColdStart
        } else if n < self.activation_threshold {
            ModelState::Learning
        } else if n >= self.mature_threshold {
            ModelState::Mature
        } else {
            let activated_at = artifact.activation_sample.unwrap_or(n);
            if n.saturating_sub(activated_at) >= self.retrain_interval {
                ModelState::Tuning
            } else {
                ModelState::Activated
            }
        }
    }

    /// Whether `closed_count` closed trades warrant a refit over `current`.
    ///
    /// `pending` is the closed-trade count of a fit already queued but not yet
    /// installed; it moves the baseline forward like an installed artifact.
    pub fn should_retrain(
        &self,
        current: Option<&ModelArtifact>,
        pending: Option<usize>,
        closed_count: usize,
    ) -> bool {
        let baseline = current.map(ModelArtifact::retrain_baseline).max(pending);
        match baseline {
            None => closed_count >= self.learning_threshold,
            Some(seen) => closed_count >= seen + self.retrain_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::synthetic_samples;
    use crate::model::TrainingParams;

    fn artifact(sample_size: usize, activation_sample: Option<usize>) -> ModelArtifact {
        let mut a =
            ModelArtifact::fit(&synthetic_samples(60), &TrainingParams::default(), 50).unwrap();
        a.sample_size = sample_size;
        a.activation_sample = activation_sample;
        a
    }

    #[test]
    fn test_states() {
        let p = LifecyclePolicy::default();
        assert_eq!(p.state_for(None), ModelState::ColdStart);
        assert_eq!(p.state_for(Some(&artifact(40, None))), ModelState::ColdStart);
        assert_eq!(p.state_for(Some(&artifact(50, None))), ModelState::Learning);
        assert_eq!(p.state_for(Some(&artifact(99, None))), ModelState::Learning);
        assert_eq!(p.state_for(Some(&artifact(100, Some(100)))), ModelState::Activated);
        assert_eq!(p.state_for(Some(&artifact(149, Some(100)))), ModelState::Activated);
        assert_eq!(p.state_for(Some(&artifact(150, Some(100)))), ModelState::Tuning);
        assert_eq!(p.state_for(Some(&artifact(500, Some(100)))), ModelState::Mature);
    }

    #[test]
    fn test_state_never_regresses() {
        let p = LifecyclePolicy::default();
        let mut last = ModelState::ColdStart;
        for n in (0..700).step_by(10) {
            let activation = (n >= p.activation_threshold).then_some(p.activation_threshold);
            let state = p.state_for(Some(&artifact(n, activation)));
            assert!(state >= last, "{last} -> {state} at {n}");
            last = state;
        }
        assert_eq!(last, ModelState::Mature);
    }

    #[test]
    fn test_retrain_trigger() {
        let p = LifecyclePolicy::default();
        assert!(!p.should_retrain(None, None, 49));
        assert!(p.should_retrain(None, None, 50));

        let a = artifact(80, None);
        assert!(!p.should_retrain(Some(&a), None, 129));
        assert!(p.should_retrain(Some(&a), None, 130));
    }

    #[test]
    fn test_pending_fit_moves_the_baseline() {
        let p = LifecyclePolicy::default();
        assert!(!p.should_retrain(None, Some(50), 51));
        assert!(!p.should_retrain(None, Some(50), 99));
        assert!(p.should_retrain(None, Some(50), 100));

        let a = artifact(50, None);
        assert!(!p.should_retrain(Some(&a), Some(100), 120));
        assert!(p.should_retrain(Some(&a), Some(100), 150));
        // an older pending count never pulls the baseline back
        assert!(!p.should_retrain(Some(&artifact(120, Some(120))), Some(60), 150));
    }

    #[test]
    fn test_skipped_records_do_not_pull_the_trigger_forward() {
        let p = LifecyclePolicy::default();
        let mut a = artifact(57, None);
        a.closed_trades = Some(60);
        assert_eq!(a.retrain_baseline(), 60);
        assert!(!p.should_retrain(Some(&a), None, 107));
        assert!(p.should_retrain(Some(&a), None, 110));
    }

    #[test]
    fn test_validate() {
        assert!(LifecyclePolicy::default().validate().is_ok());
        let zero_interval = LifecyclePolicy {
            retrain_interval: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());
        let inverted = LifecyclePolicy {
            activation_threshold: 40,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
