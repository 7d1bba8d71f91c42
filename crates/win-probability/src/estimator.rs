use std::sync::Arc;

use analysis_core::{
    ConfidenceTier, IndicatorValues, ModelState, ProbabilityEstimate, TradeDirection,
};

use crate::features::feature_vector;
use crate::registry::ModelRegistry;

/// Serves win probabilities from the registry's current artifact.
#[derive(Debug, Clone)]
pub struct ProbabilityEstimator {
    registry: Arc<ModelRegistry>,
}

impl ProbabilityEstimator {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Estimate for a complete snapshot scored at `final_score`, traded in
    /// `direction` (`None` when the trend gives no side).
    pub fn estimate(
        &self,
        values: &IndicatorValues,
        final_score: f64,
        direction: Option<TradeDirection>,
    ) -> ProbabilityEstimate {
        // One pointer read; the rest of the call uses this artifact.
        let artifact = self.registry.current();
        let policy = self.registry.policy();
        let state = policy.state_for(artifact.as_deref());
        let sample_size = artifact.as_ref().map(|a| a.sample_size).unwrap_or(0);

        let Some(artifact) = artifact.filter(|_| state.produces_probability()) else {
            return ProbabilityEstimate::cold_start(sample_size);
        };

        let probability = feature_vector(values, final_score, direction)
            .and_then(|features| artifact.predict(&features));

        match probability {
            Ok(p) => {
                let p = p.clamp(0.0, 1.0);
                tracing::debug!(probability = p, state = %state, sample_size, "win probability");
                ProbabilityEstimate {
                    win_probability: Some(p),
                    confidence_tier: ConfidenceTier::from_probability(p),
                    sample_size_used: sample_size,
                    model_state: state,
                    low_confidence: state == ModelState::Learning,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "win probability unavailable for this setup");
                ProbabilityEstimate::cold_start(sample_size)
            }
        }
    }

    /// Estimate for a snapshot whose lookback is not yet satisfied.
    pub fn unavailable(&self) -> ProbabilityEstimate {
        ProbabilityEstimate::cold_start(self.registry.sample_size())
    }
}
