use std::sync::{Arc, Mutex, RwLock};

use analysis_core::{AnalysisError, ModelState};

use crate::lifecycle::LifecyclePolicy;
use crate::model::ModelArtifact;

/// Holder of the serving artifact.
///
/// Readers take a cloned `Arc` and keep using it for the rest of their
/// computation; `install` replaces the pointer in one write, so a reader sees
/// either the old artifact or the new one, never a mix.
///
/// The registry also remembers the closed-trade count of a fit that has been
/// queued but not installed yet, so closes arriving meanwhile do not queue
/// the same refit again.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ModelArtifact>>>,
    pending: Mutex<Option<usize>>,
    policy: LifecyclePolicy,
}

impl ModelRegistry {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self {
            current: RwLock::new(None),
            pending: Mutex::new(None),
            policy,
        }
    }

    pub fn with_artifact(policy: LifecyclePolicy, artifact: ModelArtifact) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(artifact))),
            pending: Mutex::new(None),
            policy,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn state(&self) -> ModelState {
        self.policy.state_for(self.current().as_deref())
    }

    pub fn sample_size(&self) -> usize {
        self.current().map(|a| a.sample_size).unwrap_or(0)
    }

    /// Closed-trade count of the queued fit, if one is in flight.
    pub fn pending_retrain(&self) -> Option<usize> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a refit is due at `closed_count`, counting a queued fit.
    pub fn retrain_due(&self, closed_count: usize) -> bool {
        let pending = self.pending_retrain();
        self.policy
            .should_retrain(self.current().as_deref(), pending, closed_count)
    }

    /// Check and reserve a refit at `closed_count` in one step. Returns
    /// `false` when none is due; a `true` must be paired with
    /// [`ModelRegistry::release_retrain`] once the fit finishes.
    pub fn claim_retrain(&self, closed_count: usize) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let due = self
            .policy
            .should_retrain(self.current().as_deref(), *pending, closed_count);
        if due {
            *pending = Some(closed_count);
        }
        due
    }

    /// Drop the reservation made at `closed_count`. A newer claim stays.
    pub fn release_retrain(&self, closed_count: usize) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if *pending == Some(closed_count) {
            *pending = None;
        }
    }

    /// Swap in a freshly fitted artifact and return the new lifecycle state.
    ///
    /// An artifact trained on fewer samples than the serving one is rejected
    /// so the sample count never goes backwards.
    pub fn install(&self, mut artifact: ModelArtifact) -> Result<ModelState, AnalysisError> {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = slot.as_deref();
        let previous_state = self.policy.state_for(previous);

        if let Some(prev) = previous {
            if artifact.sample_size < prev.sample_size {
                tracing::warn!(
                    serving = prev.sample_size,
                    offered = artifact.sample_size,
                    "rejected model install with fewer samples"
                );
                return Err(AnalysisError::RetrainFailure(format!(
                    "artifact fit on {} samples would replace one fit on {}",
                    artifact.sample_size, prev.sample_size
                )));
            }
        }

        artifact.activation_sample = previous
            .and_then(|p| p.activation_sample)
            .or_else(|| {
                (artifact.sample_size >= self.policy.activation_threshold)
                    .then_some(artifact.sample_size)
            });

        let new_state = self.policy.state_for(Some(&artifact));
        let sample_size = artifact.sample_size;
        *slot = Some(Arc::new(artifact));
        drop(slot);

        if new_state != previous_state {
            tracing::info!(%previous_state, %new_state, sample_size, "model lifecycle transition");
        } else {
            tracing::info!(state = %new_state, sample_size, "model artifact replaced");
        }

        Ok(new_state)
    }
}
