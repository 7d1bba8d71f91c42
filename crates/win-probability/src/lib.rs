//! Win-probability estimation
//!
//! A standardised, L2-regularised logistic regression over engineered setup
//! features, fit on closed trades. The serving artifact lives in a
//! [`ModelRegistry`] and is swapped whole on retrain; the lifecycle state
//! (cold start through mature) is derived from the artifact on every query.

pub mod estimator;
pub mod features;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod trainer;

pub use estimator::ProbabilityEstimator;
pub use features::{feature_vector, FEATURE_COUNT, FEATURE_NAMES};
pub use lifecycle::LifecyclePolicy;
pub use model::{LogisticModel, ModelArtifact, ModelMetrics, StandardScaler, TrainingParams};
pub use registry::ModelRegistry;
pub use trainer::{RetrainHandle, RetrainReport, RetrainWorker, Trainer};
