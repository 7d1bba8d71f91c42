pub mod behaviour;
pub mod detector;
pub mod models;

pub use behaviour::{
    BehaviourAnalyzer, BehaviourAssessment, BehaviourThresholds, DisciplineGrade,
    DisciplineScore, HourlyPerformance, LossRecovery,
};
pub use detector::{signal_votes, TrapAssessor};
pub use models::*;
