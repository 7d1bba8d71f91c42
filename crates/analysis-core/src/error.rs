use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Retrain failed: {0}")]
    RetrainFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Trade state error: {0}")]
    TradeState(String),
}

impl AnalysisError {
    /// True for errors that mean "not enough history yet" rather than a fault.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, AnalysisError::InsufficientData(_))
    }
}
