//! Error types for the simulation engines.

use thiserror::Error;

/// Main error type for the portfolio and pairs engines.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient data for {what}: need at least {required} observations, got {available}")]
    InsufficientData {
        what: String,
        required: usize,
        available: usize,
    },

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Estimator unavailable: {0}")]
    MissingEstimator(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    /// Shorthand for an [`EngineError::InsufficientData`] error.
    pub fn insufficient(what: impl Into<String>, required: usize, available: usize) -> Self {
        EngineError::InsufficientData {
            what: what.into(),
            required,
            available,
        }
    }

    /// True for conditions the engines resolve into a zeroed result.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, EngineError::InsufficientData { .. })
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
