//! Error taxonomy shared by the encoding, training and serving paths.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors raised by the credit risk core.
///
/// Unknown categorical values are deliberately absent from this list: they
/// degrade to the out-of-vocabulary code and are only logged.
#[derive(Error, Debug)]
pub enum RiskError {
    /// Raw input could not be interpreted as a table or record.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Encoded width disagrees with the feature schema.
    #[error("schema mismatch: expected {expected} feature columns, found {found}")]
    SchemaMismatch { expected: usize, found: usize },

    /// Invalid split or hyperparameter values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Trained artifact is missing, unreadable or internally inconsistent.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// The boosted-tree routine failed or produced unusable output.
    #[error("model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RiskError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    /// Stable machine-readable kind, used in error payloads and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::MalformedInput(_) => "malformed_input",
            RiskError::SchemaMismatch { .. } => "schema_mismatch",
            RiskError::Config(_) => "config",
            RiskError::Artifact(_) => "artifact",
            RiskError::Model(_) => "model",
            RiskError::Io(_) => "io",
            RiskError::Csv(_) => "malformed_input",
            RiskError::Json(_) => "malformed_input",
        }
    }
}
