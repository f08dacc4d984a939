//! Inference response payloads returned across the serving boundary

use crate::error::RiskError;
use serde::{Deserialize, Serialize};

/// Response to a single prediction request.
///
/// Serialized untagged, so the wire shape is either
/// `{"prediction": 1, "probability": [0.3, 0.7]}` or
/// `{"error": "...", "kind": "malformed_input"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success {
        /// Predicted class (1 = default)
        prediction: u8,
        /// Class probabilities `[p(no default), p(default)]`
        probability: [f64; 2],
    },
    Failure {
        /// Human readable message
        error: String,
        /// Stable error kind
        kind: String,
    },
}

impl PredictionResponse {
    /// Build a success payload from the default probability.
    pub fn from_probability(p_default: f64, threshold: f64) -> Self {
        let p = p_default.clamp(0.0, 1.0);
        PredictionResponse::Success {
            prediction: u8::from(p >= threshold),
            probability: [1.0 - p, p],
        }
    }

    pub fn failure(kind: &str, error: impl Into<String>) -> Self {
        PredictionResponse::Failure {
            error: error.into(),
            kind: kind.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResponse::Success { .. })
    }

    /// Default probability for successful responses.
    pub fn default_probability(&self) -> Option<f64> {
        match self {
            PredictionResponse::Success { probability, .. } => Some(probability[1]),
            PredictionResponse::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        match self {
            PredictionResponse::Success { .. } => None,
            PredictionResponse::Failure { kind, .. } => Some(kind),
        }
    }
}

impl From<RiskError> for PredictionResponse {
    fn from(err: RiskError) -> Self {
        PredictionResponse::failure(err.kind(), err.to_string())
    }
}
