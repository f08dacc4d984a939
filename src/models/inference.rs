//! Serving-time inference: conform raw requests to the trained schema and
//! score them.

use crate::encoder::{conform, conform_record, ConformReport, FeatureMatrix};
use crate::error::{Result, RiskError};
use crate::models::artifact::TrainedArtifact;
use crate::models::booster::BoostedTreeModel;
use crate::models::trainer::Classifier;
use crate::types::record::{RawRecord, RawTable};
use crate::types::response::PredictionResponse;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default-class decision threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Outcome of scoring one request
#[derive(Debug, Clone)]
pub struct PredictionResult {
    /// Payload returned to the caller
    pub response: PredictionResponse,
    /// What conforming had to do; `None` when the request never conformed
    pub report: Option<ConformReport>,
}

/// Run the model over a conformed matrix, turning panics into model errors.
fn score<M: Classifier>(model: &M, features: &FeatureMatrix) -> Result<Vec<f64>> {
    match catch_unwind(AssertUnwindSafe(|| model.predict_proba(features))) {
        Ok(scores) => scores,
        Err(_) => Err(RiskError::Model("model panicked during prediction".to_string())),
    }
}

fn score_record<M: Classifier>(
    record: &RawRecord,
    artifact: &TrainedArtifact<M>,
    threshold: f64,
) -> PredictionResult {
    let conformed = match conform_record(record, artifact.schema()) {
        Ok(conformed) => conformed,
        Err(e) => {
            debug!(error = %e, "Request could not be conformed");
            return PredictionResult {
                response: e.into(),
                report: None,
            };
        }
    };

    if !conformed.report.unknown_categories.is_empty() {
        warn!(
            features = ?conformed.report.unknown_categories,
            "Unseen categories mapped to the unknown code"
        );
    }
    if !conformed.report.ignored_fields.is_empty() {
        debug!(fields = ?conformed.report.ignored_fields, "Ignoring fields outside the schema");
    }

    let response = FeatureMatrix::from_rows(vec![conformed.values])
        .and_then(|row| score(artifact.model(), &row))
        .and_then(|scores| {
            scores
                .first()
                .copied()
                .ok_or_else(|| RiskError::Model("model returned no score".to_string()))
        })
        .map(|p| PredictionResponse::from_probability(p, threshold))
        .unwrap_or_else(PredictionResponse::from);

    PredictionResult {
        response,
        report: Some(conformed.report),
    }
}

/// Score one raw record against a trained artifact.
///
/// Never fails: any conform, width or model error comes back as an error
/// payload.
pub fn predict_one<M: Classifier>(
    record: &RawRecord,
    artifact: &TrainedArtifact<M>,
) -> PredictionResponse {
    score_record(record, artifact, DEFAULT_THRESHOLD).response
}

/// Score an arbitrary JSON request body.
pub fn predict_json<M: Classifier>(
    body: &Value,
    artifact: &TrainedArtifact<M>,
) -> PredictionResponse {
    match RawRecord::from_json(body) {
        Ok(record) => predict_one(&record, artifact),
        Err(e) => e.into(),
    }
}

/// Conform a whole table and return the default probability per row.
pub fn predict_table<M: Classifier>(
    table: &RawTable,
    artifact: &TrainedArtifact<M>,
) -> Result<Vec<f64>> {
    let features = conform(table, artifact.schema())?;
    score(artifact.model(), &features)
}

/// Shared inference entry point for the serving loop
pub struct InferenceEngine<M = BoostedTreeModel> {
    artifact: Arc<TrainedArtifact<M>>,
    threshold: f64,
}

impl<M> Clone for InferenceEngine<M> {
    fn clone(&self) -> Self {
        Self {
            artifact: Arc::clone(&self.artifact),
            threshold: self.threshold,
        }
    }
}

impl<M: Classifier> InferenceEngine<M> {
    pub fn new(artifact: TrainedArtifact<M>) -> Self {
        Self {
            artifact: Arc::new(artifact),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Override the decision threshold; it must lie in `[0, 1]`.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RiskError::config(format!(
                "decision threshold must lie in [0, 1], got {}",
                threshold
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn artifact(&self) -> &TrainedArtifact<M> {
        &self.artifact
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score a parsed record.
    pub fn predict(&self, record: &RawRecord) -> PredictionResult {
        score_record(record, &self.artifact, self.threshold)
    }

    /// Score a raw request payload.
    pub fn predict_payload(&self, payload: &[u8]) -> PredictionResult {
        match RawRecord::from_slice(payload) {
            Ok(record) => self.predict(&record),
            Err(e) => PredictionResult {
                response: e.into(),
                report: None,
            },
        }
    }

    /// Score a batch of records.
    pub fn predict_batch(&self, records: &[RawRecord]) -> Vec<PredictionResult> {
        records.iter().map(|r| self.predict(r)).collect()
    }
}
