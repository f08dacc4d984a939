//! Binding of fitted models to the feature schema they were trained on.

use crate::encoder::FeatureMatrix;
use crate::error::{Result, RiskError};
use crate::models::artifact::{ArtifactMetadata, TrainedArtifact};
use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Boosted-tree hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Maximum tree depth
    pub max_depth: u32,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Row sample ratio per round
    pub subsample: f64,
    /// Feature sample ratio per round
    pub colsample_bytree: f64,
    /// Minimum rows per leaf
    pub min_leaf_size: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_leaf_size: 1,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(RiskError::config("n_estimators must be positive"));
        }
        if self.max_depth == 0 {
            return Err(RiskError::config("max_depth must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(RiskError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, ratio) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(RiskError::config(format!(
                    "{} must lie in (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if self.min_leaf_size == 0 {
            return Err(RiskError::config("min_leaf_size must be positive"));
        }
        Ok(())
    }
}

/// A fitted binary classifier over encoded rows.
pub trait Classifier {
    /// Probability of default (class 1) for every row.
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Feature width the model was fit on.
    fn n_features(&self) -> usize;
}

/// An off-the-shelf fitting routine.
pub trait ModelFitter {
    type Model: Classifier;

    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[u8],
        params: &Hyperparameters,
    ) -> Result<Self::Model>;
}

/// Fit a model and bind it to `schema`.
///
/// Every integrity check runs before the fitter is called: a feature table
/// whose width disagrees with the schema never reaches the fitting routine.
pub fn train_artifact<F: ModelFitter>(
    fitter: &F,
    schema: FeatureSchema,
    features: &FeatureMatrix,
    labels: &[u8],
    params: &Hyperparameters,
) -> Result<TrainedArtifact<F::Model>> {
    params.validate()?;
    schema.check_width(features.n_features())?;

    if features.is_empty() {
        return Err(RiskError::malformed("no training rows"));
    }
    if labels.len() != features.n_rows() {
        return Err(RiskError::malformed(format!(
            "{} labels for {} training rows",
            labels.len(),
            features.n_rows()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&l| l > 1) {
        return Err(RiskError::malformed(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    let defaults = labels.iter().filter(|&&l| l == 1).count();
    if defaults == 0 || defaults == labels.len() {
        return Err(RiskError::malformed(format!(
            "training labels hold a single class ({} of {} rows defaulted)",
            defaults,
            labels.len()
        )));
    }

    info!(
        rows = features.n_rows(),
        features = features.n_features(),
        n_estimators = params.n_estimators,
        max_depth = params.max_depth,
        learning_rate = params.learning_rate,
        "Fitting boosted-tree classifier"
    );

    let start = Instant::now();
    let model = fitter.fit(features, labels, params)?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Model fitted"
    );

    let metadata = ArtifactMetadata::new(params.clone(), features.n_rows());
    TrainedArtifact::bind(model, schema, metadata)
}
