//! Gradient-boosted decision trees backed by the `gbdt` crate

use crate::encoder::FeatureMatrix;
use crate::error::{Result, RiskError};
use crate::models::trainer::{Classifier, Hyperparameters, ModelFitter};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec, ValueType};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loss name understood by `gbdt` for binary log-likelihood.
const LOSS: &str = "LogLikelyhood";

/// Boosted-tree binary classifier
#[derive(Serialize, Deserialize)]
pub struct BoostedTreeModel {
    n_features: usize,
    booster: GBDT,
}

impl fmt::Debug for BoostedTreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoostedTreeModel")
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

fn to_values(row: &[f64]) -> Vec<ValueType> {
    row.iter().map(|&v| v as ValueType).collect()
}

impl Classifier for BoostedTreeModel {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_features() != self.n_features {
            return Err(RiskError::SchemaMismatch {
                expected: self.n_features,
                found: features.n_features(),
            });
        }
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let data: DataVec = features
            .rows()
            .map(|row| Data::new_test_data(to_values(row), None))
            .collect();

        let predictions = self.booster.predict(&data);
        if predictions.len() != features.n_rows() {
            return Err(RiskError::Model(format!(
                "booster returned {} scores for {} rows",
                predictions.len(),
                features.n_rows()
            )));
        }

        predictions
            .into_iter()
            .map(|p| {
                let p = p as f64;
                if p.is_finite() {
                    Ok(p.clamp(0.0, 1.0))
                } else {
                    Err(RiskError::Model(format!("non-finite probability {}", p)))
                }
            })
            .collect()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Fits [`BoostedTreeModel`]s with the `gbdt` training routine.
#[derive(Debug, Clone, Copy, Default)]
pub struct GbdtFitter;

impl GbdtFitter {
    fn config(n_features: usize, params: &Hyperparameters) -> Config {
        let mut cfg = Config::new();
        cfg.set_feature_size(n_features);
        cfg.set_max_depth(params.max_depth);
        cfg.set_iterations(params.n_estimators);
        cfg.set_shrinkage(params.learning_rate as ValueType);
        cfg.set_loss(LOSS);
        cfg.set_data_sample_ratio(params.subsample);
        cfg.set_feature_sample_ratio(params.colsample_bytree);
        cfg.set_min_leaf_size(params.min_leaf_size);
        cfg.set_training_optimization_level(2);
        cfg.set_debug(false);
        cfg
    }
}

impl ModelFitter for GbdtFitter {
    type Model = BoostedTreeModel;

    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[u8],
        params: &Hyperparameters,
    ) -> Result<BoostedTreeModel> {
        if labels.len() != features.n_rows() {
            return Err(RiskError::malformed(format!(
                "{} labels for {} rows",
                labels.len(),
                features.n_rows()
            )));
        }

        // Log-likelihood loss in gbdt expects labels in {-1, 1}.
        let mut data: DataVec = features
            .rows()
            .zip(labels)
            .map(|(row, &label)| {
                let target = if label == 1 { 1.0 } else { -1.0 };
                Data::new_training_data(to_values(row), 1.0, target, None)
            })
            .collect();

        let mut booster = GBDT::new(&Self::config(features.n_features(), params));
        booster.fit(&mut data);

        // Non-finite tree values serialize as null and could never be loaded
        serde_json::to_value(&booster)
            .and_then(serde_json::from_value::<GBDT>)
            .map_err(|e| {
                RiskError::Model(format!("fitted booster cannot be persisted: {}", e))
            })?;

        Ok(BoostedTreeModel {
            n_features: features.n_features(),
            booster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Hyperparameters {
        Hyperparameters {
            n_estimators: 20,
            max_depth: 3,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_leaf_size: 1,
        }
    }

    fn separable(n: usize) -> (FeatureMatrix, Vec<u8>) {
        let rows = (0..n)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let labels = (0..n).map(|i| (i >= n / 2) as u8).collect();
        (FeatureMatrix::from_rows(rows).unwrap(), labels)
    }

    #[test]
    fn test_fit_and_predict_probabilities() {
        let (x, y) = separable(40);
        let model = GbdtFitter.fit(&x, &y, &small_params()).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        assert_eq!(probs.len(), 40);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));

        // Ordering on a cleanly separable column
        assert!(probs[39] > probs[0]);
    }

    #[test]
    fn test_single_class_fit_fails_instead_of_persisting_nulls() {
        let (x, _) = separable(20);
        let labels = vec![0; 20];

        let err = GbdtFitter.fit(&x, &labels, &small_params()).unwrap_err();
        assert_eq!(err.kind(), "model");
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = separable(20);
        let model = GbdtFitter.fit(&x, &y, &small_params()).unwrap();

        let narrow = FeatureMatrix::from_rows(vec![vec![1.0]]).unwrap();
        let err = model.predict_proba(&narrow).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_model_survives_serde() {
        let (x, y) = separable(20);
        let model = GbdtFitter.fit(&x, &y, &small_params()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: BoostedTreeModel = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.n_features(), 2);
        assert_eq!(
            model.predict_proba(&x).unwrap(),
            restored.predict_proba(&x).unwrap()
        );
    }
}
