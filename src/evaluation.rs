//! Holdout evaluation of a trained artifact.

use crate::encoder::FeatureMatrix;
use crate::error::{Result, RiskError};
use crate::models::artifact::TrainedArtifact;
use crate::models::trainer::Classifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Binary confusion counts, class 1 being "default"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&actual, &guess) in labels.iter().zip(predicted) {
            match (actual, guess) {
                (0, 0) => cm.true_negatives += 1,
                (0, _) => cm.false_positives += 1,
                (_, 0) => cm.false_negatives += 1,
                _ => cm.true_positives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negatives + self.true_positives, self.total())
    }

    /// Precision, recall and support for one class.
    pub fn class_metrics(&self, class: u8) -> ClassMetrics {
        let (tp, fp, fn_) = if class == 1 {
            (self.true_positives, self.false_positives, self.false_negatives)
        } else {
            (self.true_negatives, self.false_negatives, self.false_positives)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            class,
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

/// Undefined ratios report as zero.
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// One operating point on the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Scores at or above this are predicted positive
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

/// ROC points over every distinct score, highest threshold first.
///
/// Empty when either class is absent from `labels`.
pub fn roc_curve(scores: &[f64], labels: &[u8]) -> Vec<RocPoint> {
    let positives = labels.iter().filter(|&&l| l == 1).count() as u64;
    let negatives = labels.len() as u64 - positives;
    if positives == 0 || negatives == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(f64, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut points = Vec::with_capacity(ranked.len() + 1);
    points.push(RocPoint {
        threshold: ranked[0].0 + 1.0,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    });

    let (mut tp, mut fp) = (0u64, 0u64);
    for (i, &(score, label)) in ranked.iter().enumerate() {
        if label == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = ranked.get(i + 1).map_or(true, |next| next.0 != score);
        if last_of_tie {
            points.push(RocPoint {
                threshold: score,
                false_positive_rate: ratio(fp, negatives),
                true_positive_rate: ratio(tp, positives),
            });
        }
    }
    points
}

/// Trapezoidal area under a ROC curve.
pub fn auc(points: &[RocPoint]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    Some(
        points
            .windows(2)
            .map(|w| {
                let dx = w[1].false_positive_rate - w[0].false_positive_rate;
                dx * (w[0].true_positive_rate + w[1].true_positive_rate) / 2.0
            })
            .sum(),
    )
}

/// Holdout evaluation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub artifact_id: Option<Uuid>,
    pub threshold: f64,
    pub n_samples: usize,
    pub accuracy: f64,
    /// `None` when the holdout holds a single class
    pub auc: Option<f64>,
    pub confusion: ConfusionMatrix,
    pub classes: Vec<ClassMetrics>,
    pub roc: Vec<RocPoint>,
}

impl EvaluationReport {
    /// Score-level evaluation, independent of any model.
    pub fn from_scores(scores: &[f64], labels: &[u8], threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RiskError::config(format!(
                "threshold must lie in [0, 1], got {}",
                threshold
            )));
        }
        if scores.len() != labels.len() {
            return Err(RiskError::malformed(format!(
                "{} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        if scores.is_empty() {
            return Err(RiskError::malformed("nothing to evaluate"));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(RiskError::malformed(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }

        let predicted: Vec<u8> = scores.iter().map(|&p| u8::from(p >= threshold)).collect();
        let confusion = ConfusionMatrix::from_predictions(labels, &predicted);
        let roc = roc_curve(scores, labels);

        Ok(Self {
            artifact_id: None,
            threshold,
            n_samples: labels.len(),
            accuracy: confusion.accuracy(),
            auc: auc(&roc),
            classes: vec![confusion.class_metrics(0), confusion.class_metrics(1)],
            confusion,
            roc,
        })
    }

    /// Write the report as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Evaluate `artifact` on a conformed holdout set.
pub fn evaluate<M: Classifier>(
    artifact: &TrainedArtifact<M>,
    features: &FeatureMatrix,
    labels: &[u8],
    threshold: f64,
) -> Result<EvaluationReport> {
    artifact.schema().check_width(features.n_features())?;

    let scores = artifact.model().predict_proba(features)?;
    let mut report = EvaluationReport::from_scores(&scores, labels, threshold)?;
    report.artifact_id = Some(artifact.metadata().artifact_id);

    info!(
        samples = report.n_samples,
        accuracy = report.accuracy,
        auc = ?report.auc,
        "Holdout evaluation complete"
    );
    Ok(report)
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.class, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f)?;

        let total = self.n_samples as u64;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        )?;

        let n = self.classes.len().max(1) as f64;
        let macro_avg = |pick: fn(&ClassMetrics) -> f64| self.classes.iter().map(pick).sum::<f64>() / n;
        let weighted_avg = |pick: fn(&ClassMetrics) -> f64| {
            self.classes
                .iter()
                .map(|c| pick(c) * c.support as f64)
                .sum::<f64>()
                / total.max(1) as f64
        };
        writeln!(
            f,
            "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg",
            macro_avg(|c| c.precision),
            macro_avg(|c| c.recall),
            macro_avg(|c| c.f1),
            total
        )?;
        writeln!(
            f,
            "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "weighted avg",
            weighted_avg(|c| c.precision),
            weighted_avg(|c| c.recall),
            weighted_avg(|c| c.f1),
            total
        )?;

        writeln!(f)?;
        writeln!(
            f,
            "confusion: tn={} fp={} fn={} tp={}",
            self.confusion.true_negatives,
            self.confusion.false_positives,
            self.confusion.false_negatives,
            self.confusion.true_positives
        )?;
        match self.auc {
            Some(auc) => write!(f, "roc auc: {:.4}", auc),
            None => write!(f, "roc auc: undefined (single class)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::ArtifactMetadata;
    use crate::models::trainer::tests::StubModel;
    use crate::models::trainer::Hyperparameters;
    use crate::schema::{FeatureSchema, FeatureSpec};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_known_auc() {
        let labels = [0, 0, 1, 1];
        let scores = [0.1, 0.4, 0.35, 0.8];
        let roc = roc_curve(&scores, &labels);

        assert_eq!(roc.len(), 5);
        assert!(approx(auc(&roc).unwrap(), 0.75));
        assert_eq!(roc.last().map(|p| p.true_positive_rate), Some(1.0));
    }

    #[test]
    fn test_auc_extremes() {
        let labels = [0, 0, 1, 1];
        assert!(approx(auc(&roc_curve(&[0.1, 0.2, 0.8, 0.9], &labels)).unwrap(), 1.0));
        assert!(approx(auc(&roc_curve(&[0.9, 0.8, 0.2, 0.1], &labels)).unwrap(), 0.0));
        assert!(approx(auc(&roc_curve(&[0.5; 4], &labels)).unwrap(), 0.5));
    }

    #[test]
    fn test_single_class_auc_undefined() {
        let roc = roc_curve(&[0.2, 0.7], &[1, 1]);
        assert!(roc.is_empty());
        assert_eq!(auc(&roc), None);
    }

    #[test]
    fn test_confusion_and_class_metrics() {
        let report = EvaluationReport::from_scores(&[0.1, 0.4, 0.35, 0.8], &[0, 0, 1, 1], 0.5)
            .unwrap();

        assert_eq!(
            report.confusion,
            ConfusionMatrix {
                true_negatives: 2,
                false_positives: 0,
                false_negatives: 1,
                true_positives: 1,
            }
        );
        assert!(approx(report.accuracy, 0.75));

        let default_class = &report.classes[1];
        assert!(approx(default_class.precision, 1.0));
        assert!(approx(default_class.recall, 0.5));
        assert!(approx(default_class.f1, 2.0 / 3.0));
        assert_eq!(default_class.support, 2);

        let paid_class = &report.classes[0];
        assert!(approx(paid_class.precision, 2.0 / 3.0));
        assert!(approx(paid_class.recall, 1.0));
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            EvaluationReport::from_scores(&[0.5], &[1], 1.5).unwrap_err().kind(),
            "config"
        );
        assert_eq!(
            EvaluationReport::from_scores(&[0.5], &[1, 0], 0.5).unwrap_err().kind(),
            "malformed_input"
        );
        assert!(EvaluationReport::from_scores(&[], &[], 0.5).is_err());
    }

    #[test]
    fn test_evaluate_checks_width() {
        let schema = FeatureSchema::new(vec![
            FeatureSpec::numeric("a"),
            FeatureSpec::numeric("b"),
        ])
        .unwrap();
        let model = StubModel {
            width: 2,
            column: 0,
            pivot: 0.0,
        };
        let artifact = TrainedArtifact::bind(
            model,
            schema,
            ArtifactMetadata::new(Hyperparameters::default(), 4),
        )
        .unwrap();

        let narrow = FeatureMatrix::from_rows(vec![vec![1.0]]).unwrap();
        let err = evaluate(&artifact, &narrow, &[1], 0.5).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");

        let x = FeatureMatrix::from_rows(vec![vec![-3.0, 0.0], vec![3.0, 0.0]]).unwrap();
        let report = evaluate(&artifact, &x, &[0, 1], 0.5).unwrap();
        assert_eq!(report.artifact_id, Some(artifact.metadata().artifact_id));
        assert!(approx(report.accuracy, 1.0));
    }

    #[test]
    fn test_report_renders_and_saves() {
        let report = EvaluationReport::from_scores(&[0.1, 0.9], &[0, 1], 0.5).unwrap();
        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("roc auc: 1.0000"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("evaluation.json");
        report.save(&path).unwrap();

        let restored: EvaluationReport =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(restored, report);
    }
}
