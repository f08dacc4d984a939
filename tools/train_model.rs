//! Training Job
//!
//! Derives the feature schema from the accepted-loan history, fits the
//! boosted-tree classifier on a seeded split, reports holdout metrics and
//! writes the trained artifact. A configured rejected-application file is
//! reconciled against the new schema and scored.

use anyhow::{Context, Result};
use credit_risk_pipeline::{
    config::AppConfig,
    dataset::{load_accepted, load_for_reconciliation},
    encoder::Encoder,
    evaluation::evaluate,
    logging::init_tracing,
    models::{train_artifact, Classifier, GbdtFitter},
    split::split,
};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging, env!("CARGO_BIN_NAME"))?;

    let start = Instant::now();
    info!(
        accepted = %config.data.accepted_path.display(),
        "Starting training job"
    );

    let dataset = load_accepted(&config.data.accepted_path, &Encoder::accepted())
        .context("Failed to load accepted loans")?;

    let split = split(
        &dataset.features,
        &dataset.labels,
        config.split.holdout_fraction,
        config.split.seed,
    )?;
    info!(
        train_rows = split.train_x.n_rows(),
        test_rows = split.test_x.n_rows(),
        seed = config.split.seed,
        "Holdout split"
    );

    let artifact = train_artifact(
        &GbdtFitter,
        dataset.schema,
        &split.train_x,
        &split.train_y,
        &config.model.hyperparameters,
    )
    .context("Training failed")?;

    let report = evaluate(
        &artifact,
        &split.test_x,
        &split.test_y,
        config.evaluation.threshold,
    )?;
    info!("Test Accuracy: {:.4}", report.accuracy);
    info!("Classification report:\n{}", report);

    artifact
        .save(&config.model.artifact_path)
        .context("Failed to save artifact")?;

    if let Some(rejected_path) = &config.data.rejected_path {
        let rejected = load_for_reconciliation(rejected_path, artifact.schema())
            .context("Failed to reconcile rejected loans")?;
        let scores = artifact.model().predict_proba(&rejected)?;
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        info!(
            rows = rejected.n_rows(),
            features = rejected.n_features(),
            mean_default_probability = format!("{:.4}", mean),
            "Rejected applications scored"
        );
    }

    info!(
        artifact = %config.model.artifact_path.display(),
        elapsed_s = format!("{:.1}", start.elapsed().as_secs_f64()),
        "Training job complete"
    );
    Ok(())
}
