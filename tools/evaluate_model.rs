//! Evaluation Job
//!
//! Reloads the accepted-loan history, recreates the training split from the
//! configured seed and evaluates the saved artifact on the holdout rows.
//! Rows are conformed to the artifact's own schema rather than re-derived.

use anyhow::{Context, Result};
use credit_risk_pipeline::{
    config::AppConfig,
    dataset::{extract_labels, read_csv},
    encoder::conform,
    evaluation::evaluate,
    logging::init_tracing,
    models::TrainedArtifact,
    split::split,
};
use tracing::info;

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging, env!("CARGO_BIN_NAME"))?;

    let artifact: TrainedArtifact = TrainedArtifact::load(&config.model.artifact_path)
        .with_context(|| {
            format!(
                "Failed to load artifact from {}",
                config.model.artifact_path.display()
            )
        })?;

    let mut table = read_csv(&config.data.accepted_path).context("Failed to read accepted loans")?;
    let labels = extract_labels(&mut table)?;
    let features = conform(&table, artifact.schema())?;

    let split = split(
        &features,
        &labels,
        config.split.holdout_fraction,
        config.split.seed,
    )?;

    let report = evaluate(
        &artifact,
        &split.test_x,
        &split.test_y,
        config.evaluation.threshold,
    )?;

    info!("Classification Report:\n{}", report);
    if let Some(auc) = report.auc {
        info!("AUC-ROC: {:.4}", auc);
    }

    report
        .save(&config.evaluation.report_path)
        .context("Failed to write evaluation report")?;
    info!(
        path = %config.evaluation.report_path.display(),
        roc_points = report.roc.len(),
        "Evaluation report written"
    );
    Ok(())
}
