//! Credit Risk Pipeline - Prediction Service
//!
//! Answers NATS prediction requests with default probabilities from the
//! trained artifact. Requests are scored concurrently, bounded by the
//! configured worker count.

use anyhow::{Context, Result};
use credit_risk_pipeline::{
    config::AppConfig,
    consumer::RequestConsumer,
    logging::init_tracing,
    metrics::{MetricsReporter, ServingMetrics},
    models::{InferenceEngine, TrainedArtifact},
    producer::ResponsePublisher,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging, env!("CARGO_BIN_NAME"))?;

    info!("Starting Credit Risk Prediction Service");

    // A missing or inconsistent artifact is fatal
    let artifact: TrainedArtifact = TrainedArtifact::load(&config.model.artifact_path).with_context(|| {
        format!(
            "Failed to load artifact from {}",
            config.model.artifact_path.display()
        )
    })?;
    info!(
        artifact_id = %artifact.metadata().artifact_id,
        features = artifact.schema().len(),
        categorical = artifact.schema().categorical_count(),
        "Artifact ready"
    );

    let engine = InferenceEngine::new(artifact).with_threshold(config.evaluation.threshold)?;
    let metrics = Arc::new(ServingMetrics::new());

    let client = async_nats::connect(&config.serving.nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.serving.nats_url))?;
    info!("Connected to NATS at {}", config.serving.nats_url);

    let consumer = RequestConsumer::new(client.clone(), &config.serving.request_subject)
        .with_queue_group(&config.serving.queue_group);
    let publisher = ResponsePublisher::new(client.clone());

    let num_workers = config.serving.workers;
    info!(
        workers = num_workers,
        subject = %config.serving.request_subject,
        threshold = engine.threshold(),
        "Starting request processing loop"
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));

    let reporter = MetricsReporter::new(metrics.clone(), config.serving.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let engine = engine.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let result = engine.predict_payload(&message.payload);
            metrics.record_request(start_time.elapsed(), &result.response, result.report.as_ref());

            match result.response.error_kind() {
                Some(kind) => debug!(kind = kind, "Request answered with error payload"),
                None => debug!(
                    probability = ?result.response.default_probability(),
                    processing_time_us = start_time.elapsed().as_micros() as u64,
                    "Request scored"
                ),
            }

            match message.reply {
                Some(reply_to) => {
                    if let Err(e) = publisher.reply(reply_to, &result.response).await {
                        error!(error = %e, "Failed to publish prediction response");
                    }
                }
                None => warn!(subject = %message.subject, "Request without reply subject dropped"),
            }

            drop(permit);
        });
    }

    info!("Subscription closed, shutting down");
    metrics.print_summary();

    Ok(())
}
