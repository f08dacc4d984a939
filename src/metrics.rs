//! Serving metrics and statistics tracking for the credit risk service.

use crate::encoder::ConformReport;
use crate::types::response::PredictionResponse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is discarded
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for the prediction service
pub struct ServingMetrics {
    /// Total requests handled
    pub requests_processed: AtomicU64,
    /// Requests answered with a prediction
    pub predictions_succeeded: AtomicU64,
    /// Successful predictions of class 1
    pub defaults_predicted: AtomicU64,
    /// Categorical values mapped to the unknown code
    pub unknown_categories: AtomicU64,
    /// Schema features filled with the missing value
    pub zero_filled_features: AtomicU64,
    /// Failed requests by error kind
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Default probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServingMetrics {
    pub fn new() -> Self {
        Self {
            requests_processed: AtomicU64::new(0),
            predictions_succeeded: AtomicU64::new(0),
            defaults_predicted: AtomicU64::new(0),
            unknown_categories: AtomicU64::new(0),
            zero_filled_features: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one handled request
    pub fn record_request(
        &self,
        processing_time: Duration,
        response: &PredictionResponse,
        report: Option<&ConformReport>,
    ) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_LATENCY_SAMPLES {
                times.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }

        if let Some(report) = report {
            self.unknown_categories
                .fetch_add(report.unknown_categories.len() as u64, Ordering::Relaxed);
            self.zero_filled_features
                .fetch_add(report.zero_filled.len() as u64, Ordering::Relaxed);
        }

        match response {
            PredictionResponse::Success {
                prediction,
                probability,
            } => {
                self.predictions_succeeded.fetch_add(1, Ordering::Relaxed);
                if *prediction == 1 {
                    self.defaults_predicted.fetch_add(1, Ordering::Relaxed);
                }
                let bucket = (probability[1] * 10.0).clamp(0.0, 9.0) as usize;
                if let Ok(mut buckets) = self.score_buckets.write() {
                    buckets[bucket] += 1;
                }
            }
            PredictionResponse::Failure { kind, .. } => {
                if let Ok(mut by_kind) = self.errors_by_kind.write() {
                    *by_kind.entry(kind.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get default probability distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Get failures by error kind
    pub fn get_errors_by_kind(&self) -> HashMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Share of successful predictions that were class 1
    pub fn predicted_default_rate(&self) -> f64 {
        let ok = self.predictions_succeeded.load(Ordering::Relaxed);
        if ok == 0 {
            return 0.0;
        }
        self.defaults_predicted.load(Ordering::Relaxed) as f64 / ok as f64
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_processed.load(Ordering::Relaxed);
        let succeeded = self.predictions_succeeded.load(Ordering::Relaxed);
        let failed = requests.saturating_sub(succeeded);
        let unknown = self.unknown_categories.load(Ordering::Relaxed);
        let zero_filled = self.zero_filled_features.load(Ordering::Relaxed);

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let errors_by_kind = self.get_errors_by_kind();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            CREDIT RISK SERVICE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Processed:     {:>8}  │  Throughput: {:>6.1} req/s ║",
            requests, throughput
        );
        info!(
            "║ Predictions:            {:>8}  │  Failures: {:>8}       ║",
            succeeded, failed
        );
        info!(
            "║ Predicted Default Rate: {:>7.1}%                              ║",
            self.predicted_default_rate() * 100.0
        );
        info!(
            "║ Unknown Categories:     {:>8}  │  Zero-filled: {:>8}    ║",
            unknown, zero_filled
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        if !errors_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &errors_by_kind {
                info!("║   {:16}: {:>6}                                   ║", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Default Probability Distribution:                            ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_recording() {
        let metrics = ServingMetrics::new();
        let report = ConformReport {
            unknown_categories: vec!["grade".into()],
            zero_filled: vec!["dti".into(), "fico_score".into()],
            ignored_fields: vec![],
        };

        metrics.record_request(
            Duration::from_micros(100),
            &PredictionResponse::from_probability(0.8, 0.5),
            Some(&report),
        );
        metrics.record_request(
            Duration::from_micros(200),
            &PredictionResponse::from_probability(0.2, 0.5),
            None,
        );
        metrics.record_request(
            Duration::from_micros(50),
            &PredictionResponse::failure("malformed_input", "bad"),
            None,
        );

        assert_eq!(metrics.requests_processed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.predictions_succeeded.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.unknown_categories.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.zero_filled_features.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.get_errors_by_kind().get("malformed_input"), Some(&1));
        assert_eq!(metrics.predicted_default_rate(), 0.5);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[8], 1);
        assert_eq!(dist[2], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ServingMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);

        for us in 1..=100 {
            metrics.record_request(
                Duration::from_micros(us),
                &PredictionResponse::from_probability(1.0, 0.5),
                None,
            );
        }
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p99_us, 100);
        assert_eq!(metrics.get_score_distribution()[9], 100);
    }
}
