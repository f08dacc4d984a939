//! Configuration management for the credit risk pipeline

use crate::error::RiskError;
use crate::models::trainer::Hyperparameters;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "CREDIT_RISK_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub model: ModelConfig,
    pub evaluation: EvaluationConfig,
    pub serving: ServingConfig,
    pub logging: LoggingConfig,
}

/// Training data locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Accepted-loan CSV with a `loan_status` column
    pub accepted_path: PathBuf,
    /// Rejected-application CSV; reconciliation is skipped when unset
    #[serde(default)]
    pub rejected_path: Option<PathBuf>,
}

/// Holdout split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub holdout_fraction: f64,
    pub seed: u64,
}

/// Model training and artifact location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the trained artifact is written and read
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

/// Holdout evaluation output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// JSON report destination
    pub report_path: PathBuf,
    /// Default-class decision threshold
    pub threshold: f64,
}

/// NATS request/reply front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingConfig {
    /// NATS server URL
    pub nats_url: String,
    /// Subject prediction requests arrive on
    pub request_subject: String,
    /// Queue group shared by service replicas
    pub queue_group: String,
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `CREDIT_RISK_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// Values are layered: built-in defaults, then the TOML file when it
    /// exists, then `CREDIT_RISK__SECTION__KEY` environment variables.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("CREDIT_RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no job can run with
    pub fn validate(&self) -> std::result::Result<(), RiskError> {
        let fraction = self.split.holdout_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(RiskError::config(format!(
                "split.holdout_fraction must lie in (0, 1), got {}",
                fraction
            )));
        }
        self.model.hyperparameters.validate()?;
        if !(0.0..=1.0).contains(&self.evaluation.threshold) {
            return Err(RiskError::config(format!(
                "evaluation.threshold must lie in [0, 1], got {}",
                self.evaluation.threshold
            )));
        }
        if self.serving.workers == 0 {
            return Err(RiskError::config("serving.workers must be positive"));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(RiskError::config(format!(
                "logging.format must be json or pretty, got {}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                accepted_path: PathBuf::from("data/accepted.csv"),
                rejected_path: None,
            },
            split: SplitConfig {
                holdout_fraction: 0.2,
                seed: 42,
            },
            model: ModelConfig {
                artifact_path: PathBuf::from("models/credit_risk.json"),
                hyperparameters: Hyperparameters::default(),
            },
            evaluation: EvaluationConfig {
                report_path: PathBuf::from("reports/evaluation.json"),
                threshold: 0.5,
            },
            serving: ServingConfig {
                nats_url: "nats://localhost:4222".to_string(),
                request_subject: "credit.risk.predict".to_string(),
                queue_group: "credit-risk-workers".to_string(),
                workers: 4,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
