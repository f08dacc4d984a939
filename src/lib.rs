//! Credit Risk Pipeline Library
//!
//! Loan-default scoring built around one contract: a feature schema derived
//! once from accepted-loan history, bound to the boosted-tree model fit on
//! it, and applied unchanged to every later record, whether from the
//! rejected-application source or a live prediction request.

pub mod config;
pub mod consumer;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod schema;
pub mod split;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use encoder::{conform, conform_record, Encoder, FeatureMatrix};
pub use error::{Result, RiskError};
pub use evaluation::{evaluate, EvaluationReport};
pub use models::{predict_one, GbdtFitter, InferenceEngine, TrainedArtifact};
pub use producer::ResponsePublisher;
pub use schema::FeatureSchema;
pub use types::{PredictionResponse, RawRecord, RawTable, RawValue};
