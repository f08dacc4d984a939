//! Model training, persistence and inference

pub mod artifact;
pub mod booster;
pub mod inference;
pub mod trainer;

pub use artifact::{ArtifactMetadata, TrainedArtifact};
pub use booster::{BoostedTreeModel, GbdtFitter};
pub use inference::{predict_json, predict_one, predict_table, InferenceEngine, PredictionResult};
pub use trainer::{train_artifact, Classifier, Hyperparameters, ModelFitter};
