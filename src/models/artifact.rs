//! Trained artifact persistence
//!
//! An artifact is one JSON document holding the fitted model, the feature
//! schema it was fit on and training metadata. The three are only ever
//! saved and loaded together.

use crate::error::{Result, RiskError};
use crate::models::booster::BoostedTreeModel;
use crate::models::trainer::{Classifier, Hyperparameters};
use crate::schema::FeatureSchema;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// On-disk layout version
pub const FORMAT_VERSION: u32 = 1;

/// Provenance of a trained artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
    pub training_rows: usize,
    pub hyperparameters: Hyperparameters,
}

impl ArtifactMetadata {
    pub fn new(hyperparameters: Hyperparameters, training_rows: usize) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            created_at: Utc::now(),
            format_version: FORMAT_VERSION,
            training_rows,
            hyperparameters,
        }
    }
}

/// A fitted model bound to the schema it was trained on
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedArtifact<M = BoostedTreeModel> {
    metadata: ArtifactMetadata,
    schema: FeatureSchema,
    model: M,
}

impl<M: Classifier> TrainedArtifact<M> {
    /// Pair a model with its schema. Widths must agree.
    pub fn bind(model: M, schema: FeatureSchema, metadata: ArtifactMetadata) -> Result<Self> {
        let artifact = Self {
            metadata,
            schema,
            model,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<()> {
        if self.metadata.format_version != FORMAT_VERSION {
            return Err(RiskError::artifact(format!(
                "unsupported format version {} (expected {})",
                self.metadata.format_version, FORMAT_VERSION
            )));
        }
        if self.model.n_features() != self.schema.len() {
            return Err(RiskError::artifact(format!(
                "model expects {} features but schema has {}",
                self.model.n_features(),
                self.schema.len()
            )));
        }
        Ok(())
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }
}

impl<M: Classifier + Serialize> TrainedArtifact<M> {
    /// Write the artifact as JSON. The file is written beside `path` and
    /// renamed into place, so readers never see a partial document.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&staging, path)?;

        info!(
            artifact_id = %self.metadata.artifact_id,
            path = %path.display(),
            features = self.schema.len(),
            "Artifact saved"
        );
        Ok(())
    }
}

impl<M: Classifier + DeserializeOwned> TrainedArtifact<M> {
    /// Read an artifact from disk.
    ///
    /// A missing file, unreadable document, missing schema or width
    /// disagreement between schema and model is an [`RiskError::Artifact`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            RiskError::artifact(format!("cannot open {}: {}", path.display(), e))
        })?;

        let artifact: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            RiskError::artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        artifact.validate()?;

        info!(
            artifact_id = %artifact.metadata.artifact_id,
            path = %path.display(),
            features = artifact.schema.len(),
            categorical = artifact.schema.categorical_count(),
            trained_on = artifact.metadata.training_rows,
            "Artifact loaded"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trainer::tests::StubModel;
    use crate::schema::{CategoryTable, FeatureSpec};

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::numeric("loan_amnt"),
            FeatureSpec::categorical("grade", CategoryTable::from_observed(["A", "B"])),
        ])
        .unwrap()
    }

    fn stub(width: usize) -> StubModel {
        StubModel {
            width,
            column: 0,
            pivot: 0.0,
        }
    }

    #[test]
    fn test_bind_rejects_width_disagreement() {
        let meta = ArtifactMetadata::new(Hyperparameters::default(), 10);
        let err = TrainedArtifact::bind(stub(3), schema(), meta).unwrap_err();
        assert_eq!(err.kind(), "artifact");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("artifact.json");

        let meta = ArtifactMetadata::new(Hyperparameters::default(), 10);
        let artifact = TrainedArtifact::bind(stub(2), schema(), meta).unwrap();
        artifact.save(&path).unwrap();

        let loaded: TrainedArtifact<StubModel> = TrainedArtifact::load(&path).unwrap();
        assert_eq!(loaded.metadata(), artifact.metadata());
        assert_eq!(loaded.schema(), artifact.schema());
        assert_eq!(loaded.model(), artifact.model());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrainedArtifact::<StubModel>::load(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), "artifact");
    }

    #[test]
    fn test_load_without_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");

        let meta = ArtifactMetadata::new(Hyperparameters::default(), 10);
        let doc = serde_json::json!({
            "metadata": meta,
            "model": { "width": 2, "column": 0, "pivot": 0.0 }
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let err = TrainedArtifact::<StubModel>::load(&path).unwrap_err();
        assert_eq!(err.kind(), "artifact");
    }

    #[test]
    fn test_load_with_tampered_width_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");

        let meta = ArtifactMetadata::new(Hyperparameters::default(), 10);
        let artifact = TrainedArtifact::bind(stub(2), schema(), meta).unwrap();
        let mut doc = serde_json::to_value(&artifact).unwrap();
        doc["model"]["width"] = serde_json::json!(5);
        std::fs::write(&path, doc.to_string()).unwrap();

        let err = TrainedArtifact::<StubModel>::load(&path).unwrap_err();
        assert!(err.to_string().contains("schema has 2"));
    }
}
