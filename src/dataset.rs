//! Loading of accepted-loan and rejected-loan CSV sources.
//!
//! The accepted source is the only origin of the feature schema. The
//! rejected source has its own header vocabulary; it is renamed onto the
//! accepted vocabulary and then conformed, never used to derive anything.

use crate::encoder::{self, Encoder, FeatureMatrix};
use crate::error::{Result, RiskError};
use crate::schema::FeatureSchema;
use crate::types::record::{RawTable, RawValue};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Status column of the accepted source.
pub const LABEL_COLUMN: &str = "loan_status";

/// Status phrase that marks a defaulted loan.
pub const DEFAULT_STATUS_PHRASE: &str = "Charged Off";

/// Rejected-source columns with no accepted counterpart.
pub const REJECTED_DROP_COLUMNS: &[&str] = &["Amount Requested", "Application Date"];

/// Rejected-source header names mapped onto the accepted vocabulary.
pub const REJECTED_RENAMES: &[(&str, &str)] = &[
    ("Risk_Score", "fico_score"),
    ("Debt-To-Income Ratio", "dti"),
    ("State", "addr_state"),
    ("Zip Code", "zip_code"),
];

/// Which family a source file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Accepted,
    Rejected,
}

/// Encoded accepted-loan dataset with its freshly derived schema.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub schema: FeatureSchema,
    pub features: FeatureMatrix,
    pub labels: Vec<u8>,
}

impl LoadedDataset {
    pub fn n_rows(&self) -> usize {
        self.features.n_rows()
    }

    /// Share of rows labelled as defaulted.
    pub fn default_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l == 1).count() as f64 / self.labels.len() as f64
    }
}

/// Binary default label from a loan status.
///
/// Only statuses containing "Charged Off" count as default. "Default",
/// "Late" and "In Grace Period" all land in class 0, as does a missing
/// status; class 0 therefore means "not charged off", not "performing".
pub fn label_for_status(status: &RawValue) -> u8 {
    match status {
        RawValue::Text(s) if s.contains(DEFAULT_STATUS_PHRASE) => 1,
        _ => 0,
    }
}

/// Read a CSV file with a header row into a raw table.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        RiskError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })?;
    let table = read_csv_from(file)?;

    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.n_columns(),
        "CSV loaded"
    );
    Ok(table)
}

/// Read CSV data from any reader.
pub fn read_csv_from<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| RiskError::malformed(format!("unreadable CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| RiskError::malformed(format!("CSV record {}: {}", line + 1, e)))?;
        rows.push(record.iter().map(RawValue::from_csv_field).collect());
    }

    RawTable::new(columns, rows)
}

/// Split the label column off an accepted table.
pub fn extract_labels(table: &mut RawTable) -> Result<Vec<u8>> {
    let status = table.take_column(LABEL_COLUMN).ok_or_else(|| {
        RiskError::malformed(format!("accepted source has no '{}' column", LABEL_COLUMN))
    })?;
    Ok(status.iter().map(label_for_status).collect())
}

/// Encode an in-memory accepted table, deriving the canonical schema.
pub fn encode_accepted(mut table: RawTable, encoder: &Encoder) -> Result<LoadedDataset> {
    let labels = extract_labels(&mut table)?;
    let (schema, features) = encoder.derive(&table)?;

    Ok(LoadedDataset {
        schema,
        features,
        labels,
    })
}

/// Load the accepted-loan file: labels plus features under a new schema.
pub fn load_accepted<P: AsRef<Path>>(path: P, encoder: &Encoder) -> Result<LoadedDataset> {
    let dataset = encode_accepted(read_csv(path)?, encoder)?;

    info!(
        rows = dataset.n_rows(),
        features = dataset.schema.len(),
        default_rate = format!("{:.4}", dataset.default_rate()),
        "Accepted loans encoded"
    );
    Ok(dataset)
}

/// Map a rejected table onto the accepted vocabulary and conform it.
pub fn reconcile_rejected(mut table: RawTable, schema: &FeatureSchema) -> Result<FeatureMatrix> {
    table.drop_columns(REJECTED_DROP_COLUMNS);
    table.rename_columns(REJECTED_RENAMES)?;
    encoder::conform(&table, schema)
}

/// Load the rejected-loan file conformed to the accepted schema.
pub fn load_for_reconciliation<P: AsRef<Path>>(
    path: P,
    target_schema: &FeatureSchema,
) -> Result<FeatureMatrix> {
    let features = reconcile_rejected(read_csv(path)?, target_schema)?;

    info!(
        rows = features.n_rows(),
        features = features.n_features(),
        "Rejected loans reconciled to accepted schema"
    );
    Ok(features)
}

/// Source-kind dispatch: accepted files derive a schema, rejected files
/// need one to conform to.
pub fn load<P: AsRef<Path>>(
    kind: SourceKind,
    path: P,
    encoder: &Encoder,
    target_schema: Option<&FeatureSchema>,
) -> Result<(FeatureMatrix, Option<Vec<u8>>)> {
    match kind {
        SourceKind::Accepted => {
            let dataset = load_accepted(path, encoder)?;
            Ok((dataset.features, Some(dataset.labels)))
        }
        SourceKind::Rejected => {
            let schema = target_schema.ok_or_else(|| {
                RiskError::config("rejected source requires the accepted feature schema")
            })?;
            Ok((load_for_reconciliation(path, schema)?, None))
        }
    }
}
