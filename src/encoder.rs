//! Feature encoding for loan-application model training and inference.
//!
//! Training derives a [`FeatureSchema`] from the accepted-loan table; every
//! later call conforms input to that schema. Derivation encodes its own
//! table through the same conform path, so a record encodes identically at
//! fit time and at serving time.

use crate::error::{Result, RiskError};
use crate::schema::{
    CategoryTable, Encoding, FeatureSchema, FeatureSpec, MISSING_VALUE, UNKNOWN_CATEGORY_CODE,
};
use crate::types::record::{RawRecord, RawTable, RawValue};
use tracing::{debug, info, warn};

/// Identifier and free-text columns never used as features.
pub const ACCEPTED_DROP_COLUMNS: &[&str] = &["id", "member_id", "emp_title", "title", "zip_code"];

/// Dense row-major numeric feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_rows: usize,
    n_features: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    /// Empty matrix with a fixed width.
    pub fn new(n_features: usize) -> Self {
        Self {
            n_rows: 0,
            n_features,
            values: Vec::new(),
        }
    }

    pub fn with_capacity(n_features: usize, n_rows: usize) -> Self {
        Self {
            n_rows: 0,
            n_features,
            values: Vec::with_capacity(n_features * n_rows),
        }
    }

    /// Build from rows; all rows must share one width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        let mut matrix = Self::with_capacity(n_features, rows.len());
        for row in &rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Append a row. Width must match and every entry must be finite.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_features {
            return Err(RiskError::SchemaMismatch {
                expected: self.n_features,
                found: row.len(),
            });
        }
        if let Some(pos) = row.iter().position(|v| !v.is_finite()) {
            return Err(RiskError::malformed(format!(
                "non-finite value at feature position {}",
                pos
            )));
        }
        self.values.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.n_features;
        &self.values[start..start + self.n_features]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Copy of one column.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows().map(|row| row[j]).collect()
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = Self::with_capacity(self.n_features, indices.len());
        for &i in indices {
            out.values.extend_from_slice(self.row(i));
            out.n_rows += 1;
        }
        out
    }
}

/// What conforming a single record had to do to fit the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConformReport {
    /// Categorical features whose value was not in the category table.
    pub unknown_categories: Vec<String>,
    /// Schema features absent from the record.
    pub zero_filled: Vec<String>,
    /// Record fields not in the schema.
    pub ignored_fields: Vec<String>,
}

/// One record conformed to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformed {
    pub values: Vec<f64>,
    pub report: ConformReport,
}

enum Cell {
    Value(f64),
    Missing,
    Unknown,
}

impl Cell {
    fn as_f64(&self) -> f64 {
        match self {
            Cell::Value(v) => *v,
            Cell::Missing => MISSING_VALUE,
            Cell::Unknown => UNKNOWN_CATEGORY_CODE,
        }
    }
}

fn encode_value(spec: &FeatureSpec, value: &RawValue) -> Result<Cell> {
    if value.is_absent() {
        return Ok(Cell::Missing);
    }
    match spec.encoding() {
        Encoding::Numeric => value.as_number().map(Cell::Value).ok_or_else(|| {
            RiskError::malformed(format!(
                "feature '{}' expects a number, got {:?}",
                spec.name(),
                value
            ))
        }),
        Encoding::Categorical { categories } => {
            let code = value
                .category_key()
                .and_then(|key| categories.code(&key));
            Ok(match code {
                Some(code) => Cell::Value(code as f64),
                None => Cell::Unknown,
            })
        }
    }
}

/// Derives feature schemas from training tables.
#[derive(Debug, Clone)]
pub struct Encoder {
    drop_columns: Vec<String>,
}

impl Encoder {
    /// Create an encoder that never turns the listed columns into features.
    pub fn new<I, S>(drop_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            drop_columns: drop_columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Encoder with the accepted-loan drop list.
    pub fn accepted() -> Self {
        Self::new(ACCEPTED_DROP_COLUMNS.iter().copied())
    }

    pub fn drop_columns(&self) -> &[String] {
        &self.drop_columns
    }

    /// Derive a schema from `table` and encode the table against it.
    ///
    /// A column with any present non-numeric value becomes categorical, with
    /// codes in first-seen order. All other columns pass through as numbers.
    pub fn derive(&self, table: &RawTable) -> Result<(FeatureSchema, FeatureMatrix)> {
        let mut specs = Vec::new();

        for (idx, name) in table.columns().iter().enumerate() {
            if self.drop_columns.iter().any(|d| d == name) {
                continue;
            }
            let categorical = table.column(idx).any(RawValue::is_non_numeric);
            if categorical {
                let categories =
                    CategoryTable::from_observed(table.column(idx).filter_map(RawValue::category_key));
                debug!(feature = %name, categories = categories.len(), "Categorical feature");
                specs.push(FeatureSpec::categorical(name.clone(), categories));
            } else {
                specs.push(FeatureSpec::numeric(name.clone()));
            }
        }

        let schema = FeatureSchema::new(specs)?;
        let matrix = conform(table, &schema)?;

        info!(
            features = schema.len(),
            categorical = schema.categorical_count(),
            rows = matrix.n_rows(),
            "Feature schema derived"
        );

        Ok((schema, matrix))
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::accepted()
    }
}

/// Conform a whole table to an existing schema.
///
/// Columns are reindexed to the schema's order, missing columns are zero
/// filled, extra columns are dropped and unseen categories take the OOV code.
pub fn conform(table: &RawTable, schema: &FeatureSchema) -> Result<FeatureMatrix> {
    let sources: Vec<Option<usize>> = schema
        .features()
        .iter()
        .map(|f| table.column_index(f.name()))
        .collect();

    let missing = sources.iter().filter(|s| s.is_none()).count();
    let ignored = table
        .columns()
        .iter()
        .filter(|c| schema.index_of(c).is_none())
        .count();
    if missing > 0 || ignored > 0 {
        debug!(
            zero_filled_columns = missing,
            ignored_columns = ignored,
            "Reindexed table to feature schema"
        );
    }

    let mut matrix = FeatureMatrix::with_capacity(schema.len(), table.n_rows());
    let mut unknown = vec![0usize; schema.len()];
    let mut row_values = Vec::with_capacity(schema.len());
    let absent = RawValue::Absent;

    for (r, row) in table.rows().iter().enumerate() {
        row_values.clear();
        for (j, (spec, source)) in schema.features().iter().zip(&sources).enumerate() {
            let value = source.map(|i| &row[i]).unwrap_or(&absent);
            let cell = encode_value(spec, value)
                .map_err(|e| RiskError::malformed(format!("row {}: {}", r, e)))?;
            if matches!(cell, Cell::Unknown) {
                unknown[j] += 1;
            }
            row_values.push(cell.as_f64());
        }
        matrix.push_row(&row_values)?;
    }

    for (spec, count) in schema.features().iter().zip(&unknown) {
        if *count > 0 {
            warn!(
                feature = %spec.name(),
                count = count,
                "Unseen categories mapped to OOV code"
            );
        }
    }

    Ok(matrix)
}

/// Conform one record to an existing schema.
///
/// Pure: the result depends only on the record and the schema.
pub fn conform_record(record: &RawRecord, schema: &FeatureSchema) -> Result<Conformed> {
    let mut values = Vec::with_capacity(schema.len());
    let mut report = ConformReport::default();

    for spec in schema.features() {
        let value = record.get(spec.name());
        match encode_value(spec, value)? {
            Cell::Missing => {
                if !record.contains(spec.name()) {
                    report.zero_filled.push(spec.name().to_string());
                }
                values.push(MISSING_VALUE);
            }
            Cell::Unknown => {
                report.unknown_categories.push(spec.name().to_string());
                values.push(UNKNOWN_CATEGORY_CODE);
            }
            Cell::Value(v) => values.push(v),
        }
    }

    report.ignored_fields = record
        .field_names()
        .filter(|name| schema.index_of(name).is_none())
        .map(str::to_string)
        .collect();

    schema.check_width(values.len())?;
    Ok(Conformed { values, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn num(n: f64) -> RawValue {
        RawValue::Number(n)
    }

    fn training_table() -> RawTable {
        RawTable::new(
            vec![
                "id".into(),
                "loan_amnt".into(),
                "term".into(),
                "addr_state".into(),
                "fico_score".into(),
            ],
            vec![
                vec![num(1.0), num(10000.0), text("36 months"), text("CA"), num(700.0)],
                vec![num(2.0), num(5000.0), text("60 months"), text("NY"), RawValue::Absent],
                vec![num(3.0), RawValue::Absent, text("36 months"), RawValue::Absent, num(650.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_derive_schema() {
        let (schema, matrix) = Encoder::new(["id"]).derive(&training_table()).unwrap();

        assert_eq!(
            schema.names().collect::<Vec<_>>(),
            vec!["loan_amnt", "term", "addr_state", "fico_score"]
        );
        assert!(!schema.feature("loan_amnt").unwrap().is_categorical());
        assert!(schema.feature("term").unwrap().is_categorical());
        assert!(schema.feature("addr_state").unwrap().is_categorical());

        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(matrix.n_features(), 4);
        assert_eq!(matrix.row(0), &[10000.0, 1.0, 1.0, 700.0]);
        assert_eq!(matrix.row(1), &[5000.0, 2.0, 2.0, 0.0]);
        // missing numeric and missing categorical both become zero
        assert_eq!(matrix.row(2), &[0.0, 1.0, 0.0, 650.0]);
    }

    #[test]
    fn test_mixed_column_is_categorical() {
        let table = RawTable::new(
            vec!["emp_length".into()],
            vec![vec![text("10+ years")], vec![num(5.0)], vec![text("5")]],
        )
        .unwrap();
        let (schema, matrix) = Encoder::new(Vec::<String>::new()).derive(&table).unwrap();

        assert!(schema.feature("emp_length").unwrap().is_categorical());
        assert_eq!(matrix.column(0), vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_derive_with_only_dropped_columns_fails() {
        let table = RawTable::new(vec!["id".into()], vec![vec![num(1.0)]]).unwrap();
        assert!(Encoder::accepted().derive(&table).is_err());
    }

    #[test]
    fn test_conform_record_zero_fill_and_oov() {
        let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();

        let record = RawRecord::new()
            .with("term", text("48 months"))
            .with("fico_score", num(720.0))
            .with("annual_inc", num(85000.0));

        let conformed = conform_record(&record, &schema).unwrap();

        assert_eq!(conformed.values, vec![0.0, UNKNOWN_CATEGORY_CODE, 0.0, 720.0]);
        assert_eq!(conformed.report.unknown_categories, vec!["term"]);
        assert_eq!(conformed.report.zero_filled, vec!["loan_amnt", "addr_state"]);
        assert_eq!(conformed.report.ignored_fields, vec!["annual_inc"]);
    }

    #[test]
    fn test_conform_record_rejects_text_in_numeric_feature() {
        let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();
        let record = RawRecord::new().with("loan_amnt", text("a lot"));

        let err = conform_record(&record, &schema).unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn test_conform_record_accepts_numeric_text() {
        let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();
        let record = RawRecord::new().with("loan_amnt", text("2500"));

        let conformed = conform_record(&record, &schema).unwrap();
        assert_eq!(conformed.values[0], 2500.0);
    }

    #[test]
    fn test_non_finite_text_encodes_alike_in_training_and_requests() {
        let table = RawTable::new(
            vec!["dti".into()],
            vec![
                vec![RawValue::from_csv_field("12.5")],
                vec![RawValue::from_csv_field("NaN")],
            ],
        )
        .unwrap();
        let (schema, matrix) = Encoder::new(Vec::<String>::new()).derive(&table).unwrap();
        assert_eq!(matrix.row(1), &[MISSING_VALUE]);

        let request = RawRecord::from_json(&serde_json::json!({"dti": "NaN"})).unwrap();
        let conformed = conform_record(&request, &schema).unwrap();
        assert_eq!(conformed.values, matrix.row(1));
    }

    #[test]
    fn test_conform_table_matches_conform_record() {
        let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();
        let record = RawRecord::new()
            .with("addr_state", text("NY"))
            .with("loan_amnt", num(1234.0))
            .with("extra", text("ignored"));

        let from_table = conform(&RawTable::from_record(&record), &schema).unwrap();
        let from_record = conform_record(&record, &schema).unwrap();

        assert_eq!(from_table.row(0), from_record.values.as_slice());
    }

    #[test]
    fn test_feature_matrix_select_and_width() {
        let mut matrix = FeatureMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(matrix.push_row(&[1.0]).is_err());
        assert!(matrix.push_row(&[f64::NAN, 1.0]).is_err());

        let picked = matrix.select(&[1, 0]);
        assert_eq!(picked.row(0), &[3.0, 4.0]);
        assert_eq!(picked.row(1), &[1.0, 2.0]);
        assert_eq!(picked.column(1), vec![4.0, 2.0]);
    }

    fn field_value() -> impl Strategy<Value = RawValue> {
        prop_oneof![
            Just(RawValue::Absent),
            (-1.0e6..1.0e6f64).prop_map(RawValue::Number),
            prop::sample::select(vec!["36 months", "60 months", "CA", "NY", "ZZ", "unseen"])
                .prop_map(|s| RawValue::Text(s.to_string())),
        ]
    }

    fn record_strategy() -> impl Strategy<Value = RawRecord> {
        let names = vec!["loan_amnt", "term", "addr_state", "fico_score", "junk", "id"];
        prop::collection::vec((prop::sample::select(names), field_value()), 0..8).prop_map(
            |fields| {
                fields
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect::<RawRecord>()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_conform_has_schema_width_and_order(record in record_strategy()) {
            let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();
            // text in a numeric slot is a legitimate rejection
            if let Ok(conformed) = conform_record(&record, &schema) {
                prop_assert_eq!(conformed.values.len(), schema.len());
                prop_assert!(conformed.values.iter().all(|v| v.is_finite()));
                for (j, name) in schema.names().enumerate() {
                    if !record.contains(name) {
                        prop_assert_eq!(conformed.values[j], MISSING_VALUE);
                    }
                }
            }
        }

        #[test]
        fn prop_conform_is_deterministic(record in record_strategy()) {
            let (schema, _) = Encoder::new(["id"]).derive(&training_table()).unwrap();
            let first = conform_record(&record, &schema).ok();
            let second = conform_record(&record, &schema).ok();
            prop_assert_eq!(first, second);
        }
    }
}
