//! Raw loan-application records as they arrive from CSV files or requests.
//!
//! Every field is an explicit [`RawValue`]: either a present scalar or
//! `Absent`. Encoding branches on that tag instead of relying on implicit
//! null handling.

use crate::error::{Result, RiskError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A single heterogeneous field value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Field missing, empty, null or non-finite.
    Absent,
    /// Present numeric scalar (always finite).
    Number(f64),
    /// Present textual scalar.
    Text(String),
}

impl RawValue {
    /// Interpret a CSV cell.
    ///
    /// Empty cells are absent; anything that parses as a finite real is a
    /// number; everything else is text.
    pub fn from_csv_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return RawValue::Absent;
        }
        match parse_number(trimmed) {
            Some(n) if n.is_finite() => RawValue::Number(n),
            Some(_) => RawValue::Absent,
            None => RawValue::Text(trimmed.to_string()),
        }
    }

    /// Interpret a JSON request value. Arrays and objects are not scalars.
    pub fn from_json(field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(RawValue::Absent),
            Value::Bool(b) => Ok(RawValue::Number(if *b { 1.0 } else { 0.0 })),
            Value::Number(n) => Ok(n
                .as_f64()
                .filter(|n| n.is_finite())
                .map(RawValue::Number)
                .unwrap_or(RawValue::Absent)),
            // Same reading as a CSV cell, so text encodes identically in both paths
            Value::String(s) => Ok(RawValue::from_csv_field(s)),
            Value::Array(_) | Value::Object(_) => Err(RiskError::malformed(format!(
                "field '{}' is not a scalar value",
                field
            ))),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RawValue::Absent)
    }

    /// True for text that does not read as a number.
    pub fn is_non_numeric(&self) -> bool {
        match self {
            RawValue::Text(s) => parse_finite(s).is_none(),
            _ => false,
        }
    }

    /// Numeric reading of the value, accepting numeric-looking text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Absent => None,
            RawValue::Number(n) => Some(*n),
            RawValue::Text(s) => parse_finite(s),
        }
    }

    /// Canonical category key.
    ///
    /// Numbers and numeric-looking text share one spelling so that `5`,
    /// `"5"` and `"5.0"` land in the same category.
    pub fn category_key(&self) -> Option<String> {
        match self {
            RawValue::Absent => None,
            RawValue::Number(n) => Some(canonical_number(*n)),
            RawValue::Text(s) => Some(match parse_finite(s) {
                Some(n) => canonical_number(n),
                None => s.clone(),
            }),
        }
    }
}

/// Plain reals, plus percentages such as `"13.56%"` read as `13.56`.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix('%').map(str::trim_end).unwrap_or(s);
    s.parse::<f64>().ok()
}

fn parse_finite(s: &str) -> Option<f64> {
    parse_number(s).filter(|n| n.is_finite())
}

fn canonical_number(n: f64) -> String {
    // -0 and 0 are the same category
    let n = if n == 0.0 { 0.0 } else { n };
    format!("{}", n)
}

static ABSENT: RawValue = RawValue::Absent;

/// One raw record: field name to value. Fields not present read as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON request body, which must be an object.
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| RiskError::malformed("request body must be a JSON object"))?;

        let mut record = Self::new();
        for (name, value) in object {
            record.insert(name.clone(), RawValue::from_json(name, value)?);
        }
        Ok(record)
    }

    /// Parse a JSON request payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let body: Value = serde_json::from_slice(payload)
            .map_err(|e| RiskError::malformed(format!("request is not valid JSON: {}", e)))?;
        Self::from_json(&body)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RawValue) {
        self.fields.insert(name.into(), value);
    }

    /// Builder-style insert, handy for fixtures and generators.
    pub fn with(mut self, name: impl Into<String>, value: RawValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> &RawValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<(String, RawValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Columnar-headed table of raw values, the in-memory form of a CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
    index: HashMap<String, usize>,
}

impl RawTable {
    /// Build a table, rejecting duplicate column names and ragged rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self> {
        let index = build_index(&columns)?;
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(RiskError::malformed(format!(
                "row {} has {} fields, header has {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            index,
        })
    }

    /// Single-row table holding exactly the fields of `record`.
    pub fn from_record(record: &RawRecord) -> Self {
        let columns: Vec<String> = record.fields.keys().cloned().collect();
        let row: Vec<RawValue> = record.fields.values().cloned().collect();
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            columns,
            rows: vec![row],
            index,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Iterate the values of one column, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &RawValue> {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Remove a column and return its values, if it exists.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<RawValue>> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        let values = self.rows.iter_mut().map(|row| row.remove(idx)).collect();
        self.reindex();
        Some(values)
    }

    /// Drop every listed column that exists; unknown names are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        for name in names {
            self.take_column(name);
        }
    }

    /// Rename columns through `(from, to)` pairs.
    ///
    /// Fails if a rename would collide with an existing column.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) -> Result<()> {
        let mut columns = self.columns.clone();
        for (from, to) in renames {
            if let Some(idx) = self.column_index(from) {
                columns[idx] = (*to).to_string();
            }
        }
        self.index = build_index(&columns)?;
        self.columns = columns;
        Ok(())
    }

    fn reindex(&mut self) {
        self.index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
    }
}

fn build_index(columns: &[String]) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        if index.insert(name.clone(), i).is_some() {
            return Err(RiskError::malformed(format!("duplicate column '{}'", name)));
        }
    }
    Ok(index)
}
