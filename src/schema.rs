//! Feature schema: the frozen, ordered contract between training and serving.
//!
//! A schema is derived once from the accepted training data and then only
//! read. It travels inside the trained artifact so the serving process
//! never has to rebuild category tables.

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value written for a feature that is missing from the input.
pub const MISSING_VALUE: f64 = 0.0;

/// Code for a categorical value that was never observed during derivation.
///
/// Shares the slot with [`MISSING_VALUE`]: observed categories start at 1.
pub const UNKNOWN_CATEGORY_CODE: f64 = 0.0;

/// Category to code table, codes assigned in first-seen order starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryTable {
    categories: Vec<String>,
    codes: HashMap<String, u32>,
}

impl CategoryTable {
    /// Build a table from category keys in the order they were observed.
    /// Repeated keys keep their first code.
    pub fn from_observed<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self {
            categories: Vec::new(),
            codes: HashMap::new(),
        };
        for key in keys {
            let key = key.into();
            if !table.codes.contains_key(&key) {
                table.categories.push(key.clone());
                table.codes.insert(key, table.categories.len() as u32);
            }
        }
        table
    }

    /// Code for a category key, or `None` when out of vocabulary.
    pub fn code(&self, key: &str) -> Option<u32> {
        self.codes.get(key).copied()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl TryFrom<Vec<String>> for CategoryTable {
    type Error = RiskError;

    fn try_from(categories: Vec<String>) -> Result<Self> {
        let table = Self::from_observed(categories.iter().cloned());
        if table.len() != categories.len() {
            return Err(RiskError::artifact("category table contains duplicates"));
        }
        Ok(table)
    }
}

impl From<CategoryTable> for Vec<String> {
    fn from(table: CategoryTable) -> Self {
        table.categories
    }
}

/// How a raw field becomes a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    /// Numeric passthrough.
    Numeric,
    /// Integer code through a category table.
    Categorical { categories: CategoryTable },
}

/// One named column of the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    name: String,
    encoding: Encoding,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encoding: Encoding::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>, categories: CategoryTable) -> Self {
        Self {
            name: name.into(),
            encoding: Encoding::Categorical { categories },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.encoding, Encoding::Categorical { .. })
    }
}

/// Ordered, immutable set of features a model is fit on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRepr", into = "SchemaRepr")]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct SchemaRepr {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build a schema. Names must be unique and at least one feature given.
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self> {
        if features.is_empty() {
            return Err(RiskError::malformed("feature schema has no columns"));
        }
        let mut index = HashMap::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            if index.insert(feature.name.clone(), i).is_some() {
                return Err(RiskError::malformed(format!(
                    "duplicate feature '{}' in schema",
                    feature.name
                )));
            }
        }
        Ok(Self { features, index })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Position of a feature in encoded vectors.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.index_of(name).map(|i| &self.features[i])
    }

    pub fn categorical_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_categorical()).count()
    }

    /// Fail unless an encoded width matches this schema.
    pub fn check_width(&self, found: usize) -> Result<()> {
        if found != self.len() {
            return Err(RiskError::SchemaMismatch {
                expected: self.len(),
                found,
            });
        }
        Ok(())
    }
}

impl TryFrom<SchemaRepr> for FeatureSchema {
    type Error = RiskError;

    fn try_from(repr: SchemaRepr) -> Result<Self> {
        Self::new(repr.features).map_err(|e| RiskError::artifact(e.to_string()))
    }
}

impl From<FeatureSchema> for SchemaRepr {
    fn from(schema: FeatureSchema) -> Self {
        SchemaRepr {
            features: schema.features,
        }
    }
}
