//! Schema inference shared by the rule families.
//!
//! Every `infer_*` function is pure over a [`Dataset`]. The ensemble calls
//! [`InferredSchema::infer`] once per run and hands the result to each
//! detector, so rules never re-derive which columns are keys or references.

use serde::Serialize;
use std::collections::HashSet;

use crate::dataset::{ColumnKind, Dataset, Value};
use crate::utils;

/// Null rate below which a column counts as required.
pub const REQUIRED_NULL_RATE: f64 = 0.1;

/// Null rate below which a column can be critical.
pub const CRITICAL_NULL_RATE: f64 = 0.05;

/// Unique ratio above which a column can be critical.
pub const CRITICAL_UNIQUE_RATIO: f64 = 0.8;

/// Unique ratio above which a column is a candidate key.
pub const KEY_UNIQUE_RATIO: f64 = 0.9;

/// At most this many key columns are used for grouping.
pub const MAX_KEY_COLUMNS: usize = 3;

/// Number of leading non-missing values used to infer a column's type.
pub const TYPE_SAMPLE_SIZE: usize = 100;

/// Numbers written with more characters than this do not belong in a
/// string column.
pub const MAX_NUMERIC_TEXT_LEN: usize = 1000;

/// Valid range for reference (foreign-key-like) values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ReferenceBounds {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 999_999_999.0,
        }
    }
}

/// Type a column's values are expected to conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    Numeric,
    Datetime,
    String,
}

impl ExpectedType {
    /// Whether a non-missing cell conforms to this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ExpectedType::Numeric => match value {
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => true,
                Value::Str(s) => utils::is_numeric_string(s),
                Value::Timestamp(_) | Value::Null => false,
            },
            ExpectedType::Datetime => match value {
                Value::Timestamp(_) | Value::Int(_) | Value::Float(_) => true,
                Value::Str(s) => utils::parse_datetime(s).is_some(),
                Value::Bool(_) | Value::Null => false,
            },
            ExpectedType::String => match value {
                Value::Int(_) | Value::Float(_) => value.to_string().len() <= MAX_NUMERIC_TEXT_LEN,
                Value::Str(s) => {
                    s.trim().len() <= MAX_NUMERIC_TEXT_LEN || !utils::is_number_literal(s)
                }
                Value::Bool(_) | Value::Timestamp(_) | Value::Null => true,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpectedType::Numeric => "numeric",
            ExpectedType::Datetime => "datetime",
            ExpectedType::String => "string",
        }
    }
}

/// Everything the rule families need to know about a dataset's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferredSchema {
    pub reference_columns: Vec<String>,
    pub reference_bounds: ReferenceBounds,
    pub required_columns: Vec<String>,
    pub critical_columns: Vec<String>,
    pub key_columns: Vec<String>,
    pub related_groups: Vec<Vec<String>>,
    pub expected_types: Vec<(String, ExpectedType)>,
    /// Columns the duplicate rule compares; empty means whole rows.
    pub duplicate_subset: Vec<String>,
}

impl InferredSchema {
    pub fn infer(dataset: &Dataset) -> Self {
        Self {
            reference_columns: infer_reference_columns(dataset),
            reference_bounds: ReferenceBounds::default(),
            required_columns: infer_required_columns(dataset),
            critical_columns: infer_critical_columns(dataset),
            key_columns: infer_key_columns(dataset),
            related_groups: infer_related_groups(dataset),
            expected_types: infer_expected_types(dataset),
            duplicate_subset: Vec::new(),
        }
    }

    /// Compare rows on `columns` instead of every column when looking for
    /// duplicates.
    pub fn with_duplicate_subset(mut self, columns: Vec<String>) -> Self {
        self.duplicate_subset = columns;
        self
    }
}

/// Name looks like a foreign key: `user_id`, `customerId`.
pub fn is_reference_name(name: &str) -> bool {
    name.ends_with("_id") || name.ends_with("Id")
}

pub fn infer_reference_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .column_names()
        .into_iter()
        .filter(|name| is_reference_name(name))
        .map(str::to_string)
        .collect()
}

pub fn infer_required_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .filter(|c| c.null_rate() < REQUIRED_NULL_RATE)
        .map(|c| c.name().to_string())
        .collect()
}

/// Nearly complete, nearly unique columns.
pub fn infer_critical_columns(dataset: &Dataset) -> Vec<String> {
    let height = dataset.height();
    if height == 0 {
        return Vec::new();
    }
    dataset
        .columns()
        .iter()
        .filter(|c| {
            let unique_ratio = c.unique_count() as f64 / height as f64;
            c.null_rate() < CRITICAL_NULL_RATE && unique_ratio > CRITICAL_UNIQUE_RATIO
        })
        .map(|c| c.name().to_string())
        .collect()
}

/// Identifier-named or highly unique columns, first [`MAX_KEY_COLUMNS`].
pub fn infer_key_columns(dataset: &Dataset) -> Vec<String> {
    let height = dataset.height();
    if height == 0 {
        return Vec::new();
    }
    dataset
        .columns()
        .iter()
        .filter(|c| {
            let name = c.name();
            is_reference_name(name)
                || name.ends_with("_key")
                || c.unique_count() as f64 / height as f64 > KEY_UNIQUE_RATIO
        })
        .take(MAX_KEY_COLUMNS)
        .map(|c| c.name().to_string())
        .collect()
}

/// Columns sharing the prefix before their first underscore.
///
/// Groups keep first-appearance order; singleton groups are dropped.
pub fn infer_related_groups(dataset: &Dataset) -> Vec<Vec<String>> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for name in dataset.column_names() {
        let prefix = name.split('_').next().unwrap_or(name).to_string();
        match groups.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, members)) => members.push(name.to_string()),
            None => groups.push((prefix, vec![name.to_string()])),
        }
    }
    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(_, members)| members)
        .collect()
}

/// Expected type per column from its first [`TYPE_SAMPLE_SIZE`] values.
///
/// All-missing columns get no expectation.
pub fn infer_expected_types(dataset: &Dataset) -> Vec<(String, ExpectedType)> {
    dataset
        .columns()
        .iter()
        .filter_map(|column| {
            let expected = match column.kind() {
                ColumnKind::Empty => return None,
                ColumnKind::Integer | ColumnKind::Float | ColumnKind::Boolean => {
                    ExpectedType::Numeric
                }
                ColumnKind::Timestamp => ExpectedType::Datetime,
                ColumnKind::Text => {
                    let sample: Vec<&str> = column
                        .non_null()
                        .filter_map(|(_, v)| v.as_str())
                        .take(TYPE_SAMPLE_SIZE)
                        .collect();
                    if sample.iter().all(|s| utils::is_numeric_string(s)) {
                        ExpectedType::Numeric
                    } else if sample.iter().all(|s| utils::parse_datetime(s).is_some()) {
                        ExpectedType::Datetime
                    } else {
                        ExpectedType::String
                    }
                }
            };
            Some((column.name().to_string(), expected))
        })
        .collect()
}

/// Names present in both datasets, in `left` order.
pub fn shared_columns<'a>(left: &'a Dataset, right: &Dataset) -> Vec<&'a str> {
    let right_names: HashSet<&str> = right.column_names().into_iter().collect();
    left.column_names()
        .into_iter()
        .filter(|n| right_names.contains(n))
        .collect()
}
