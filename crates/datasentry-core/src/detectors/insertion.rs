//! Insertion anomalies: rows that should not have been written as they are.

use super::{Detector, DetectorOutput, Rule, run_rules};
use crate::dataset::{Dataset, Value};
use crate::error::{DetectionError, Result, ResultExt};
use crate::inference::InferredSchema;
use crate::types::{Finding, Method, issue};
use crate::utils;

const DUPLICATE_CONFIDENCE: f64 = 1.0;
const MISSING_REQUIRED_CONFIDENCE: f64 = 0.9;
const NEGATIVE_KEY_CONFIDENCE: f64 = 0.8;
const LARGE_KEY_CONFIDENCE: f64 = 0.6;
const NON_NUMERIC_KEY_CONFIDENCE: f64 = 0.7;

const RULES: [Rule; 3] = [
    Rule {
        name: "duplicate_records",
        check: duplicate_records,
    },
    Rule {
        name: "missing_required_fields",
        check: missing_required_fields,
    },
    Rule {
        name: "invalid_foreign_keys",
        check: invalid_foreign_keys,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct InsertionDetector;

impl Detector for InsertionDetector {
    fn name(&self) -> &'static str {
        "insertion"
    }

    fn method(&self) -> Method {
        Method::Insertion
    }

    fn detect(&self, dataset: &Dataset, schema: &InferredSchema) -> Result<DetectorOutput> {
        Ok(run_rules(self.name(), &RULES, dataset, schema))
    }
}

/// Resolve a user-supplied column name, accepting its sanitized form.
fn resolve_column(dataset: &Dataset, name: &str) -> Result<String> {
    if dataset.has_column(name) {
        return Ok(name.to_string());
    }
    let sanitized = utils::sanitize_column_name(name);
    if dataset.has_column(&sanitized) {
        Ok(sanitized)
    } else {
        Err(DetectionError::ColumnNotFound(name.to_string()))
    }
}

/// Every member of a group of identical rows.
///
/// Rows are compared on `schema.duplicate_subset`, or on every column when
/// the subset is empty. Missing cells compare equal to each other.
pub fn duplicate_records(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    if dataset.is_empty() || dataset.width() == 0 {
        return Ok(Vec::new());
    }

    let columns: Vec<String> = if schema.duplicate_subset.is_empty() {
        dataset.column_names().into_iter().map(str::to_string).collect()
    } else {
        schema
            .duplicate_subset
            .iter()
            .map(|name| resolve_column(dataset, name))
            .collect::<Result<_>>()?
    };

    let duplicated = dataset
        .frame()
        .select(columns.iter().map(String::as_str))
        .and_then(|projection| projection.is_duplicated())
        .context("Failed to compare rows")?;

    let listed = columns.join(", ");
    Ok(duplicated
        .into_iter()
        .enumerate()
        .filter(|(_, flag)| *flag == Some(true))
        .map(|(row, _)| {
            Finding::new(row, issue::DUPLICATE_RECORD, Method::Insertion)
                .value("Duplicate data")
                .details(format!("Duplicate found in columns: {listed}"))
                .confidence(DUPLICATE_CONFIDENCE)
        })
        .collect())
}

/// Missing cells in columns that are almost always filled.
pub fn missing_required_fields(
    dataset: &Dataset,
    schema: &InferredSchema,
) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for name in &schema.required_columns {
        let column = dataset.column(name)?;
        for (row, value) in column.values().iter().enumerate() {
            if value.is_null() {
                findings.push(
                    Finding::new(row, issue::MISSING_REQUIRED_FIELD, Method::Insertion)
                        .column(name)
                        .value(format!("NULL in {name}"))
                        .details(format!("Required field '{name}' is missing"))
                        .confidence(MISSING_REQUIRED_CONFIDENCE),
                );
            }
        }
    }
    Ok(findings)
}

/// Negative, implausibly large, or non-numeric values in reference columns.
pub fn invalid_foreign_keys(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let max = schema.reference_bounds.max;
    let mut findings = Vec::new();

    for name in &schema.reference_columns {
        let column = dataset.column(name)?;
        for (row, value) in column.non_null() {
            let numeric = match value {
                Value::Int(v) => Some(*v as f64),
                Value::Float(v) => Some(*v),
                _ => None,
            };

            let (confidence, details) = match numeric {
                Some(v) if v < 0.0 => (
                    NEGATIVE_KEY_CONFIDENCE,
                    format!("Negative foreign key value in {name}"),
                ),
                Some(v) if v > max => (
                    LARGE_KEY_CONFIDENCE,
                    format!("Suspiciously large foreign key value in {name}"),
                ),
                Some(_) => continue,
                None => (
                    NON_NUMERIC_KEY_CONFIDENCE,
                    format!("Non-numeric foreign key value in {name}"),
                ),
            };

            findings.push(
                Finding::new(row, issue::INVALID_FOREIGN_KEY, Method::Insertion)
                    .column(name)
                    .value(format!("{name}: {value}"))
                    .details(details)
                    .confidence(confidence),
            );
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn setup(df: DataFrame) -> (Dataset, InferredSchema) {
        let ds = Dataset::from_frame(&df).unwrap();
        let schema = InferredSchema::infer(&ds);
        (ds, schema)
    }

    #[test]
    fn test_duplicates_flag_every_copy() {
        let (ds, schema) = setup(
            df![
                "a" => [1i64, 1, 2],
                "b" => ["x", "x", "y"],
            ]
            .unwrap(),
        );
        let findings = duplicate_records(&ds, &schema).unwrap();
        let rows: Vec<usize> = findings.iter().map(|f| f.row_index).collect();
        assert_eq!(rows, vec![0, 1]);
        assert!(findings.iter().all(|f| f.confidence == Some(1.0)));
    }

    #[test]
    fn test_duplicates_treat_missing_as_equal() {
        let (ds, schema) = setup(df!["a" => [None, None, Some(1i64)]].unwrap());
        let findings = duplicate_records(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_duplicates_on_column_subset() {
        let (ds, schema) = setup(
            df![
                "email" => ["a@x.io", "b@x.io", "a@x.io", "c@x.io"],
                "name" => ["Ann", "Bob", "Anne", "Cy"],
                "seen" => [1i64, 2, 3, 4],
            ]
            .unwrap(),
        );
        assert!(duplicate_records(&ds, &schema).unwrap().is_empty());

        let schema = schema.with_duplicate_subset(vec!["email".to_string()]);
        let findings = duplicate_records(&ds, &schema).unwrap();
        let rows: Vec<usize> = findings.iter().map(|f| f.row_index).collect();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(findings[0].details, "Duplicate found in columns: email");
    }

    #[test]
    fn test_duplicate_subset_accepts_raw_names() {
        let (ds, schema) = setup(
            df![
                "Order ID" => [1i64, 1, 2],
                "note" => ["x", "y", "z"],
            ]
            .unwrap(),
        );
        let schema = schema.with_duplicate_subset(vec!["Order ID".to_string()]);
        assert_eq!(duplicate_records(&ds, &schema).unwrap().len(), 2);

        let schema = schema.with_duplicate_subset(vec!["ghost".to_string()]);
        assert!(matches!(
            duplicate_records(&ds, &schema),
            Err(DetectionError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        let mut names: Vec<Option<&str>> = vec![Some("n"); 20];
        names[4] = None;
        let (ds, schema) = setup(df!["name" => names].unwrap());
        let findings = missing_required_fields(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 4);
        assert_eq!(findings[0].confidence, Some(0.9));
    }

    #[test]
    fn test_invalid_foreign_keys() {
        let (ds, schema) = setup(
            df![
                "user_id" => [5i64, -1, 2_000_000_000, 7],
                "amount" => [-5i64, -6, -7, -8],
            ]
            .unwrap(),
        );
        let findings = invalid_foreign_keys(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].row_index, 1);
        assert_eq!(findings[0].confidence, Some(0.8));
        assert_eq!(findings[1].row_index, 2);
        assert_eq!(findings[1].confidence, Some(0.6));
    }

    #[test]
    fn test_non_numeric_foreign_key() {
        let (ds, schema) = setup(df!["orderId" => ["A1", "B2"]].unwrap());
        let findings = invalid_foreign_keys(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.confidence == Some(0.7)));
    }
}
