//! Deletion anomalies: traces of rows or values that were removed.

use super::{Detector, DetectorOutput, Rule, run_rules};
use crate::dataset::{Dataset, Value};
use crate::error::{Result, ResultExt};
use crate::inference::InferredSchema;
use crate::types::{Finding, Method, issue};

/// Emission confidence for a suspected orphan. Kept apart from the
/// severity weight the scorer assigns to the same issue type.
pub const ORPHAN_CONFIDENCE: f64 = 0.6;

/// Single-occurrence reference values above this look orphaned.
pub const ORPHAN_MIN_VALUE: f64 = 1000.0;

const BELOW_MIN_CONFIDENCE: f64 = 0.9;
const ABOVE_MAX_CONFIDENCE: f64 = 0.8;
const ACCIDENTAL_DELETION_CONFIDENCE: f64 = 0.7;

/// A run of missing cells longer than this suggests a bulk deletion.
pub const MAX_NULL_RUN: usize = 5;

/// At most this many missing rows are reported per column.
pub const MAX_REPORTED_DELETIONS: usize = 10;

const RULES: [Rule; 3] = [
    Rule {
        name: "orphaned_records",
        check: orphaned_records,
    },
    Rule {
        name: "referential_integrity",
        check: referential_integrity,
    },
    Rule {
        name: "accidental_deletions",
        check: accidental_deletions,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionDetector;

impl Detector for DeletionDetector {
    fn name(&self) -> &'static str {
        "deletion"
    }

    fn method(&self) -> Method {
        Method::Deletion
    }

    fn detect(&self, dataset: &Dataset, schema: &InferredSchema) -> Result<DetectorOutput> {
        Ok(run_rules(self.name(), &RULES, dataset, schema))
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

/// Reference values that occur exactly once and are large.
pub fn orphaned_records(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for name in &schema.reference_columns {
        let column = dataset.column(name)?;
        let unique = column
            .series()
            .clone()
            .into_frame()
            .is_unique()
            .context(format!("Failed to count values of '{name}'"))?;

        for ((row, value), once) in column.values().iter().enumerate().zip(&unique) {
            let Some(v) = numeric(value) else { continue };
            if once == Some(true) && v > ORPHAN_MIN_VALUE {
                findings.push(
                    Finding::new(row, issue::POTENTIAL_ORPHANED_RECORD, Method::Deletion)
                        .column(name)
                        .value(format!("{name}: {value}"))
                        .details(format!(
                            "Potential orphaned record - {name} value {value} appears only once"
                        ))
                        .confidence(ORPHAN_CONFIDENCE),
                );
            }
        }
    }
    Ok(findings)
}

/// Reference values outside the valid id range. Non-numeric cells are left
/// to the insertion family.
pub fn referential_integrity(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let bounds = schema.reference_bounds;
    let mut findings = Vec::new();
    for name in &schema.reference_columns {
        let column = dataset.column(name)?;
        for (row, value) in column.non_null() {
            let Some(v) = numeric(value) else { continue };
            let violation = if v < bounds.min {
                Some((
                    BELOW_MIN_CONFIDENCE,
                    format!("Value {value} below minimum {} for {name}", bounds.min),
                ))
            } else if v > bounds.max {
                Some((
                    ABOVE_MAX_CONFIDENCE,
                    format!("Value {value} above maximum {} for {name}", bounds.max),
                ))
            } else {
                None
            };

            if let Some((confidence, details)) = violation {
                findings.push(
                    Finding::new(row, issue::REFERENTIAL_INTEGRITY_VIOLATION, Method::Deletion)
                        .column(name)
                        .value(format!("{name}: {value}"))
                        .details(details)
                        .confidence(confidence),
                );
            }
        }
    }
    Ok(findings)
}

/// Longest run of consecutive missing cells.
pub fn longest_null_run(values: &[Value]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for value in values {
        if value.is_null() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Critical columns with a long run of missing cells.
pub fn accidental_deletions(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for name in &schema.critical_columns {
        let column = dataset.column(name)?;
        if longest_null_run(column.values()) <= MAX_NULL_RUN {
            continue;
        }
        let null_rows = column
            .values()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_null())
            .map(|(row, _)| row)
            .take(MAX_REPORTED_DELETIONS);
        for row in null_rows {
            findings.push(
                Finding::new(row, issue::POTENTIAL_ACCIDENTAL_DELETION, Method::Deletion)
                    .column(name)
                    .value(format!("NULL in {name}"))
                    .details(format!("Potential accidental deletion detected in {name}"))
                    .confidence(ACCIDENTAL_DELETION_CONFIDENCE),
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
    fn test_orphaned_records() {
        let (ds, schema) = setup(df!["parent_id" => [5000i64, 7, 7, 1500, 1500]].unwrap());
        let findings = orphaned_records(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 0);
        assert_eq!(findings[0].confidence, Some(ORPHAN_CONFIDENCE));
    }

    #[test]
    fn test_referential_integrity_bounds() {
        let (ds, schema) = setup(df!["account_id" => [0i64, 5, 1_000_000_000]].unwrap());
        let findings = referential_integrity(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].row_index, 0);
        assert_eq!(findings[0].confidence, Some(0.9));
        assert_eq!(findings[1].row_index, 2);
        assert_eq!(findings[1].confidence, Some(0.8));
    }

    #[test]
    fn test_non_numeric_references_skipped() {
        let (ds, schema) = setup(df!["account_id" => ["x", "y"]].unwrap());
        assert!(referential_integrity(&ds, &schema).unwrap().is_empty());
        assert!(orphaned_records(&ds, &schema).unwrap().is_empty());
    }

    #[test]
    fn test_longest_null_run() {
        let values = vec![Value::Int(1), Value::Null, Value::Null, Value::Int(2), Value::Null];
        assert_eq!(longest_null_run(&values), 2);
        assert_eq!(longest_null_run(&[]), 0);
    }

    #[test]
    fn test_accidental_deletions() {
        // 200 unique codes with a gap of 6 consecutive missing values (3% missing)
        let codes: Vec<Option<i64>> = (0..200)
            .map(|i| if (50..56).contains(&i) { None } else { Some(i) })
            .collect();
        let (ds, schema) = setup(df!["code" => codes].unwrap());
        assert_eq!(schema.critical_columns, vec!["code"]);

        let findings = accidental_deletions(&ds, &schema).unwrap();
        let rows: Vec<usize> = findings.iter().map(|f| f.row_index).collect();
        assert_eq!(rows, vec![50, 51, 52, 53, 54, 55]);
    }

    #[test]
    fn test_short_null_runs_ignored() {
        let codes: Vec<Option<i64>> = (0..200)
            .map(|i| if i % 50 == 0 { None } else { Some(i) })
            .collect();
        let (ds, schema) = setup(df!["code" => codes].unwrap());
        assert!(accidental_deletions(&ds, &schema).unwrap().is_empty());
    }
}
