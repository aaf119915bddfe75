//! Update anomalies: rows whose values drifted apart after edits.

use std::collections::BTreeMap;

use super::{Detector, DetectorOutput, Rule, run_rules};
use crate::dataset::{ColumnData, Dataset, Value, ValueKey};
use crate::error::Result;
use crate::inference::InferredSchema;
use crate::types::{Finding, Method, issue};

const INCONSISTENT_CONFIDENCE: f64 = 0.8;
const PARTIAL_CONFIDENCE: f64 = 0.7;
const TYPE_VIOLATION_CONFIDENCE: f64 = 0.9;

const RULES: [Rule; 3] = [
    Rule {
        name: "inconsistent_updates",
        check: inconsistent_updates,
    },
    Rule {
        name: "partial_updates",
        check: partial_updates,
    },
    Rule {
        name: "data_type_violations",
        check: data_type_violations,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateDetector;

impl Detector for UpdateDetector {
    fn name(&self) -> &'static str {
        "update"
    }

    fn method(&self) -> Method {
        Method::Update
    }

    fn detect(&self, dataset: &Dataset, schema: &InferredSchema) -> Result<DetectorOutput> {
        Ok(run_rules(self.name(), &RULES, dataset, schema))
    }
}

/// Rows sharing a key value but disagreeing on another column.
///
/// Emits one finding per row and conflicting column.
pub fn inconsistent_updates(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for key_name in &schema.key_columns {
        let key_column = dataset.column(key_name)?;

        let mut groups: BTreeMap<ValueKey, Vec<usize>> = BTreeMap::new();
        for (row, value) in key_column.non_null() {
            groups.entry(value.key()).or_default().push(row);
        }

        for rows in groups.values().filter(|rows| rows.len() > 1) {
            let key_value = key_column.get(rows[0]).unwrap_or(&Value::Null);

            for column in dataset.columns().iter().filter(|c| c.name() != key_name) {
                let mut distinct: Vec<ValueKey> = rows
                    .iter()
                    .filter_map(|&r| column.get(r))
                    .filter(|v| !v.is_null())
                    .map(Value::key)
                    .collect();
                distinct.sort();
                distinct.dedup();
                if distinct.len() < 2 {
                    continue;
                }

                for &row in rows {
                    let cell = column.get(row).unwrap_or(&Value::Null);
                    findings.push(
                        Finding::new(row, issue::INCONSISTENT_UPDATE, Method::Update)
                            .column(column.name())
                            .value(format!("{key_name}={key_value}, {}={cell}", column.name()))
                            .details(format!(
                                "Inconsistent {} values for same {key_name}",
                                column.name()
                            ))
                            .confidence(INCONSISTENT_CONFIDENCE),
                    );
                }
            }
        }
    }

    Ok(findings)
}

/// Rows where only part of a related column group is filled.
pub fn partial_updates(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for group in &schema.related_groups {
        let columns = group
            .iter()
            .map(|name| dataset.column(name))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..dataset.height() {
            let (present, missing): (Vec<&&ColumnData>, Vec<&&ColumnData>) = columns
                .iter()
                .partition(|c| c.get(row).is_some_and(|v| !v.is_null()));
            if present.is_empty() || missing.is_empty() {
                continue;
            }

            let present: Vec<&str> = present.iter().map(|c| c.name()).collect();
            let missing: Vec<&str> = missing.iter().map(|c| c.name()).collect();
            findings.push(
                Finding::new(row, issue::PARTIAL_UPDATE, Method::Update)
                    .value(format!(
                        "Updated: {}, Missing: {}",
                        present.join(", "),
                        missing.join(", ")
                    ))
                    .details(
                        "Partial update detected - some related columns updated, others missing",
                    )
                    .confidence(PARTIAL_CONFIDENCE),
            );
        }
    }

    Ok(findings)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Bool(_) => "bool",
        Value::Timestamp(_) => "datetime",
        Value::Str(_) => "str",
        Value::Null => "null",
    }
}

/// Cells that do not conform to their column's inferred type.
pub fn data_type_violations(dataset: &Dataset, schema: &InferredSchema) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for (name, expected) in &schema.expected_types {
        let column = dataset.column(name)?;
        for (row, value) in column.non_null() {
            if expected.accepts(value) {
                continue;
            }
            let actual = type_name(value);
            findings.push(
                Finding::new(row, issue::DATA_TYPE_VIOLATION, Method::Update)
                    .column(name)
                    .value(format!("{name}: {value} (type: {actual})"))
                    .details(format!(
                        "Expected {} but got {actual} in {name}",
                        expected.as_str()
                    ))
                    .confidence(TYPE_VIOLATION_CONFIDENCE),
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
    fn test_inconsistent_updates() {
        let (ds, schema) = setup(
            df![
                "customer_id" => [1i64, 1, 2],
                "email" => ["a@x.io", "b@x.io", "c@x.io"],
            ]
            .unwrap(),
        );
        let findings = inconsistent_updates(&ds, &schema).unwrap();
        let email_rows: Vec<usize> = findings
            .iter()
            .filter(|f| f.column.as_deref() == Some("email"))
            .map(|f| f.row_index)
            .collect();
        assert_eq!(email_rows, vec![0, 1]);
        assert!(findings[0].value.starts_with("customer_id=1, email="));
        assert_eq!(findings[0].confidence, Some(0.8));
    }

    #[test]
    fn test_consistent_groups_not_flagged() {
        let (ds, schema) = setup(
            df![
                "customer_id" => [1i64, 1, 2],
                "email" => [Some("a@x.io"), None, Some("c@x.io")],
            ]
            .unwrap(),
        );
        let findings = inconsistent_updates(&ds, &schema).unwrap();
        assert!(findings.iter().all(|f| f.column.as_deref() != Some("email")));
    }

    #[test]
    fn test_partial_updates() {
        let (ds, schema) = setup(
            df![
                "addr_street" => [Some("Main"), Some("High"), None],
                "addr_city" => [Some("Oslo"), None, None],
            ]
            .unwrap(),
        );
        let findings = partial_updates(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 1);
        assert_eq!(findings[0].value, "Updated: addr_street, Missing: addr_city");
    }

    #[test]
    fn test_data_type_violations() {
        let mut values: Vec<String> = (0..120).map(|i| i.to_string()).collect();
        values[110] = "oops".to_string();
        let (ds, schema) = setup(df!["qty" => values].unwrap());

        let findings = data_type_violations(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 110);
        assert_eq!(findings[0].value, "qty: oops (type: str)");
        assert_eq!(findings[0].confidence, Some(0.9));
    }

    #[test]
    fn test_oversized_number_in_text_column() {
        let huge = "4".repeat(1001);
        let (ds, schema) =
            setup(df!["note" => ["fragile", "leave at door", huge.as_str()]].unwrap());

        let findings = data_type_violations(&ds, &schema).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 2);
        assert_eq!(findings[0].details, "Expected string but got str in note");
    }
}
