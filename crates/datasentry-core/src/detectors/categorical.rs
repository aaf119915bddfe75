//! Rare category detection on text columns.

use std::collections::HashMap;

use polars::prelude::*;

use super::{Detector, DetectorOutput};
use crate::dataset::{ColumnKind, Dataset};
use crate::error::{Result, ResultExt};
use crate::inference::InferredSchema;
use crate::types::{Finding, Method, issue};

/// Flags every row holding a value whose relative frequency among the
/// column's non-missing values is strictly below `min_frequency`.
#[derive(Debug, Clone)]
pub struct CategoricalRarityDetector {
    min_frequency: f64,
}

impl CategoricalRarityDetector {
    pub fn new(min_frequency: f64) -> Self {
        Self { min_frequency }
    }
}

impl Default for CategoricalRarityDetector {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Detector for CategoricalRarityDetector {
    fn name(&self) -> &'static str {
        "categorical"
    }

    fn method(&self) -> Method {
        Method::Categorical
    }

    fn detect(&self, dataset: &Dataset, _schema: &InferredSchema) -> Result<DetectorOutput> {
        let mut findings = Vec::new();

        for column in dataset.columns().iter().filter(|c| c.kind() == ColumnKind::Text) {
            let present = column.series().drop_nulls();
            if present.is_empty() {
                continue;
            }
            let total = present.len() as f64;
            let counts = category_counts(&present)
                .context(format!("Failed to count values of '{}'", column.name()))?;

            for (row, value) in column.series().str()?.into_iter().enumerate() {
                let Some(s) = value else { continue };
                let frequency = counts.get(s).copied().unwrap_or(0) as f64 / total;
                if frequency < self.min_frequency {
                    findings.push(
                        Finding::new(row, issue::RARE_CATEGORY, Method::Categorical)
                            .column(column.name())
                            .value(s)
                            .details(format!(
                                "{}: '{}' has frequency {:.4} (< {})",
                                column.name(),
                                s,
                                frequency,
                                self.min_frequency
                            )),
                    );
                }
            }
        }

        Ok(DetectorOutput::from_findings(findings))
    }
}

/// Occurrences per distinct value of a non-null string series.
fn category_counts(series: &Series) -> PolarsResult<HashMap<String, usize>> {
    let counts = series.value_counts(false, false, "count".into(), false)?;
    let values = counts.column(series.name())?.str()?;
    let occurrences = counts
        .column("count")?
        .as_materialized_series()
        .cast(&IDX_DTYPE)?;
    let occurrences = occurrences.idx()?;

    Ok(values
        .into_iter()
        .zip(occurrences)
        .filter_map(|(value, n)| Some((value?.to_string(), n? as usize)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn run(df: DataFrame, min_frequency: f64) -> Vec<Finding> {
        let ds = Dataset::from_frame(&df).unwrap();
        let schema = InferredSchema::infer(&ds);
        CategoricalRarityDetector::new(min_frequency)
            .detect(&ds, &schema)
            .unwrap()
            .findings
    }

    #[test]
    fn test_rare_value_flagged() {
        let mut colors = vec!["red"; 150];
        colors.push("purple");
        let findings = run(df!["color" => colors].unwrap(), 0.01);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 150);
        assert_eq!(findings[0].value, "purple");
        assert_eq!(findings[0].method, Method::Categorical);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Each value has frequency exactly 0.25
        let findings = run(df!["c" => ["a", "b", "c", "d"]].unwrap(), 0.25);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_every_row_of_rare_value_flagged() {
        let mut values = vec!["common"; 300];
        values.push("rare");
        values.push("rare");
        let findings = run(df!["v" => values].unwrap(), 0.01);
        let rows: Vec<usize> = findings.iter().map(|f| f.row_index).collect();
        assert_eq!(rows, vec![300, 301]);
    }

    #[test]
    fn test_category_counts() {
        let series = Series::new("c".into(), ["a", "b", "a", "a"]);
        let counts = category_counts(&series).unwrap();
        assert_eq!(counts.get("a"), Some(&3));
        assert_eq!(counts.get("b"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_missing_cells_not_counted() {
        // 1 of 4 present values is below 0.3; the two missing cells don't dilute it
        let findings = run(
            df!["c" => [Some("x"), Some("x"), None, Some("x"), None, Some("y")]].unwrap(),
            0.3,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].row_index, 5);
    }

    #[test]
    fn test_numeric_columns_ignored() {
        let findings = run(df!["n" => [1i64, 2, 3, 4]].unwrap(), 0.5);
        assert!(findings.is_empty());
    }
}
